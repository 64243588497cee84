//! # Trail
//!
//! The active, linear walk through the version tree. Entries up to and including the
//! pointer are applied to the document; entries after it are what redo leads to.
//!
//! ```text
//! entries: [0, 1, 2, 3]
//!                 ^ pointer = 2   (3 is redoable)
//! ```

use crate::action::VersionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trail {
    entries: Vec<VersionId>,
    pointer: usize,
}

impl Trail {
    /// A trail holding only the sentinel
    pub fn new() -> Self {
        Self {
            entries: vec![0],
            pointer: 0,
        }
    }

    pub fn entries(&self) -> &[VersionId] {
        &self.entries
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; the sentinel stays on the trail
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Version the document currently reflects
    pub fn current(&self) -> VersionId {
        self.entries[self.pointer]
    }

    pub fn position(&self, id: VersionId) -> Option<usize> {
        self.entries.iter().position(|entry| *entry == id)
    }

    pub fn applied(&self) -> &[VersionId] {
        &self.entries[..=self.pointer]
    }

    pub fn redoable(&self) -> &[VersionId] {
        &self.entries[self.pointer + 1..]
    }

    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    pub fn can_redo(&self) -> bool {
        self.pointer + 1 < self.entries.len()
    }

    pub fn is_at_end(&self) -> bool {
        self.pointer + 1 == self.entries.len()
    }

    /// Version undo would revert
    pub fn undo_target(&self) -> Option<VersionId> {
        self.can_undo().then(|| self.entries[self.pointer])
    }

    /// Version redo would re-apply
    pub fn redo_target(&self) -> Option<VersionId> {
        self.entries.get(self.pointer + 1).copied()
    }

    /// Append a new version after the pointer, dropping everything that was redoable
    pub fn insert(&mut self, id: VersionId) {
        self.entries.truncate(self.pointer + 1);
        self.entries.push(id);
        self.pointer = self.entries.len() - 1;
    }

    pub(crate) fn step_back(&mut self) {
        if self.can_undo() {
            self.pointer -= 1;
        }
    }

    pub(crate) fn step_forward(&mut self) {
        if self.can_redo() {
            self.pointer += 1;
        }
    }

    /// Keep the entries up to `join_position`, walk `path` to the new current version
    /// and keep `remainder` as redoable
    pub(crate) fn reroot(&mut self, join_position: usize, path: &[VersionId], remainder: &[VersionId]) {
        self.entries.truncate(join_position + 1);
        self.entries.extend_from_slice(path);
        self.pointer = self.entries.len() - 1;
        self.entries.extend_from_slice(remainder);
    }
}

impl Default for Trail {
    fn default() -> Self {
        Self::new()
    }
}
