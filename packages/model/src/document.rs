//! # Document Handle
//!
//! A Document is one state machine being edited: the root state with everything below
//! it, document-level meta annotations and the storage lock guarding persistence.
//!
//! ## Lifecycle
//!
//! ```text
//! Load → Edit (observed) → Save
//!   ↓          ↓             ↓
//! File   before/after      File
//!         notifications
//! ```
//!
//! All observed edits live in [`crate::edits`]. This module only resolves paths and
//! offers the non-notifying primitives the history uses to restore snapshots.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::element::{Meta, PortDirection, State, StateKind};
use crate::error::{ModelError, ModelResult};
use crate::id_generator::IdGenerator;
use crate::lock::StorageLock;
use crate::notification::EditTarget;
use crate::path::{StateId, StatePath};

/// Editable state machine document
#[derive(Debug)]
pub struct Document {
    name: String,
    root: State,
    meta: Meta,
    storage_lock: StorageLock,
    id_gen: IdGenerator,
    dirty: bool,
}

#[derive(Serialize)]
struct StoredDocumentRef<'a> {
    name: &'a str,
    meta: &'a Meta,
    root: &'a State,
}

#[derive(Deserialize)]
struct StoredDocument {
    name: String,
    #[serde(default)]
    meta: Meta,
    root: State,
}

impl Document {
    /// Create a document around an existing root state
    pub fn new(name: impl Into<String>, root: State) -> Self {
        let name = name.into();
        Self {
            id_gen: IdGenerator::new(&name),
            name,
            root,
            meta: Meta::new(),
            storage_lock: StorageLock::new(),
            dirty: false,
        }
    }

    /// Create a document with an empty root state of the given kind
    pub fn with_root_kind(name: impl Into<String>, kind: StateKind) -> Self {
        let name = name.into();
        let mut id_gen = IdGenerator::new(&name);
        let root = State::new(id_gen.new_state_id(), "root state", kind);
        Self {
            name,
            root,
            meta: Meta::new(),
            storage_lock: StorageLock::new(),
            id_gen,
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &State {
        &self.root
    }

    pub fn root_path(&self) -> StatePath {
        StatePath::root(self.root.id.clone())
    }

    /// Document-level meta annotations
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn storage_lock(&self) -> &StorageLock {
        &self.storage_lock
    }

    /// Whether the document changed since it was created, loaded or saved
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Resolve a path against the live tree
    pub fn state(&self, path: &StatePath) -> ModelResult<&State> {
        if path.first() != &self.root.id {
            return Err(ModelError::StateNotFound(path.to_string()));
        }
        path.segments()[1..].iter().try_fold(&self.root, |state, id| {
            state
                .child(id)
                .ok_or_else(|| ModelError::StateNotFound(path.to_string()))
        })
    }

    pub(crate) fn state_mut(&mut self, path: &StatePath) -> ModelResult<&mut State> {
        if path.first() != &self.root.id {
            return Err(ModelError::StateNotFound(path.to_string()));
        }
        let mut state = &mut self.root;
        for id in &path.segments()[1..] {
            state = state
                .states
                .get_mut(id)
                .ok_or_else(|| ModelError::StateNotFound(path.to_string()))?;
        }
        Ok(state)
    }

    /// Resolve a path that must point at a container state
    pub(crate) fn container_mut(&mut self, path: &StatePath) -> ModelResult<&mut State> {
        let state = self.state_mut(path)?;
        if !state.is_container() {
            return Err(ModelError::NotAContainer(path.to_string()));
        }
        Ok(state)
    }

    /// Fresh state id, unique within the whole document
    pub fn new_state_id(&mut self) -> StateId {
        loop {
            let id = self.id_gen.new_state_id();
            if !contains_state_id(&self.root, &id) {
                return id;
            }
        }
    }

    pub(crate) fn element_meta_mut(&mut self, target: &EditTarget) -> ModelResult<&mut Meta> {
        let missing = |owner: &StatePath, element: String| ModelError::element_not_found(owner, element);
        match target {
            EditTarget::StateMachine => Ok(&mut self.meta),
            EditTarget::State { path } => Ok(&mut self.state_mut(path)?.meta),
            EditTarget::Port {
                owner,
                direction,
                id,
            } => self
                .state_mut(owner)?
                .ports_mut(*direction)
                .get_mut(id)
                .map(|port| &mut port.meta)
                .ok_or_else(|| missing(owner, port_label(*direction, *id))),
            EditTarget::Outcome { owner, id } => self
                .state_mut(owner)?
                .outcomes
                .get_mut(id)
                .map(|outcome| &mut outcome.meta)
                .ok_or_else(|| missing(owner, format!("outcome {}", id))),
            EditTarget::ScopedVariable { container, id } => self
                .state_mut(container)?
                .scoped_variables
                .get_mut(id)
                .map(|variable| &mut variable.meta)
                .ok_or_else(|| missing(container, format!("scoped variable {}", id))),
            EditTarget::Transition { container, id } => self
                .state_mut(container)?
                .transitions
                .get_mut(id)
                .map(|transition| &mut transition.meta)
                .ok_or_else(|| missing(container, format!("transition {}", id))),
            EditTarget::DataFlow { container, id } => self
                .state_mut(container)?
                .data_flows
                .get_mut(id)
                .map(|flow| &mut flow.meta)
                .ok_or_else(|| missing(container, format!("data flow {}", id))),
        }
    }

    /// Put a state snapshot back at `path` without notifying anybody.
    ///
    /// A root path replaces the whole root state.
    pub fn restore_state(&mut self, path: &StatePath, state: State) -> ModelResult<()> {
        if &state.id != path.last() {
            return Err(ModelError::InvalidPath(format!(
                "{} cannot hold a snapshot of state {}",
                path, state.id
            )));
        }
        match path.parent() {
            None => {
                if path.first() != &self.root.id {
                    return Err(ModelError::StateNotFound(path.to_string()));
                }
                self.root = state;
            }
            Some(parent) => {
                let parent = self.state_mut(&parent)?;
                parent.states.insert(state.id.clone(), state);
            }
        }
        debug!(path = %path, "restored state snapshot");
        self.dirty = true;
        Ok(())
    }

    /// Put a meta snapshot back on `target` without notifying anybody
    pub fn restore_meta(&mut self, target: &EditTarget, meta: Meta) -> ModelResult<()> {
        *self.element_meta_mut(target)? = meta;
        self.dirty = true;
        Ok(())
    }

    pub fn to_json(&self) -> ModelResult<String> {
        let stored = StoredDocumentRef {
            name: &self.name,
            meta: &self.meta,
            root: &self.root,
        };
        Ok(serde_json::to_string_pretty(&stored)?)
    }

    pub fn from_json(json: &str) -> ModelResult<Self> {
        let stored: StoredDocument = serde_json::from_str(json)?;
        let mut document = Self::new(stored.name, stored.root);
        document.meta = stored.meta;
        Ok(document)
    }

    /// Write the document to disk. Fails while an edit holds the storage lock.
    pub fn save(&mut self, path: &Path) -> ModelResult<()> {
        if self.storage_lock.is_locked() {
            return Err(ModelError::Locked);
        }
        std::fs::write(path, self.to_json()?)?;
        self.dirty = false;
        debug!(document = %self.name, path = %path.display(), "saved document");
        Ok(())
    }

    pub fn load(path: &Path) -> ModelResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let document = Self::from_json(&json)?;
        debug!(document = %document.name, path = %path.display(), "loaded document");
        Ok(document)
    }
}

fn contains_state_id(state: &State, id: &StateId) -> bool {
    &state.id == id || state.states.values().any(|child| contains_state_id(child, id))
}

fn port_label(direction: PortDirection, id: u32) -> String {
    match direction {
        PortDirection::Input => format!("input port {}", id),
        PortDirection::Output => format!("output port {}", id),
    }
}
