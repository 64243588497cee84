//! # History Engine
//!
//! Owns the [`VersionTree`] and the [`Trail`] and keeps them consistent under insert,
//! undo, redo and version recovery.
//!
//! ## Version recovery
//!
//! ```text
//! trail [0, 1, 4], pointer at 4          recover(3)
//!
//!     0 ── 1 ── 4                        undo 4
//!           \                            redo 2
//!            2 ── 3                      redo 3
//!
//! trail [0, 1, 2, 3], 4 kept as a branch of 1
//! ```
//!
//! When the target is already on the trail the engine only moves the pointer. Otherwise
//! it walks back from the target until it meets an applied version (the join), undoes
//! down to the join and redoes along the path to the target.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use trellis_model::{Document, MetaChange};

use crate::action::{Action, ActionKind, ActionSummary, VersionId};
use crate::errors::{HistoryError, HistoryResult};
use crate::trail::Trail;
use crate::version_tree::{BranchCreated, VersionTree};

/// Direction of one step of a recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Undo,
    Redo,
}

/// One node of the version tree as shown in a version browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionNode {
    #[serde(flatten)]
    pub summary: ActionSummary,
    pub prev_id: Option<VersionId>,
    pub next_id: Option<VersionId>,
    pub old_next_ids: Vec<VersionId>,
    pub on_trail: bool,
    pub applied: bool,
}

type BranchListener = Box<dyn FnMut(&BranchCreated)>;

/// Steps to reach a version plus the trail change that follows them
struct Plan {
    steps: Vec<(VersionId, Step)>,
    /// Trail position of the join and the versions from the join (exclusive) to the target
    reroot: Option<(usize, Vec<VersionId>)>,
}

pub struct HistoryEngine {
    tree: VersionTree,
    trail: Trail,
    change_count: u64,
    branch_listeners: Vec<BranchListener>,
}

impl fmt::Debug for HistoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEngine")
            .field("versions", &self.tree.len())
            .field("trail", &self.trail)
            .field("change_count", &self.change_count)
            .field("branch_listeners", &self.branch_listeners.len())
            .finish()
    }
}

impl HistoryEngine {
    pub fn new() -> Self {
        Self {
            tree: VersionTree::new(),
            trail: Trail::new(),
            change_count: 0,
            branch_listeners: Vec::new(),
        }
    }

    /// Forget every version; only the sentinel remains
    pub fn reset(&mut self) {
        self.tree = VersionTree::new();
        self.trail = Trail::new();
        self.change_count += 1;
        debug!("history reset");
    }

    /// Register a callback fired whenever an insert leaves an old continuation behind
    pub fn on_branch(&mut self, listener: impl FnMut(&BranchCreated) + 'static) {
        self.branch_listeners.push(Box::new(listener));
    }

    pub fn tree(&self) -> &VersionTree {
        &self.tree
    }

    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    /// Bumped by every change of the history, for UI refresh
    pub fn change_count(&self) -> u64 {
        self.change_count
    }

    pub fn current_version(&self) -> VersionId {
        self.trail.current()
    }

    pub fn can_undo(&self) -> bool {
        self.trail.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.trail.can_redo()
    }

    /// Record an action as the successor of the current version
    pub fn insert(&mut self, action: Action) -> HistoryResult<VersionId> {
        let prev = self.trail.current();
        let operation = action.operation().to_string();
        let (id, branch) = self.tree.append(action, prev)?;
        self.trail.insert(id);
        self.change_count += 1;
        debug!(version_id = id, prev_id = prev, operation = %operation, "inserted action");

        if let Some(branch) = branch {
            info!(
                at = branch.at,
                new_next_id = branch.new_next_id,
                previous_next_id = branch.previous_next_id,
                "new branch created"
            );
            for listener in &mut self.branch_listeners {
                listener(&branch);
            }
        }
        Ok(id)
    }

    /// Revert the current version. Returns false when there is nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> HistoryResult<bool> {
        let Some(id) = self.trail.undo_target() else {
            debug!("nothing to undo");
            return Ok(false);
        };
        let _guard = doc
            .storage_lock()
            .try_acquire()
            .ok_or(HistoryError::StorageLocked)?;

        self.tree.node(id)?.action().undo(doc)?;
        self.trail.step_back();
        self.change_count += 1;
        debug!(version_id = id, "undo");
        Ok(true)
    }

    /// Re-apply the next version on the trail. Returns false when there is nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> HistoryResult<bool> {
        let Some(id) = self.trail.redo_target() else {
            debug!("nothing to redo");
            return Ok(false);
        };
        let _guard = doc
            .storage_lock()
            .try_acquire()
            .ok_or(HistoryError::StorageLocked)?;

        self.tree.node(id)?.action().redo(doc)?;
        self.trail.step_forward();
        self.change_count += 1;
        debug!(version_id = id, "redo");
        Ok(true)
    }

    /// Ordered undo/redo steps leading from the current version to `target`
    pub fn undo_redo_path(&self, target: VersionId) -> HistoryResult<Vec<(VersionId, Step)>> {
        Ok(self.plan(target)?.steps)
    }

    fn plan(&self, target: VersionId) -> HistoryResult<Plan> {
        self.tree.node(target)?;
        let entries = self.trail.entries();
        let pointer = self.trail.pointer();

        if let Some(position) = self.trail.position(target) {
            let steps = if position <= pointer {
                entries[position + 1..=pointer]
                    .iter()
                    .rev()
                    .map(|id| (*id, Step::Undo))
                    .collect()
            } else {
                entries[pointer + 1..=position]
                    .iter()
                    .map(|id| (*id, Step::Redo))
                    .collect()
            };
            return Ok(Plan {
                steps,
                reroot: None,
            });
        }

        let applied: HashSet<VersionId> = self.trail.applied().iter().copied().collect();
        let ancestors = self.tree.ancestors(target)?;
        let join_index = ancestors
            .iter()
            .position(|id| applied.contains(id))
            .ok_or_else(|| {
                HistoryError::TreeInconsistent(format!(
                    "version {} shares no ancestor with the trail",
                    target
                ))
            })?;
        let join_position = self
            .trail
            .position(ancestors[join_index])
            .ok_or_else(|| HistoryError::TreeInconsistent("join left the trail".to_string()))?;

        let path: Vec<VersionId> = ancestors[..join_index].iter().rev().copied().collect();
        let steps = entries[join_position + 1..=pointer]
            .iter()
            .rev()
            .map(|id| (*id, Step::Undo))
            .chain(path.iter().map(|id| (*id, Step::Redo)))
            .collect();

        Ok(Plan {
            steps,
            reroot: Some((join_position, path)),
        })
    }

    /// Bring the document to `target`, which may lie on another branch, and make the
    /// branch through `target` the trail
    pub fn recover_version(&mut self, doc: &mut Document, target: VersionId) -> HistoryResult<()> {
        if target == self.trail.current() {
            debug!(version_id = target, "already at requested version");
            return Ok(());
        }
        let plan = self.plan(target)?;
        let _guard = doc
            .storage_lock()
            .try_acquire()
            .ok_or(HistoryError::StorageLocked)?;

        // the trail follows every step that succeeded, so a failing step leaves it
        // matching the document
        match plan.reroot {
            None => {
                for (id, step) in &plan.steps {
                    self.apply_step(doc, *id, *step)?;
                    match step {
                        Step::Undo => self.trail.step_back(),
                        Step::Redo => self.trail.step_forward(),
                    }
                }
            }
            Some((join_position, path)) => {
                let undos = plan.steps.len() - path.len();
                for (id, step) in &plan.steps[..undos] {
                    self.apply_step(doc, *id, *step)?;
                    self.trail.step_back();
                }
                let mut prev = self.trail.entries()[join_position];
                for (walked, id) in path.iter().enumerate() {
                    self.apply_step(doc, *id, Step::Redo)?;
                    self.tree.switch_next(prev, *id)?;
                    let remainder = self.tree.forward_chain(*id)?;
                    self.trail.reroot(join_position, &path[..=walked], &remainder);
                    prev = *id;
                }
            }
        }

        self.change_count += 1;
        info!(version_id = target, steps = plan.steps.len(), "recovered version");
        Ok(())
    }

    fn apply_step(&self, doc: &mut Document, id: VersionId, step: Step) -> HistoryResult<()> {
        let action = self.tree.node(id)?.action();
        let result = match step {
            Step::Undo => action.undo(doc),
            Step::Redo => action.redo(doc),
        };
        if let Err(err) = &result {
            warn!(version_id = id, step = ?step, error = %err, "recovery stopped");
        }
        Ok(result?)
    }

    /// Summaries of the trail, oldest first
    pub fn get_trail(&self) -> Vec<ActionSummary> {
        self.trail
            .entries()
            .iter()
            .filter_map(|id| self.tree.get(*id))
            .map(|node| node.action().summary())
            .collect()
    }

    /// Every version ever recorded, indexed by version id
    pub fn get_all_versions(&self) -> Vec<VersionNode> {
        let on_trail: HashSet<VersionId> = self.trail.entries().iter().copied().collect();
        let applied: HashSet<VersionId> = self.trail.applied().iter().copied().collect();
        self.tree
            .iter()
            .map(|node| VersionNode {
                summary: node.action().summary(),
                prev_id: node.prev_id(),
                next_id: node.next_id(),
                old_next_ids: node.old_next_ids().to_vec(),
                on_trail: on_trail.contains(&node.version_id()),
                applied: applied.contains(&node.version_id()),
            })
            .collect()
    }

    /// Merge a meta change into the newest applied action.
    ///
    /// With `append` the change joins whatever action is current, even with redoable
    /// versions after it. Otherwise that action must be a meta annotation change at the
    /// end of the trail.
    pub(crate) fn absorb_into_head(&mut self, change: &MetaChange, append: bool) -> bool {
        if !self.trail.can_undo() || (!append && !self.trail.is_at_end()) {
            return false;
        }
        let head = self.trail.current();
        let Some(action) = self.tree.action_mut(head) else {
            return false;
        };
        if !append && action.kind() != ActionKind::MetaAnnotationChange {
            return false;
        }
        action.absorb_meta(change);
        self.change_count += 1;
        debug!(version_id = head, target = %change.target, "merged meta change");
        true
    }

    /// Verify the tree and the trail against each other
    pub fn check_consistency(&self) -> HistoryResult<()> {
        let result = self.check_trail();
        if let Err(err) = &result {
            error!(error = %err, "history is inconsistent");
        }
        result
    }

    fn check_trail(&self) -> HistoryResult<()> {
        self.tree.check()?;
        let entries = self.trail.entries();
        if entries.first() != Some(&0) {
            return Err(HistoryError::TreeInconsistent(
                "trail does not start at the sentinel".to_string(),
            ));
        }
        if self.trail.pointer() >= entries.len() {
            return Err(HistoryError::TreeInconsistent(format!(
                "trail pointer {} past the end",
                self.trail.pointer()
            )));
        }
        for pair in entries.windows(2) {
            if self.tree.node(pair[0])?.next_id() != Some(pair[1]) {
                return Err(HistoryError::TreeInconsistent(format!(
                    "trail steps from {} to {} against the forward link",
                    pair[0], pair[1]
                )));
            }
        }
        Ok(())
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use trellis_model::{NullObserver, State, StateId, StateKind, StatePath};

    use crate::action::{FieldKind, PendingAction};
    use trellis_model::ElementKind;

    fn document() -> Document {
        Document::new(
            "door",
            State::new(StateId::new("ROOT"), "root", StateKind::Hierarchy),
        )
    }

    /// Add a child state outside of any observer and record it by hand
    fn add(engine: &mut HistoryEngine, doc: &mut Document, name: &str) -> VersionId {
        let root = doc.root_path();
        let pending = PendingAction::capture(
            ActionKind::StructuralAdd(ElementKind::State),
            "add_state".to_string(),
            root.clone(),
            doc,
        )
        .unwrap();
        doc.add_state(
            &mut NullObserver,
            &root,
            State::new(StateId::new(name), name, StateKind::Execution),
        )
        .unwrap();
        engine.insert(pending.complete(doc).unwrap()).unwrap()
    }

    fn names(doc: &Document) -> Vec<String> {
        doc.root().states.keys().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_undo_redo_on_empty_history() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        assert!(!engine.undo(&mut doc).unwrap());
        assert!(!engine.redo(&mut doc).unwrap());
        assert_eq!(engine.change_count(), 0);
    }

    #[test]
    fn test_branching_scenario() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        let branches = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&branches);
        engine.on_branch(move |branch| seen.borrow_mut().push(*branch));

        let e1 = add(&mut engine, &mut doc, "E1");
        let e2 = add(&mut engine, &mut doc, "E2");
        let e3 = add(&mut engine, &mut doc, "E3");
        assert_eq!(engine.trail().entries(), &[0, e1, e2, e3]);

        engine.undo(&mut doc).unwrap();
        engine.undo(&mut doc).unwrap();
        assert_eq!(engine.trail().pointer(), 1);
        assert_eq!(names(&doc), vec!["E1"]);

        let e4 = add(&mut engine, &mut doc, "E4");
        assert_eq!(engine.trail().entries(), &[0, e1, e4]);
        assert_eq!(engine.tree().len(), 5);
        let node = engine.tree().node(e1).unwrap();
        assert_eq!(node.next_id(), Some(e4));
        assert_eq!(node.old_next_ids(), &[e2]);
        assert_eq!(branches.borrow().len(), 1);
        assert_eq!(branches.borrow()[0].previous_next_id, e2);

        assert_eq!(
            engine.undo_redo_path(e3).unwrap(),
            vec![(e4, Step::Undo), (e2, Step::Redo), (e3, Step::Redo)]
        );
        engine.recover_version(&mut doc, e3).unwrap();

        assert_eq!(engine.trail().entries(), &[0, e1, e2, e3]);
        assert_eq!(engine.current_version(), e3);
        assert_eq!(names(&doc), vec!["E1", "E2", "E3"]);
        let node = engine.tree().node(e1).unwrap();
        assert_eq!(node.next_id(), Some(e2));
        assert_eq!(node.old_next_ids(), &[e4]);
        assert!(engine.check_consistency().is_ok());
    }

    #[test]
    fn test_recover_on_trail_moves_pointer() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        let e1 = add(&mut engine, &mut doc, "E1");
        add(&mut engine, &mut doc, "E2");
        add(&mut engine, &mut doc, "E3");

        engine.recover_version(&mut doc, e1).unwrap();
        assert_eq!(engine.trail().len(), 4);
        assert_eq!(engine.current_version(), e1);
        assert_eq!(names(&doc), vec!["E1"]);

        engine.recover_version(&mut doc, 0).unwrap();
        assert!(doc.root().states.is_empty());
        assert!(!engine.can_undo());
        assert!(engine.can_redo());
    }

    #[test]
    fn test_recover_keeps_remainder_redoable() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        let e1 = add(&mut engine, &mut doc, "E1");
        let e2 = add(&mut engine, &mut doc, "E2");
        let e3 = add(&mut engine, &mut doc, "E3");
        engine.recover_version(&mut doc, e1).unwrap();
        let e4 = add(&mut engine, &mut doc, "E4");

        engine.recover_version(&mut doc, e2).unwrap();

        assert_eq!(engine.trail().entries(), &[0, e1, e2, e3]);
        assert_eq!(engine.trail().redoable(), &[e3]);
        engine.redo(&mut doc).unwrap();
        assert_eq!(names(&doc), vec!["E1", "E2", "E3"]);
        assert!(engine.tree().node(e1).unwrap().old_next_ids().contains(&e4));
    }

    #[test]
    fn test_failed_recovery_step_keeps_trail_in_step() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        let obs = &mut NullObserver;
        let root = doc.root_path();
        let x = doc
            .add_state(obs, &root, State::new(StateId::new("X"), "x", StateKind::Hierarchy))
            .unwrap();
        let q = doc
            .add_state(obs, &root, State::new(StateId::new("Q"), "q", StateKind::Hierarchy))
            .unwrap();
        let y = doc
            .add_state(obs, &x, State::new(StateId::new("Y"), "y", StateKind::Execution))
            .unwrap();

        let record = |engine: &mut HistoryEngine,
                      doc: &mut Document,
                      kind: ActionKind,
                      path: &StatePath,
                      edit: &dyn Fn(&mut Document)| {
            let pending =
                PendingAction::capture(kind, format!("{:?}", kind), path.clone(), doc).unwrap();
            edit(&mut *doc);
            engine.insert(pending.complete(doc).unwrap()).unwrap()
        };
        let add_to_q = ActionKind::StructuralAdd(ElementKind::State);
        let e1 = record(&mut engine, &mut doc, add_to_q, &q, &|doc: &mut Document| {
            let q = StatePath::parse("ROOT/Q").unwrap();
            doc.add_state(&mut NullObserver, &q, State::new(StateId::new("W"), "w", StateKind::Execution))
                .unwrap();
        });
        let rename = ActionKind::FieldChange(FieldKind::State);
        let e2 = record(&mut engine, &mut doc, rename, &y, &|doc: &mut Document| {
            let y = StatePath::parse("ROOT/X/Y").unwrap();
            doc.set_state_name(&mut NullObserver, &y, "renamed").unwrap();
        });
        record(&mut engine, &mut doc, add_to_q, &q, &|doc: &mut Document| {
            let q = StatePath::parse("ROOT/Q").unwrap();
            doc.add_state(&mut NullObserver, &q, State::new(StateId::new("V"), "v", StateKind::Execution))
                .unwrap();
        });

        // the snapshot of e2 no longer has a parent to go back into
        doc.remove_state(obs, &x).unwrap();
        let err = engine.recover_version(&mut doc, e1).unwrap_err();

        assert!(matches!(err, HistoryError::Model(_)));
        assert_eq!(engine.current_version(), e2);
        assert_eq!(doc.state(&q).unwrap().states.len(), 1);
        assert!(!doc.storage_lock().is_locked());
        assert!(engine.check_consistency().is_ok());
    }

    #[test]
    fn test_recover_unknown_version() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        assert!(matches!(
            engine.recover_version(&mut doc, 7),
            Err(HistoryError::UnknownVersion(7))
        ));
    }

    #[test]
    fn test_undo_refused_while_locked() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        add(&mut engine, &mut doc, "E1");

        let _guard = doc.storage_lock().try_acquire().unwrap();
        assert!(matches!(engine.undo(&mut doc), Err(HistoryError::StorageLocked)));
        assert_eq!(engine.trail().pointer(), 1);
    }

    #[test]
    fn test_all_versions_marks_trail() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        add(&mut engine, &mut doc, "E1");
        add(&mut engine, &mut doc, "E2");
        engine.undo(&mut doc).unwrap();

        let versions = engine.get_all_versions();
        assert_eq!(versions.len(), 3);
        assert!(versions.iter().all(|v| v.on_trail));
        assert!(versions[1].applied);
        assert!(!versions[2].applied);
        assert_eq!(versions[2].summary.parent_path, Some(StatePath::parse("ROOT").unwrap()));
    }

    #[test]
    fn test_reset() {
        let mut engine = HistoryEngine::new();
        let mut doc = document();
        add(&mut engine, &mut doc, "E1");
        engine.reset();
        assert_eq!(engine.tree().len(), 1);
        assert_eq!(engine.get_trail().len(), 1);
        assert!(!engine.can_undo());
    }
}
