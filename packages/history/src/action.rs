//! # Actions
//!
//! One [`Action`] is one logical, reversible edit. It keeps a snapshot of the state
//! subtree the edit touched, taken before and after the edit, plus the meta annotation
//! changes that happened outside that subtree while the edit was running.
//!
//! ## Design
//!
//! - Undo restores the before snapshot, redo restores the after snapshot
//! - Snapshots are addressed by [`StatePath`] and re-resolved on every undo/redo
//! - Actions never change after insertion, except for meta merging

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_model::{Document, EditTarget, ElementKind, Meta, MetaChange, ModelResult, State, StatePath};

/// Position of an action in the version tree; 0 is the sentinel root
pub type VersionId = usize;

/// What kind of element an attribute edit changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    DataFlow,
    Transition,
    ScopedVariable,
    Outcome,
    Port,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum ActionKind {
    /// Placeholder at the root of every version tree
    CompositeNoOp,
    StructuralAdd(ElementKind),
    StructuralRemove(ElementKind),
    FieldChange(FieldKind),
    /// The whole root state was replaced
    StateMachineLevelChange,
    MetaAnnotationChange,
}

/// Before/after copy of the state subtree an edit touched
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Empty,
    Subtree {
        path: StatePath,
        before: Box<State>,
        after: Box<State>,
    },
}

/// Meta annotations of one target, before and after
#[derive(Debug, Clone, PartialEq)]
pub struct MetaDelta {
    pub target: EditTarget,
    pub before: Meta,
    pub after: Meta,
}

impl MetaDelta {
    fn from_change(change: &MetaChange) -> Self {
        Self {
            target: change.target.clone(),
            before: change.before.clone(),
            after: change.after.clone(),
        }
    }
}

/// Merge `change` into `deltas`: the first before of a target wins, the latest after wins
fn merge_meta(deltas: &mut Vec<MetaDelta>, change: &MetaChange) {
    match deltas.iter_mut().find(|delta| delta.target == change.target) {
        Some(delta) => delta.after = change.after.clone(),
        None => deltas.push(MetaDelta::from_change(change)),
    }
}

/// A recorded, reversible edit
#[derive(Debug, Clone)]
pub struct Action {
    version_id: VersionId,
    kind: ActionKind,
    operation: String,
    parent_path: Option<StatePath>,
    snapshot: Snapshot,
    meta: Vec<MetaDelta>,
    recorded_at: DateTime<Utc>,
}

impl Action {
    /// The no-op action every version tree starts with
    pub fn sentinel() -> Self {
        Self {
            version_id: 0,
            kind: ActionKind::CompositeNoOp,
            operation: "init".to_string(),
            parent_path: None,
            snapshot: Snapshot::Empty,
            meta: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    /// A stand-alone meta annotation change
    pub fn meta_change(change: &MetaChange) -> Self {
        Self {
            version_id: 0,
            kind: ActionKind::MetaAnnotationChange,
            operation: "change_meta".to_string(),
            parent_path: change.target.owner_path().cloned(),
            snapshot: Snapshot::Empty,
            meta: vec![MetaDelta::from_change(change)],
            recorded_at: Utc::now(),
        }
    }

    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    pub(crate) fn set_version_id(&mut self, version_id: VersionId) {
        self.version_id = version_id;
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Name of the edit that produced this action, e.g. `remove_state`
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Container the edit applies under; `None` for document-level changes
    pub fn parent_path(&self) -> Option<&StatePath> {
        self.parent_path.as_ref()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn meta_deltas(&self) -> &[MetaDelta] {
        &self.meta
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Bring the document back to the state before this action
    pub fn undo(&self, doc: &mut Document) -> ModelResult<()> {
        for delta in self.meta.iter().rev() {
            doc.restore_meta(&delta.target, delta.before.clone())?;
        }
        if let Snapshot::Subtree { path, before, .. } = &self.snapshot {
            doc.restore_state(path, before.as_ref().clone())?;
        }
        Ok(())
    }

    /// Bring the document to the state after this action
    pub fn redo(&self, doc: &mut Document) -> ModelResult<()> {
        if let Snapshot::Subtree { path, after, .. } = &self.snapshot {
            doc.restore_state(path, after.as_ref().clone())?;
        }
        for delta in &self.meta {
            doc.restore_meta(&delta.target, delta.after.clone())?;
        }
        Ok(())
    }

    /// Fold a later meta change into this action's after state
    pub(crate) fn absorb_meta(&mut self, change: &MetaChange) {
        merge_meta(&mut self.meta, change);
    }

    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            version_id: self.version_id,
            kind: self.kind,
            operation: self.operation.clone(),
            parent_path: self.parent_path.clone(),
            recorded_at: self.recorded_at,
        }
    }
}

/// An action whose edit is still running: the before snapshot is taken, the after
/// snapshot follows once the outermost edit finished
#[derive(Debug)]
pub(crate) struct PendingAction {
    kind: ActionKind,
    operation: String,
    path: StatePath,
    before: State,
    meta: Vec<MetaDelta>,
}

impl PendingAction {
    pub fn capture(
        kind: ActionKind,
        operation: String,
        path: StatePath,
        doc: &Document,
    ) -> ModelResult<Self> {
        let before = doc.state(&path)?.clone();
        Ok(Self {
            kind,
            operation,
            path,
            before,
            meta: Vec::new(),
        })
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Record a meta change made while the edit runs. Changes inside the captured
    /// subtree are already part of the after snapshot.
    pub fn absorb_meta(&mut self, change: &MetaChange) {
        let covered = change
            .target
            .owner_path()
            .map_or(false, |owner| owner.starts_with(&self.path));
        if !covered {
            merge_meta(&mut self.meta, change);
        }
    }

    pub fn complete(self, doc: &Document) -> ModelResult<Action> {
        let after = doc.state(&self.path)?.clone();
        Ok(Action {
            version_id: 0,
            kind: self.kind,
            operation: self.operation,
            parent_path: Some(self.path.clone()),
            snapshot: Snapshot::Subtree {
                path: self.path,
                before: Box::new(self.before),
                after: Box::new(after),
            },
            meta: self.meta,
            recorded_at: Utc::now(),
        })
    }
}

/// Read-only view of an action for undo/redo lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub version_id: VersionId,
    pub kind: ActionKind,
    pub operation: String,
    pub parent_path: Option<StatePath>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_model::{MetaMode, NullObserver, StateId, StateKind};

    fn document() -> Document {
        Document::new(
            "door",
            State::new(StateId::new("ROOT"), "root", StateKind::Hierarchy),
        )
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut doc = document();
        let root = doc.root_path();
        let pending = PendingAction::capture(
            ActionKind::StructuralAdd(ElementKind::State),
            "add_state".to_string(),
            root.clone(),
            &doc,
        )
        .unwrap();
        doc.create_state(&mut NullObserver, &root, "open", StateKind::Execution)
            .unwrap();
        let action = pending.complete(&doc).unwrap();
        let after = doc.root().clone();

        action.undo(&mut doc).unwrap();
        assert!(doc.root().states.is_empty());

        action.redo(&mut doc).unwrap();
        assert_eq!(doc.root(), &after);
    }

    #[test]
    fn test_meta_merge_keeps_first_before() {
        let mut doc = document();
        let target = EditTarget::StateMachine;
        let first = MetaChange {
            target: target.clone(),
            before: Meta::new(),
            after: [("x".to_string(), json!(1))].into_iter().collect(),
            mode: MetaMode::New,
        };
        let second = MetaChange {
            target: target.clone(),
            before: first.after.clone(),
            after: [("x".to_string(), json!(2))].into_iter().collect(),
            mode: MetaMode::New,
        };

        let mut action = Action::meta_change(&first);
        action.absorb_meta(&second);

        assert_eq!(action.meta_deltas().len(), 1);
        action.redo(&mut doc).unwrap();
        assert_eq!(doc.meta()["x"], json!(2));
        action.undo(&mut doc).unwrap();
        assert!(doc.meta().is_empty());
    }

    #[test]
    fn test_summary_serialization() {
        let summary = Action::sentinel().summary();
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["versionId"], json!(0));
        assert_eq!(value["kind"]["kind"], json!("composite_no_op"));
    }
}
