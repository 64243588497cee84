//! # Action Classifier
//!
//! Turns the nested before/after notification stream of a document into one action per
//! logical edit.
//!
//! ```text
//! before(remove_state)        depth 0 → 1   classify, snapshot, take lock
//!   before(remove_transition) depth 1 → 2
//!   after(remove_transition)  depth 2 → 1
//! after(remove_state)         depth 1 → 0   snapshot, hand out action, release lock
//! ```
//!
//! Root replacement counts on its own depth counter since it wraps the notifications of
//! everything it removes. An action completes only when both counters are back at zero.
//! The finished action still carries the storage lock until it has been inserted.

use tracing::{error, trace, warn};
use trellis_model::{
    ChangeNotice, Document, EditTarget, ElementKind, MetaChange, ModelError, Operation, StatePath,
    StorageGuard,
};

use crate::action::{Action, ActionKind, FieldKind, PendingAction};
use crate::errors::{HistoryError, HistoryResult};

/// Decide which action an outermost edit becomes and which subtree it snapshots.
///
/// Returns `None` for edits the history does not know how to record.
pub fn classify(notice: &ChangeNotice, doc: &Document) -> Option<(ActionKind, StatePath)> {
    match (notice.operation, &notice.target) {
        (Operation::ChangeRootStateType, _) => {
            Some((ActionKind::StateMachineLevelChange, doc.root_path()))
        }
        (Operation::Add(kind), EditTarget::State { path }) => {
            Some((ActionKind::StructuralAdd(kind), path.clone()))
        }
        (Operation::Remove(kind), EditTarget::State { path }) => {
            let path = match kind {
                ElementKind::State
                | ElementKind::Transition
                | ElementKind::DataFlow
                | ElementKind::ScopedVariable => path.clone(),
                // connections to ports and outcomes live in the owner's container
                ElementKind::InputPort | ElementKind::OutputPort | ElementKind::Outcome => {
                    path.parent().unwrap_or_else(|| path.clone())
                }
            };
            Some((ActionKind::StructuralRemove(kind), path))
        }
        (Operation::Modify, target) => {
            let (field, path) = match target {
                EditTarget::DataFlow { container, .. } => (FieldKind::DataFlow, container),
                EditTarget::Transition { container, .. } => (FieldKind::Transition, container),
                EditTarget::ScopedVariable { container, .. } => {
                    (FieldKind::ScopedVariable, container)
                }
                EditTarget::Outcome { owner, .. } => (FieldKind::Outcome, owner),
                EditTarget::Port { owner, .. } => (FieldKind::Port, owner),
                EditTarget::State { path } => (FieldKind::State, path),
                EditTarget::StateMachine => return None,
            };
            Some((ActionKind::FieldChange(field), path.clone()))
        }
        (Operation::Add(_) | Operation::Remove(_), _) => None,
    }
}

/// An action handed out by the classifier together with the lock it was recorded under
#[derive(Debug)]
pub struct CompletedAction {
    action: Action,
    guard: Option<StorageGuard>,
}

impl CompletedAction {
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The lock stays held until the returned guard is dropped
    pub fn into_parts(self) -> (Action, Option<StorageGuard>) {
        (self.action, self.guard)
    }
}

/// Groups nested notifications into actions
#[derive(Debug, Default)]
pub struct ActionClassifier {
    depth: usize,
    root_depth: usize,
    active: Option<PendingAction>,
    guard: Option<StorageGuard>,
}

impl ActionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an edit is in flight
    pub fn is_busy(&self) -> bool {
        self.depth > 0 || self.root_depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn root_depth(&self) -> usize {
        self.root_depth
    }

    /// Kind of the action being recorded, if any
    pub fn active_kind(&self) -> Option<ActionKind> {
        self.active.as_ref().map(PendingAction::kind)
    }

    pub fn before(&mut self, doc: &Document, notice: &ChangeNotice) -> HistoryResult<()> {
        let outermost = !self.is_busy();
        if notice.operation == Operation::ChangeRootStateType {
            self.root_depth += 1;
        } else {
            self.depth += 1;
        }
        if !outermost {
            trace!(cause = %notice.cause(), depth = self.depth, root_depth = self.root_depth, "nested edit");
            return Ok(());
        }

        let Some((kind, path)) = classify(notice, doc) else {
            error!(cause = %notice.cause(), target = %notice.target, "history needs update for an unclassifiable change");
            return Err(HistoryError::Unclassifiable {
                target: notice.target.clone(),
                operation: notice.cause(),
            });
        };

        let Some(guard) = doc.storage_lock().try_acquire() else {
            warn!(cause = %notice.cause(), "storage lock already held, edit refused");
            return Err(HistoryError::StorageLocked);
        };

        match PendingAction::capture(kind, notice.cause(), path, doc) {
            Ok(pending) => {
                trace!(cause = %notice.cause(), kind = ?kind, "action started");
                self.active = Some(pending);
                self.guard = Some(guard);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Close one notification pair. Returns the finished action once the outermost edit
    /// completed successfully.
    pub fn after(
        &mut self,
        doc: &Document,
        notice: &ChangeNotice,
        outcome: Result<(), &ModelError>,
    ) -> HistoryResult<Option<CompletedAction>> {
        if let Err(err) = outcome {
            warn!(cause = %notice.cause(), error = %err, "edit failed, discarding in-flight action");
            self.interrupt();
            return Ok(None);
        }

        let counter = if notice.operation == Operation::ChangeRootStateType {
            &mut self.root_depth
        } else {
            &mut self.depth
        };
        if *counter == 0 {
            self.interrupt();
            error!(cause = %notice.cause(), "for every before there must be an after");
            return Err(HistoryError::MismatchedNesting(notice.cause()));
        }
        *counter -= 1;
        if self.is_busy() {
            return Ok(None);
        }

        let guard = self.guard.take();
        match self.active.take() {
            Some(pending) => Ok(Some(CompletedAction {
                action: pending.complete(doc)?,
                guard,
            })),
            None => Ok(None),
        }
    }

    /// Feed a meta change into the in-flight action. Returns false when no action is
    /// being recorded.
    pub fn absorb_meta(&mut self, change: &MetaChange) -> bool {
        match &mut self.active {
            Some(pending) => {
                pending.absorb_meta(change);
                true
            }
            None => false,
        }
    }

    /// Drop the in-flight action, reset both counters and release the lock
    pub fn interrupt(&mut self) {
        if self.active.is_some() || self.is_busy() {
            trace!(depth = self.depth, root_depth = self.root_depth, "interrupting in-flight action");
        }
        self.depth = 0;
        self.root_depth = 0;
        self.active = None;
        self.guard = None;
    }
}
