//! # Change Notifications
//!
//! Every observed edit of a [`Document`] reports itself to exactly one [`ChangeObserver`]:
//! a `before` call right before the document is touched and a matching `after` call once
//! the edit finished (successfully or not). Edits that cascade (removing a state also
//! removes its transitions and data flows) report each cascaded edit as a nested
//! before/after pair inside the outer one:
//!
//! ```text
//! before(remove_state)
//!   before(remove_transition)  after(remove_transition)
//!   before(remove_data_flow)   after(remove_data_flow)
//! after(remove_state)
//! ```
//!
//! Meta annotation changes are reported once, after the fact, through
//! [`ChangeObserver::meta_changed`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::element::{DataFlowId, ElementKind, Meta, OutcomeId, PortDirection, PortId, TransitionId};
use crate::error::{ModelError, ObserverError};
use crate::path::StatePath;

/// The element an edit is applied to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditTarget {
    /// The document itself (root replacement, document-level meta)
    StateMachine,
    State {
        path: StatePath,
    },
    Port {
        owner: StatePath,
        direction: PortDirection,
        id: PortId,
    },
    Outcome {
        owner: StatePath,
        id: OutcomeId,
    },
    ScopedVariable {
        container: StatePath,
        id: PortId,
    },
    Transition {
        container: StatePath,
        id: TransitionId,
    },
    DataFlow {
        container: StatePath,
        id: DataFlowId,
    },
}

impl EditTarget {
    pub fn state(path: StatePath) -> Self {
        EditTarget::State { path }
    }

    /// Path of the state owning the target, `None` for the document itself
    pub fn owner_path(&self) -> Option<&StatePath> {
        match self {
            EditTarget::StateMachine => None,
            EditTarget::State { path } => Some(path),
            EditTarget::Port { owner, .. } | EditTarget::Outcome { owner, .. } => Some(owner),
            EditTarget::ScopedVariable { container, .. }
            | EditTarget::Transition { container, .. }
            | EditTarget::DataFlow { container, .. } => Some(container),
        }
    }
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::StateMachine => write!(f, "state machine"),
            EditTarget::State { path } => write!(f, "state {}", path),
            EditTarget::Port {
                owner,
                direction,
                id,
            } => write!(f, "{:?} port {} of {}", direction, id, owner),
            EditTarget::Outcome { owner, id } => write!(f, "outcome {} of {}", id, owner),
            EditTarget::ScopedVariable { container, id } => {
                write!(f, "scoped variable {} of {}", id, container)
            }
            EditTarget::Transition { container, id } => {
                write!(f, "transition {} of {}", id, container)
            }
            EditTarget::DataFlow { container, id } => write!(f, "data flow {} of {}", id, container),
        }
    }
}

/// What an edit does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add(ElementKind),
    Remove(ElementKind),
    /// Attribute change; the attribute is the notice's `property`
    Modify,
    /// Replace the whole root state by one of another kind
    ChangeRootStateType,
}

impl Operation {
    /// Method-style name of the operation, e.g. `add_state` or `remove_outcome`
    pub fn name(&self) -> String {
        match self {
            Operation::Add(kind) => format!("add_{}", kind.as_str()),
            Operation::Remove(kind) => format!("remove_{}", kind.as_str()),
            Operation::Modify => "modify".to_string(),
            Operation::ChangeRootStateType => "change_root_state_type".to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One before/after notification
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotice {
    pub target: EditTarget,
    pub property: &'static str,
    pub operation: Operation,
}

impl ChangeNotice {
    pub fn new(target: EditTarget, property: &'static str, operation: Operation) -> Self {
        Self {
            target,
            property,
            operation,
        }
    }

    pub fn add(container: StatePath, kind: ElementKind) -> Self {
        Self::new(EditTarget::state(container), kind.collection(), Operation::Add(kind))
    }

    pub fn remove(container: StatePath, kind: ElementKind) -> Self {
        Self::new(
            EditTarget::state(container),
            kind.collection(),
            Operation::Remove(kind),
        )
    }

    pub fn modify(target: EditTarget, property: &'static str) -> Self {
        Self::new(target, property, Operation::Modify)
    }

    /// Human readable cause, e.g. `remove_state` or `modify name`
    pub fn cause(&self) -> String {
        match self.operation {
            Operation::Modify => format!("modify {}", self.property),
            other => other.name(),
        }
    }
}

/// How a meta change relates to the previously recorded one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaMode {
    /// An ordinary user change
    New,
    /// Belongs to the most recently recorded change (e.g. layout fix-ups after grouping)
    AppendToLast,
    /// Initial layout of freshly created elements; not an edit
    Initial,
    /// Meta data loaded from storage; not an edit
    Load,
}

/// A meta annotation of one element changed
#[derive(Debug, Clone, PartialEq)]
pub struct MetaChange {
    pub target: EditTarget,
    pub before: Meta,
    pub after: Meta,
    pub mode: MetaMode,
}

/// Receiver of the before/after notification stream of a [`Document`]
pub trait ChangeObserver {
    /// The edit described by `notice` is about to be applied to `document`.
    ///
    /// Returning an error vetoes the edit: it is not applied and `after` receives the
    /// rejection as its outcome.
    fn before(&mut self, document: &Document, notice: &ChangeNotice) -> Result<(), ObserverError>;

    /// The edit described by `notice` finished; `outcome` carries its error if it failed
    fn after(
        &mut self,
        document: &Document,
        notice: &ChangeNotice,
        outcome: Result<(), &ModelError>,
    ) -> Result<(), ObserverError>;

    /// A meta annotation changed
    fn meta_changed(&mut self, _document: &Document, _change: &MetaChange) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ChangeObserver for NullObserver {
    fn before(&mut self, _document: &Document, _notice: &ChangeNotice) -> Result<(), ObserverError> {
        Ok(())
    }

    fn after(
        &mut self,
        _document: &Document,
        _notice: &ChangeNotice,
        _outcome: Result<(), &ModelError>,
    ) -> Result<(), ObserverError> {
        Ok(())
    }
}
