//! # Trellis Model
//!
//! Document model of the hierarchical state machine editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: Document + observed edits            │
//! │  - States, ports, outcomes, connections     │
//! │  - Nested before/after notifications        │
//! │  - Load/save documents                      │
//! └─────────────────────────────────────────────┘
//!                     ↓ ChangeObserver
//! ┌─────────────────────────────────────────────┐
//! │ history: actions, version tree, undo/redo   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Paths, not references**: states are addressed by id chains re-resolved on use
//! 2. **Explicit observer**: every edit call is handed the observer it reports to
//! 3. **Always paired**: an `after` follows every `before`, failed edits included
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trellis_model::{Document, NullObserver, StateKind};
//!
//! let mut doc = Document::with_root_kind("door", StateKind::Hierarchy);
//! let root = doc.root_path();
//! let open = doc.create_state(&mut NullObserver, &root, "open", StateKind::Execution)?;
//! doc.set_state_name(&mut NullObserver, &open, "opened")?;
//! doc.save(Path::new("door.json"))?;
//! ```

mod document;
mod edits;
mod element;
mod error;
mod id_generator;
mod lock;
mod notification;
mod path;

pub use document::Document;
pub use element::{
    DataFlow, DataFlowId, DataPort, ElementKind, Meta, Outcome, OutcomeId, PortDirection, PortId,
    ScopedVariable, State, StateKind, Transition, TransitionId, ABORTED_OUTCOME,
    PREEMPTED_OUTCOME, SUCCESS_OUTCOME,
};
pub use error::{ModelError, ModelResult, ObserverError};
pub use id_generator::{get_document_seed, IdGenerator};
pub use lock::{StorageGuard, StorageLock};
pub use notification::{
    ChangeNotice, ChangeObserver, EditTarget, MetaChange, MetaMode, NullObserver, Operation,
};
pub use path::{StateId, StatePath, PATH_SEPARATOR};
