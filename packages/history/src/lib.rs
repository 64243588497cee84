//! # Trellis History
//!
//! Modification history of state machine documents: undo/redo over the active edit
//! sequence, and a version tree that keeps every edit ever made so that any earlier or
//! abandoned version can be recovered.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: observed edits                       │
//! └─────────────────────────────────────────────┘
//!                     ↓ before/after notifications
//! ┌─────────────────────────────────────────────┐
//! │ classifier: nesting depth → one Action      │
//! └─────────────────────────────────────────────┘
//!                     ↓ insert
//! ┌─────────────────────────────────────────────┐
//! │ engine: version tree + trail                │
//! │  - undo / redo along the trail              │
//! │  - recover any version of the tree          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trellis_history::{EditSession, HistoryConfig};
//!
//! let mut session = EditSession::new("client-1", doc, HistoryConfig::default());
//! session.edit(|doc, obs| doc.create_state(obs, &root, "open", StateKind::Execution))?;
//! session.undo()?;
//!
//! // jump to any version, even one on an abandoned branch
//! let versions = session.all_versions();
//! session.recover_version(versions[1].summary.version_id)?;
//! ```

mod action;
mod classifier;
mod config;
mod engine;
mod errors;
mod history;
mod session;
mod trail;
mod version_tree;

pub use action::{Action, ActionKind, ActionSummary, FieldKind, MetaDelta, Snapshot, VersionId};
pub use classifier::{classify, ActionClassifier, CompletedAction};
pub use config::{HistoryConfig, DEFAULT_CONFIG_NAME};
pub use engine::{HistoryEngine, Step, VersionNode};
pub use errors::{HistoryError, HistoryResult};
pub use history::ModificationHistory;
pub use session::EditSession;
pub use trail::Trail;
pub use version_tree::{BranchCreated, TreeNode, VersionTree};
