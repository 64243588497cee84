//! Error types for the modification history

use thiserror::Error;
use trellis_model::{EditTarget, ModelError};

use crate::action::VersionId;

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History needs update for an unclassifiable change: {operation} on {target}")]
    Unclassifiable { target: EditTarget, operation: String },

    #[error("For every before there must be an after: {0}")]
    MismatchedNesting(String),

    #[error("Unknown version: {0}")]
    UnknownVersion(VersionId),

    #[error("Version tree is inconsistent: {0}")]
    TreeInconsistent(String),

    #[error("Document storage is locked by another edit")]
    StorageLocked,

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
