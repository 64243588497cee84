//! Error types for the state machine model

use thiserror::Error;

use crate::element::OutcomeId;

pub type ModelResult<T> = Result<T, ModelError>;

/// Error raised by a [`ChangeObserver`](crate::ChangeObserver) and handed back to the caller
/// of the edit that triggered it.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("State not found: {0}")]
    StateNotFound(String),

    #[error("Invalid state path: {0:?}")]
    InvalidPath(String),

    #[error("State {0} cannot hold child states")]
    NotAContainer(String),

    #[error("State {state} has no {element}")]
    ElementNotFound { state: String, element: String },

    #[error("State {state} already contains {element}")]
    DuplicateElement { state: String, element: String },

    #[error("Outcome {0} is protected and cannot be removed")]
    ProtectedOutcome(OutcomeId),

    #[error("The root state cannot be removed")]
    RootRemoval,

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Document storage is locked by an in-flight edit")]
    Locked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Change observer rejected the edit: {0}")]
    Observer(#[source] ObserverError),
}

impl ModelError {
    pub fn element_not_found(state: impl ToString, element: impl Into<String>) -> Self {
        Self::ElementNotFound {
            state: state.to_string(),
            element: element.into(),
        }
    }

    pub fn duplicate_element(state: impl ToString, element: impl Into<String>) -> Self {
        Self::DuplicateElement {
            state: state.to_string(),
            element: element.into(),
        }
    }

    pub fn invalid_connection(message: impl Into<String>) -> Self {
        Self::InvalidConnection(message.into())
    }
}
