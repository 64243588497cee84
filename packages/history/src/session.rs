//! # Edit Session
//!
//! One open document together with its modification history.
//!
//! The history lives as long as the session: it is created empty when the document is
//! opened and dropped when the session is closed. Only the document is ever persisted.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::info;
use trellis_model::{ChangeObserver, Document, ModelResult};

use crate::action::{ActionSummary, VersionId};
use crate::config::HistoryConfig;
use crate::engine::VersionNode;
use crate::errors::HistoryResult;
use crate::history::ModificationHistory;

#[derive(Debug)]
pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    document: Document,
    history: ModificationHistory,
    opened_at: DateTime<Utc>,
}

impl EditSession {
    pub fn new(id: impl Into<String>, document: Document, config: HistoryConfig) -> Self {
        let id = id.into();
        info!(session = %id, document = %document.name(), "session opened");
        Self {
            id,
            document,
            history: ModificationHistory::new(config),
            opened_at: Utc::now(),
        }
    }

    /// Load a document from disk and start an empty history for it
    pub fn open(id: impl Into<String>, path: &Path, config: HistoryConfig) -> HistoryResult<Self> {
        let document = Document::load(path)?;
        Ok(Self::new(id, document, config))
    }

    /// Run an edit with the history observing it.
    ///
    /// ```rust,ignore
    /// session.edit(|doc, obs| doc.set_state_name(obs, &path, "open"))?;
    /// ```
    pub fn edit<T>(
        &mut self,
        edit: impl FnOnce(&mut Document, &mut dyn ChangeObserver) -> ModelResult<T>,
    ) -> ModelResult<T> {
        edit(&mut self.document, &mut self.history)
    }

    pub fn undo(&mut self) -> HistoryResult<bool> {
        self.history.undo(&mut self.document)
    }

    pub fn redo(&mut self) -> HistoryResult<bool> {
        self.history.redo(&mut self.document)
    }

    pub fn recover_version(&mut self, version_id: VersionId) -> HistoryResult<()> {
        self.history.recover_version(&mut self.document, version_id)
    }

    pub fn trail(&self) -> Vec<ActionSummary> {
        self.history.get_trail()
    }

    pub fn all_versions(&self) -> Vec<VersionNode> {
        self.history.get_all_versions()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn history(&self) -> &ModificationHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut ModificationHistory {
        &mut self.history
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn save(&mut self, path: &Path) -> HistoryResult<()> {
        self.document.save(path)?;
        Ok(())
    }

    /// End the session. The history is discarded, the document is handed back.
    pub fn close(self) -> Document {
        info!(
            session = %self.id,
            versions = self.history.engine().tree().len(),
            "session closed"
        );
        self.document
    }
}
