//! # Modification History
//!
//! The observer a document reports to: wires the [`ActionClassifier`] to the
//! [`HistoryEngine`] and applies the [`HistoryConfig`].

use tracing::debug;
use trellis_model::{
    ChangeNotice, ChangeObserver, Document, MetaChange, MetaMode, ModelError, ObserverError,
};

use crate::action::{Action, ActionSummary, VersionId};
use crate::classifier::ActionClassifier;
use crate::config::HistoryConfig;
use crate::engine::{HistoryEngine, Step, VersionNode};
use crate::errors::HistoryResult;
use crate::version_tree::BranchCreated;

#[derive(Debug, Default)]
pub struct ModificationHistory {
    config: HistoryConfig,
    engine: HistoryEngine,
    classifier: ActionClassifier,
}

impl ModificationHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            engine: HistoryEngine::new(),
            classifier: ActionClassifier::new(),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn engine(&self) -> &HistoryEngine {
        &self.engine
    }

    pub fn classifier(&self) -> &ActionClassifier {
        &self.classifier
    }

    pub fn on_branch(&mut self, listener: impl FnMut(&BranchCreated) + 'static) {
        self.engine.on_branch(listener);
    }

    pub fn undo(&mut self, doc: &mut Document) -> HistoryResult<bool> {
        if !self.config.enabled {
            debug!("history disabled, undo ignored");
            return Ok(false);
        }
        self.engine.undo(doc)
    }

    pub fn redo(&mut self, doc: &mut Document) -> HistoryResult<bool> {
        if !self.config.enabled {
            debug!("history disabled, redo ignored");
            return Ok(false);
        }
        self.engine.redo(doc)
    }

    pub fn recover_version(&mut self, doc: &mut Document, version_id: VersionId) -> HistoryResult<()> {
        if !self.config.enabled {
            debug!(version_id, "history disabled, recovery ignored");
            return Ok(());
        }
        self.engine.recover_version(doc, version_id)
    }

    pub fn undo_redo_path(&self, version_id: VersionId) -> HistoryResult<Vec<(VersionId, Step)>> {
        self.engine.undo_redo_path(version_id)
    }

    pub fn get_trail(&self) -> Vec<ActionSummary> {
        self.engine.get_trail()
    }

    pub fn get_all_versions(&self) -> Vec<VersionNode> {
        self.engine.get_all_versions()
    }

    pub fn can_undo(&self) -> bool {
        self.config.enabled && self.engine.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.config.enabled && self.engine.can_redo()
    }

    pub fn change_count(&self) -> u64 {
        self.engine.change_count()
    }

    pub fn check_consistency(&self) -> HistoryResult<()> {
        self.engine.check_consistency()
    }

    /// Forget everything, e.g. after the document was reloaded
    pub fn reset(&mut self) {
        self.classifier.interrupt();
        self.engine.reset();
    }

    fn record_meta(&mut self, change: &MetaChange) -> HistoryResult<()> {
        if !self.config.record_meta_changes {
            return Ok(());
        }
        if matches!(change.mode, MetaMode::Initial | MetaMode::Load) {
            return Ok(());
        }
        if self.classifier.absorb_meta(change) {
            return Ok(());
        }
        if self.classifier.is_busy() {
            // the surrounding edit is not recorded either
            return Ok(());
        }

        let append = change.mode == MetaMode::AppendToLast;
        if (append || self.config.coalesce_meta_changes) && self.engine.absorb_into_head(change, append) {
            return Ok(());
        }
        self.engine.insert(Action::meta_change(change))?;
        Ok(())
    }
}

impl ChangeObserver for ModificationHistory {
    fn before(&mut self, document: &Document, notice: &ChangeNotice) -> Result<(), ObserverError> {
        if !self.config.enabled {
            return Ok(());
        }
        self.classifier
            .before(document, notice)
            .map_err(ObserverError::from)
    }

    fn after(
        &mut self,
        document: &Document,
        notice: &ChangeNotice,
        outcome: Result<(), &ModelError>,
    ) -> Result<(), ObserverError> {
        if !self.config.enabled {
            return Ok(());
        }
        if let Some(completed) = self.classifier.after(document, notice, outcome)? {
            let (action, _guard) = completed.into_parts();
            self.engine.insert(action)?;
        }
        Ok(())
    }

    fn meta_changed(&mut self, _document: &Document, change: &MetaChange) -> Result<(), ObserverError> {
        if !self.config.enabled {
            return Ok(());
        }
        Ok(self.record_meta(change)?)
    }
}
