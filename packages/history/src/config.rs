use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::HistoryResult;

pub const DEFAULT_CONFIG_NAME: &str = "history.config.json";

/// Modification history configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Record edits at all; when off, undo and redo do nothing
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Record meta annotation changes (layout, positions, ...)
    #[serde(default = "default_true")]
    pub record_meta_changes: bool,

    /// Merge consecutive meta changes into one action
    #[serde(default = "default_true")]
    pub coalesce_meta_changes: bool,
}

fn default_true() -> bool {
    true
}

impl HistoryConfig {
    /// Load config from a directory
    pub fn load(dir: &Path) -> HistoryResult<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: HistoryConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(HistoryConfig::default())
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            record_meta_changes: true,
            coalesce_meta_changes: true,
        }
    }
}
