//! Configuration for an editor session.

use crate::cache::{DEFAULT_PREFIX, DEFAULT_RETENTION};
use crate::document_id::GENERATED_LEN;
use crate::key_resolver::DEFAULT_KEY_PARAM;
use crate::loader::Normalization;
use crate::record::DocumentState;
use crate::remote_sync::DEFAULT_SYNC_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BUNDLED_DEFAULT_DOCUMENT: &str = include_str!("../assets/default_document.json");

/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Namespace for keys in the local store
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,

    /// How long cached records stay readable (default: 7 days)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Remote push period (default: 30 seconds)
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Local cache cleanup period (default: 1 day)
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// Address query parameter carrying the document ID
    #[serde(default = "default_key_param")]
    pub key_param: String,

    /// Length of generated document IDs
    #[serde(default = "default_id_length")]
    pub id_length: usize,

    /// Inline format stripped from loaded text
    #[serde(default = "default_highlight_format")]
    pub highlight_format: String,

    /// Block style property stripped from loaded paragraphs
    #[serde(default = "default_spacing_style")]
    pub spacing_style: String,

    /// Shown when neither cache nor remote has the document.
    /// Explicit `null` disables it; omitted uses the bundled welcome document.
    #[serde(default = "default_document")]
    pub default_document: Option<DocumentState>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            storage_prefix: default_storage_prefix(),
            retention_secs: default_retention_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            key_param: default_key_param(),
            id_length: default_id_length(),
            highlight_format: default_highlight_format(),
            spacing_style: default_spacing_style(),
            default_document: default_document(),
        }
    }
}

impl PersistConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn normalization(&self) -> Normalization {
        Normalization {
            highlight_format: self.highlight_format.clone(),
            spacing_style: self.spacing_style.clone(),
        }
    }
}

fn default_storage_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION.as_secs()
}

fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL.as_secs()
}

fn default_purge_interval_secs() -> u64 {
    24 * 3600 // 1 day
}

fn default_key_param() -> String {
    DEFAULT_KEY_PARAM.to_string()
}

fn default_id_length() -> usize {
    GENERATED_LEN
}

fn default_highlight_format() -> String {
    "highlight".to_string()
}

fn default_spacing_style() -> String {
    "margin-bottom".to_string()
}

fn default_document() -> Option<DocumentState> {
    serde_json::from_str(BUNDLED_DEFAULT_DOCUMENT).ok()
}
