//! LocalCache: versioned, expiring document cache over a KeyValueStore.
//!
//! Each document is stored under `{prefix}{document_id}` as a `StorageRecord`.
//! Nothing here ever fails the caller: corrupt entries are dropped, a full
//! store gets one purge-and-retry, and anything else is logged.

use crate::clock::{Clock, SystemClock};
use crate::document_id::DocumentId;
use crate::kv::{KeyValueStore, KvError};
use crate::record::{DocumentState, StorageRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Namespace for this application's keys in the shared store.
pub const DEFAULT_PREFIX: &str = "editor-";

/// How long a cached record stays readable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// What happened to a `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveOutcome {
    Saved,
    /// The store was full; expired entries were purged and the retry succeeded.
    SavedAfterPurge,
    /// The write was dropped. Already logged.
    Failed,
}

/// Result of a `purge_expired` scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Keys in our namespace that were inspected
    pub scanned: usize,
    /// Removed for being older than the retention window
    pub expired: usize,
    /// Removed for failing to parse as a record
    pub corrupt: usize,
}

impl PurgeReport {
    pub fn removed(&self) -> usize {
        self.expired + self.corrupt
    }
}

pub struct LocalCache<S> {
    store: S,
    clock: Arc<dyn Clock>,
    prefix: String,
    retention: Duration,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            prefix: DEFAULT_PREFIX.to_string(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Storage key for a document.
    pub fn key_for(&self, id: &DocumentId) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `state` for `id`, stamped with the current time.
    ///
    /// On a quota error, purges expired entries and retries exactly once.
    pub fn save(&self, id: &DocumentId, state: &DocumentState) -> SaveOutcome {
        let key = self.key_for(id);

        match self.write(&key, state) {
            Ok(()) => {
                debug!("Saved {} to local cache", key);
                SaveOutcome::Saved
            }
            Err(KvError::QuotaExceeded(_)) => {
                warn!("Storage quota exceeded - cleaning up old entries");
                self.purge_expired();
                match self.write(&key, state) {
                    Ok(()) => SaveOutcome::SavedAfterPurge,
                    Err(e) => {
                        warn!("Local save of {} failed after cleanup: {}", key, e);
                        SaveOutcome::Failed
                    }
                }
            }
            Err(e) => {
                warn!("Local save of {} failed: {}", key, e);
                SaveOutcome::Failed
            }
        }
    }

    /// Read the cached state for `id`.
    ///
    /// Returns `None` for a missing, expired or invalid entry. Expired and
    /// invalid entries are removed from the store.
    pub fn load(&self, id: &DocumentId) -> Option<DocumentState> {
        self.record(id).map(|record| record.state)
    }

    /// Read the whole cached record for `id`, with the same checks as `load`.
    pub fn record(&self, id: &DocumentId) -> Option<StorageRecord> {
        let key = self.key_for(id);

        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read {} from local cache: {}", key, e);
                return None;
            }
        };

        match StorageRecord::from_json(&raw) {
            Ok(record) if record.is_expired(self.clock.now_ms(), self.retention) => {
                debug!("Cached record {} expired", key);
                self.discard(&key);
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Invalid local cache data in {}: {}", key, e);
                self.discard(&key);
                None
            }
        }
    }

    /// Drop the cached record for `id`.
    pub fn remove(&self, id: &DocumentId) {
        self.discard(&self.key_for(id));
    }

    /// Remove every entry in our namespace that is expired or unparseable.
    ///
    /// Entries that parse but fail validation are left for `load` to discard.
    /// Keys outside the namespace are never touched.
    pub fn purge_expired(&self) -> PurgeReport {
        let mut report = PurgeReport::default();

        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list local cache keys: {}", e);
                return report;
            }
        };

        let now = self.clock.now_ms();
        for key in keys.iter().filter(|k| k.starts_with(&self.prefix)) {
            report.scanned += 1;

            let raw = match self.store.get(key) {
                Ok(Some(raw)) => raw,
                // Removed between listing and reading
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read {} during cleanup: {}", key, e);
                    continue;
                }
            };

            match serde_json::from_str::<StorageRecord>(&raw) {
                Ok(record) if record.is_expired(now, self.retention) => {
                    self.discard(key);
                    report.expired += 1;
                }
                Ok(_) => {}
                Err(_) => {
                    self.discard(key);
                    report.corrupt += 1;
                }
            }
        }

        if report.removed() > 0 {
            info!(
                "Local cache cleanup removed {} expired and {} corrupt entries",
                report.expired, report.corrupt
            );
        }
        report
    }

    fn write(&self, key: &str, state: &DocumentState) -> crate::kv::Result<()> {
        let json = StorageRecord::encode(state, self.clock.now_ms())
            .map_err(|e| KvError::Io(e.to_string()))?;
        self.store.set(key, &json)
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Failed to remove {} from local cache: {}", key, e);
        }
    }
}
