//! StorageRecord: the versioned envelope persisted locally and remotely.
//!
//! Wire format (identical in the local store and at the remote endpoint):
//!
//! ```text
//! { "version": "1.0", "timestamp": <epoch-ms>, "state": <opaque editor state> }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Schema tag written into every record.
pub const STORAGE_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Record is missing {0}")]
    Missing(&'static str),
}

pub type Result<T> = std::result::Result<T, RecordError>;

/// Serialized editor state. Opaque to this crate; only the editing surface
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentState(Value);

impl DocumentState {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl From<Value> for DocumentState {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// A document state with its schema version and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub version: String,
    /// Creation time in milliseconds since epoch
    pub timestamp: u64,
    pub state: DocumentState,
}

/// Borrowed view for encoding without cloning the state.
#[derive(Serialize)]
struct RecordRef<'a> {
    version: &'a str,
    timestamp: u64,
    state: &'a DocumentState,
}

impl StorageRecord {
    /// Create a record stamped with the current schema version.
    pub fn new(state: DocumentState, timestamp: u64) -> Self {
        Self {
            version: STORAGE_VERSION.to_string(),
            timestamp,
            state,
        }
    }

    /// Encode a state as a record JSON string without taking ownership of it.
    pub fn encode(state: &DocumentState, timestamp: u64) -> Result<String> {
        let record = RecordRef {
            version: STORAGE_VERSION,
            timestamp,
            state,
        };
        Ok(serde_json::to_string(&record)?)
    }

    /// Parse and validate a record.
    pub fn from_json(s: &str) -> Result<Self> {
        let record: StorageRecord = serde_json::from_str(s)?;
        record.validate()?;
        Ok(record)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// A record must carry a version, a non-zero timestamp and a non-null state.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(RecordError::Missing("version"));
        }
        if self.timestamp == 0 {
            return Err(RecordError::Missing("timestamp"));
        }
        if self.state.is_null() {
            return Err(RecordError::Missing("state"));
        }
        Ok(())
    }

    /// Whether this record is older than `retention` at `now_ms`.
    pub fn is_expired(&self, now_ms: u64, retention: Duration) -> bool {
        now_ms.saturating_sub(self.timestamp) > retention.as_millis() as u64
    }

    pub fn is_current_version(&self) -> bool {
        self.version == STORAGE_VERSION
    }
}
