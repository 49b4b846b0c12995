//! RemoteEndpoint trait for the remote document service.
//!
//! Implementations:
//! - `InMemoryRemote` - in-process fake with failure injection (tests)
//! - `HttpRemote` - reqwest client for `GET /load` and `POST /save` (feature `http`)

#[cfg(feature = "http")]
pub mod http;

use crate::record::{DocumentState, StorageRecord};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote returned status {0}")]
    Status(u16),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Fetch the stored document state.
    ///
    /// `Ok(None)` means the remote has nothing saved.
    async fn load(&self) -> Result<Option<DocumentState>>;

    /// Store a record, replacing whatever the remote held.
    async fn save(&self, record: &StorageRecord) -> Result<()>;
}

#[async_trait]
impl<T: RemoteEndpoint + ?Sized> RemoteEndpoint for Arc<T> {
    async fn load(&self) -> Result<Option<DocumentState>> {
        (**self).load().await
    }

    async fn save(&self, record: &StorageRecord) -> Result<()> {
        (**self).save(record).await
    }
}

/// Extract the document state from a `/load` response body.
///
/// Accepts the record envelope or, for older servers, a bare state. A null
/// body (or a null state inside an envelope) means nothing is stored.
pub fn unwrap_payload(body: Value) -> Option<DocumentState> {
    let state = match body {
        Value::Object(mut map) if map.contains_key("version") && map.contains_key("state") => {
            map.remove("state").unwrap_or(Value::Null)
        }
        other => other,
    };
    if state.is_null() {
        None
    } else {
        Some(DocumentState::new(state))
    }
}

/// In-memory remote for testing.
#[derive(Default)]
pub struct InMemoryRemote {
    record: RwLock<Option<StorageRecord>>,
    failing: AtomicBool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `record` already stored.
    pub fn with_record(record: StorageRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
            ..Self::default()
        }
    }

    /// While failing, every call returns a network error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn last_record(&self) -> Option<StorageRecord> {
        self.record
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteEndpoint for InMemoryRemote {
    async fn load(&self) -> Result<Option<DocumentState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.last_record().map(|record| record.state))
    }

    async fn save(&self, record: &StorageRecord) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        *self.record.write().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }
}
