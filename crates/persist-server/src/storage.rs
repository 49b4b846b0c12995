//! File-backed storage for the single remote document.
//!
//! The last saved record lives in memory and in `<data-dir>/document.json`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use anyhow::{Context, Result};
use persist_core::StorageRecord;
use thiserror::Error;

const DOCUMENT_FILE: &str = "document.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct DocumentStore {
    path: PathBuf,
    record: RwLock<Option<StorageRecord>>,
    /// Orders writers; readers only wait on the in-memory swap.
    writer: Mutex<()>,
}

impl DocumentStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    ///
    /// An unreadable document file is logged and treated as empty.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let path = data_dir.join(DOCUMENT_FILE);
        let record = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            match StorageRecord::from_json(&content) {
                Ok(record) => {
                    tracing::info!("Loaded saved document from {:?}", path);
                    Some(record)
                }
                Err(e) => {
                    tracing::warn!("Ignoring invalid document file {:?}: {}", path, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            path,
            record: RwLock::new(record),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last saved record.
    pub fn get(&self) -> Option<StorageRecord> {
        self.record
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Persist `record` to disk, then make it the current record.
    ///
    /// Blocks on file IO. On error the previous record stays current.
    pub fn put(&self, record: StorageRecord) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(&record)?;

        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        std::fs::write(&self.path, content).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })?;
        *self.record.write().unwrap_or_else(|e| e.into_inner()) = Some(record);
        Ok(())
    }
}
