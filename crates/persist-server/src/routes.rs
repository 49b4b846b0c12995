//! Request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use persist_core::{RecordError, StorageRecord};
use thiserror::Error;

use crate::AppState;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No document saved")]
    NotFound,

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Save task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidRecord(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Storage(_) | ApiError::Task(_) => {
                tracing::error!("Failed to save document: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `GET /load`
pub async fn load(State(state): State<Arc<AppState>>) -> Result<Json<StorageRecord>, ApiError> {
    state.store.get().map(Json).ok_or(ApiError::NotFound)
}

/// `POST /save`
///
/// The body is validated as a record before it replaces the stored one.
pub async fn save(State(state): State<Arc<AppState>>, body: String) -> Result<StatusCode, ApiError> {
    let record = StorageRecord::from_json(&body).inspect_err(|e| {
        tracing::debug!("Rejected save: {}", e);
    })?;
    if !record.is_current_version() {
        tracing::warn!("Saving record with version {}", record.version);
    }
    tokio::task::spawn_blocking(move || state.store.put(record)).await??;
    tracing::debug!("Saved document");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
