//! persist-server: the remote document endpoint the editor syncs to.
//!
//! Routes:
//! - `GET /load` - last saved record (404 when nothing saved)
//! - `POST /save` - replace the record
//! - `GET /health` - liveness

pub mod routes;
pub mod storage;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::storage::DocumentStore;

/// Shared application state
pub struct AppState {
    pub store: DocumentStore,
}

/// Build the router.
///
/// CORS is permissive: the editor is served from a different origin.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/load", get(routes::load))
        .route("/save", post(routes::save))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
