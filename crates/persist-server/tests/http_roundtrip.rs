//! The editor's HTTP client against a live server.

use std::sync::Arc;

use persist_core::surface::document_from_paragraphs;
use persist_core::{DocumentState, HttpRemote, RemoteEndpoint, StorageRecord};
use persist_server::{AppState, app, storage::DocumentStore};
use serde_json::json;
use tempfile::TempDir;

async fn spawn_server() -> (String, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState {
        store: DocumentStore::open(dir.path()).unwrap(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    (format!("http://{addr}"), dir)
}

#[tokio::test]
async fn test_save_and_load_over_http() {
    let (base_url, _dir) = spawn_server().await;
    let remote = HttpRemote::new(&base_url);

    // Nothing saved yet: 404 maps to "no document"
    assert_eq!(remote.load().await.unwrap(), None);

    let state = document_from_paragraphs(["synced"]);
    remote
        .save(&StorageRecord::new(state.clone(), 1_700_000_000_000))
        .await
        .unwrap();

    assert_eq!(remote.load().await.unwrap(), Some(state));
}

#[tokio::test]
async fn test_rejected_record_is_status_error() {
    let (base_url, _dir) = spawn_server().await;
    let remote = HttpRemote::new(&base_url);

    let invalid = StorageRecord {
        version: "1.0".into(),
        timestamp: 0,
        state: DocumentState::new(json!({ "root": {} })),
    };
    let err = remote.save(&invalid).await.unwrap_err();

    assert!(matches!(err, persist_core::RemoteError::Status(422)));
    assert_eq!(remote.load().await.unwrap(), None);
}

#[tokio::test]
async fn test_saved_document_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = DocumentStore::open(dir.path()).unwrap();
        store
            .put(StorageRecord::new(document_from_paragraphs(["kept"]), 5))
            .unwrap();
    }

    let state = Arc::new(AppState {
        store: DocumentStore::open(dir.path()).unwrap(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    let remote = HttpRemote::new(&format!("http://{addr}/"));
    assert_eq!(
        remote.load().await.unwrap(),
        Some(document_from_paragraphs(["kept"]))
    );
}
