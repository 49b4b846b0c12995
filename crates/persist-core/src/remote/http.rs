//! HttpRemote: reqwest client for the remote document service.

use super::{RemoteEndpoint, RemoteError, Result, unwrap_payload};
use crate::record::{DocumentState, StorageRecord};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

pub struct HttpRemote {
    client: Client,
    load_url: String,
    save_url: String,
}

impl HttpRemote {
    /// Endpoints at `{base_url}/load` and `{base_url}/save`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Use a preconfigured client (timeouts, proxies, TLS).
    pub fn with_client(client: Client, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client,
            load_url: format!("{base}/load"),
            save_url: format!("{base}/save"),
        }
    }

    pub fn load_url(&self) -> &str {
        &self.load_url
    }

    pub fn save_url(&self) -> &str {
        &self.save_url
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => RemoteError::Status(status.as_u16()),
            None if e.is_decode() => RemoteError::InvalidBody(e.to_string()),
            None => RemoteError::Network(e.to_string()),
        }
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn load(&self) -> Result<Option<DocumentState>> {
        let response = self.client.get(&self.load_url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Remote has no saved document");
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        Ok(unwrap_payload(body))
    }

    async fn save(&self, record: &StorageRecord) -> Result<()> {
        self.client
            .post(&self.save_url)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        debug!("Pushed record to {}", self.save_url);
        Ok(())
    }
}
