//! HTTP snapshot source backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::domain::{RemoteManifest, SyncConfig};
use crate::error::{SourceError, SyncError};
use crate::ports::outbound::SnapshotSource;

/// Fetches the manifest and blobs from a static file host such as a
/// release download directory.
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
    manifest_name: String,
}

impl HttpSnapshotSource {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            manifest_name: config.manifest_name.clone(),
        })
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(url.to_string())
            } else if e.is_connect() {
                SourceError::Connection(format!("Cannot connect to {}", url))
            } else {
                SourceError::Connection(e.to_string())
            }
        })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(url.to_string())),
            status => {
                return Err(SourceError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                })
            }
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(url.to_string())
            } else {
                SourceError::Connection(e.to_string())
            }
        })?;

        debug!(url = %url, bytes = bytes.len(), "Fetched");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SourceError> {
        let url = self.url_for(&self.manifest_name);
        let bytes = self.get_bytes(&url).await?;
        RemoteManifest::from_json(&bytes).map_err(|e| SourceError::Parse(e.to_string()))
    }

    async fn fetch_blob(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        self.get_bytes(&self.url_for(name)).await
    }
}
