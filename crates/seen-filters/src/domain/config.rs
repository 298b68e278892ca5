//! Sync configuration
//!
//! # Environment Variables
//!
//! - `SEEN_BASE_URL`: Directory URL the manifest and blobs are served from
//! - `SEEN_BLOB_PREFIX`: Blob name prefix (default: hn)
//! - `SEEN_MANIFEST_NAME`: Manifest file name (default: manifest.json)
//! - `SEEN_MODE`: `single` or `multiple` (default: single)
//! - `SEEN_POLL_SECS`: Polling interval (default: 600)
//! - `SEEN_STALENESS_SECS`: Staleness window (default: 7 days)
//! - `SEEN_TIMEOUT_SECS`: Per-request timeout (default: 30)

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::filter_set::FilterMode;
use crate::domain::manifest::DEFAULT_STALENESS_WINDOW_SECS;
use crate::error::SyncError;

pub const DEFAULT_BASE_URL: &str =
    "https://github.com/jstrieb/hackernews-button/releases/latest/download/";
pub const DEFAULT_BLOB_PREFIX: &str = "hn";
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.json";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Sync engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory URL, with trailing slash.
    pub base_url: String,

    pub blob_prefix: String,

    pub manifest_name: String,

    pub mode: FilterMode,

    /// Seconds between scheduled ticks.
    pub poll_interval_secs: u64,

    /// Seconds of delta history a record may lag before it is replaced
    /// rather than patched.
    pub staleness_window_secs: u64,

    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            blob_prefix: DEFAULT_BLOB_PREFIX.to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            mode: FilterMode::Single,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            staleness_window_secs: DEFAULT_STALENESS_WINDOW_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Create a config for testing (local URL, short intervals).
    pub fn for_testing() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            mode: FilterMode::Multiple,
            poll_interval_secs: 1,
            request_timeout_secs: 2,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_url: env::var("SEEN_BASE_URL").unwrap_or(defaults.base_url),

            blob_prefix: env::var("SEEN_BLOB_PREFIX").unwrap_or(defaults.blob_prefix),

            manifest_name: env::var("SEEN_MANIFEST_NAME").unwrap_or(defaults.manifest_name),

            mode: env::var("SEEN_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.mode),

            poll_interval_secs: env::var("SEEN_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_interval_secs),

            staleness_window_secs: env::var("SEEN_STALENESS_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.staleness_window_secs),

            request_timeout_secs: env::var("SEEN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(SyncError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }

        if self.blob_prefix.is_empty() || self.blob_prefix.contains('/') {
            return Err(SyncError::InvalidConfig(
                "blob_prefix must be a non-empty file name prefix".to_string(),
            ));
        }

        if self.manifest_name.is_empty() {
            return Err(SyncError::InvalidConfig(
                "manifest_name cannot be empty".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs cannot be 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder-style method to set the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    /// Builder-style method to set the filter mode
    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_blob_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.blob_prefix = prefix.into();
        self
    }

    pub fn with_staleness_window_secs(mut self, secs: u64) -> Self {
        self.staleness_window_secs = secs;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
