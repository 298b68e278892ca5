//! In-memory snapshot source.
//!
//! Serves a manifest and named blobs from memory. Used by tests and for
//! running against a pre-fetched snapshot without network access. Clones
//! share state so a test can publish a new generation between ticks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::RemoteManifest;
use crate::error::SourceError;
use crate::ports::outbound::SnapshotSource;

#[derive(Default)]
struct Published {
    manifest: RwLock<Option<RemoteManifest>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    offline: AtomicBool,
    manifest_fetches: AtomicUsize,
    blob_fetches: RwLock<Vec<String>>,
}

#[derive(Clone, Default)]
pub struct StaticSnapshotSource {
    published: Arc<Published>,
}

impl StaticSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_manifest(&self, manifest: RemoteManifest) {
        *self.published.manifest.write() = Some(manifest);
    }

    pub fn publish_blob(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.published.blobs.write().insert(name.into(), bytes);
    }

    /// Simulate a network outage.
    pub fn set_offline(&self, offline: bool) {
        self.published.offline.store(offline, Ordering::SeqCst);
    }

    pub fn manifest_fetches(&self) -> usize {
        self.published.manifest_fetches.load(Ordering::SeqCst)
    }

    /// Names of all blobs fetched so far, in order.
    pub fn blob_fetches(&self) -> Vec<String> {
        self.published.blob_fetches.read().clone()
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.published.offline.load(Ordering::SeqCst) {
            Err(SourceError::Connection("source offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshotSource {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SourceError> {
        self.check_online()?;
        self.published.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        self.published
            .manifest
            .read()
            .clone()
            .ok_or_else(|| SourceError::NotFound("manifest".to_string()))
    }

    async fn fetch_blob(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        self.check_online()?;
        self.published.blob_fetches.write().push(name.to_string());
        self.published
            .blobs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}
