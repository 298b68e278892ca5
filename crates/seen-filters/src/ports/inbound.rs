//! Inbound Ports (Driving Ports)
//!
//! The only entry points the host layer (navigation hooks, badge
//! rendering, settings) may call.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::{FilterMode, Timestamp};
use crate::error::SyncError;

/// Result of a tick or forced sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every record was ahead of its next generation; nothing fetched.
    Fresh,
    /// The set was empty or incomplete and was loaded from scratch.
    ColdLoaded,
    /// Records were checked against the manifest.
    Updated {
        replaced: usize,
        patched: usize,
        skipped: usize,
    },
    /// Another tick was still running.
    Busy,
}

/// Per-threshold view for status reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordStatus {
    pub threshold: u32,
    pub size_param: u8,
    pub materialized: bool,
    pub last_downloaded: Timestamp,
    pub last_generated: Timestamp,
    pub next_generated: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub mode: FilterMode,
    pub records: Vec<RecordStatus>,
    /// In-memory changes that have not reached durable storage yet.
    pub dirty: bool,
}

/// Host-facing API (Driving Port)
#[async_trait]
pub trait SeenFilterApi: Send + Sync {
    /// Thresholds whose filter reports `url` as seen. Empty for malformed
    /// URLs and while filters are unavailable.
    async fn query_set(&self, url: &str) -> BTreeSet<u32>;

    /// Add `url` with `score` to every filter whose threshold it meets.
    async fn insert_set(&self, url: &str, score: u32) -> Result<(), SyncError>;

    /// Run a sync tick, ignoring freshness.
    async fn force_sync(&self) -> Result<SyncOutcome, SyncError>;

    /// Drop all in-memory and durable filter state.
    async fn reset_all(&self) -> Result<(), SyncError>;
}
