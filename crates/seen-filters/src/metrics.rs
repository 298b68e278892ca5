//! Metrics hooks for sync and query activity
//!
//! The engine reports through [`MetricsRecorder`]. [`SyncMetrics`] keeps
//! plain atomic counters; hosts that export to an external system
//! implement the trait themselves.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use seen_filters::metrics::SyncMetrics;
//!
//! let metrics = Arc::new(SyncMetrics::new());
//! let engine = SyncEngine::new(config, backend, source, store, clock)
//!     .with_metrics(metrics.clone());
//!
//! engine.tick(false).await?;
//! println!("{:?}", metrics.snapshot());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe sync counters.
#[derive(Default)]
pub struct SyncMetrics {
    /// Ticks started (scheduled or forced)
    pub ticks: AtomicU64,
    /// Whole-set loads from the remote
    pub cold_loads: AtomicU64,
    /// Single records replaced by a full download during an update
    pub full_replacements: AtomicU64,
    /// Deltas combined into existing records
    pub deltas_merged: AtomicU64,
    /// Blob bytes received
    pub bytes_downloaded: AtomicU64,
    /// Membership queries answered
    pub queries: AtomicU64,
    /// Queries where at least one filter reported the key
    pub positive_queries: AtomicU64,
    /// Completed writes to durable storage
    pub stores: AtomicU64,
    /// Writes skipped because another one was in flight
    pub skipped_stores: AtomicU64,
    /// Ticks that ended in an error
    pub sync_errors: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            cold_loads: self.cold_loads.load(Ordering::Relaxed),
            full_replacements: self.full_replacements.load(Ordering::Relaxed),
            deltas_merged: self.deltas_merged.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            positive_queries: self.positive_queries.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            skipped_stores: self.skipped_stores.load(Ordering::Relaxed),
            sync_errors: self.sync_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncMetricsSnapshot {
    pub ticks: u64,
    pub cold_loads: u64,
    pub full_replacements: u64,
    pub deltas_merged: u64,
    pub bytes_downloaded: u64,
    pub queries: u64,
    pub positive_queries: u64,
    pub stores: u64,
    pub skipped_stores: u64,
    pub sync_errors: u64,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to integrate with external metrics systems
/// like Prometheus.
pub trait MetricsRecorder: Send + Sync {
    fn record_tick(&self);

    fn record_cold_load(&self);

    /// A full filter blob of `bytes` was downloaded.
    fn record_full_download(&self, bytes: usize);

    /// A delta blob of `bytes` was downloaded and combined.
    fn record_delta_merged(&self, bytes: usize);

    fn record_query(&self, positive: bool);

    fn record_store(&self, skipped: bool);

    fn record_sync_error(&self, fatal: bool);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_tick(&self) {}
    fn record_cold_load(&self) {}
    fn record_full_download(&self, _: usize) {}
    fn record_delta_merged(&self, _: usize) {}
    fn record_query(&self, _: bool) {}
    fn record_store(&self, _: bool) {}
    fn record_sync_error(&self, _: bool) {}
}

impl MetricsRecorder for SyncMetrics {
    fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cold_load(&self) {
        self.cold_loads.fetch_add(1, Ordering::Relaxed);
    }

    fn record_full_download(&self, bytes: usize) {
        self.full_replacements.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_delta_merged(&self, bytes: usize) {
        self.deltas_merged.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_query(&self, positive: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if positive {
            self.positive_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_store(&self, skipped: bool) {
        if skipped {
            self.skipped_stores.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stores.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_sync_error(&self, _fatal: bool) {
        self.sync_errors.fetch_add(1, Ordering::Relaxed);
    }
}
