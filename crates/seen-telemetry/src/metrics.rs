//! Prometheus metrics for the sync engine.
//!
//! All metrics follow the naming convention: `seen_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use seen_filters::MetricsRecorder;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Sync ticks started, scheduled or forced
    pub static ref SYNC_TICKS: Counter = Counter::new(
        "seen_sync_ticks_total",
        "Total number of sync ticks started"
    ).expect("metric creation failed");

    /// Whole-set loads from the remote
    pub static ref COLD_LOADS: Counter = Counter::new(
        "seen_cold_loads_total",
        "Total number of full filter set loads"
    ).expect("metric creation failed");

    /// Full filters downloaded and swapped in
    pub static ref FULL_DOWNLOADS: Counter = Counter::new(
        "seen_full_downloads_total",
        "Total number of full filter downloads"
    ).expect("metric creation failed");

    /// Deltas downloaded and combined into a filter
    pub static ref DELTAS_MERGED: Counter = Counter::new(
        "seen_deltas_merged_total",
        "Total number of deltas merged"
    ).expect("metric creation failed");

    pub static ref DOWNLOADED_BYTES: Counter = Counter::new(
        "seen_downloaded_bytes_total",
        "Total blob bytes received"
    ).expect("metric creation failed");

    /// Membership queries by result
    pub static ref QUERIES: CounterVec = CounterVec::new(
        Opts::new("seen_queries_total", "Membership queries answered"),
        &["result"]  // result: hit/miss
    ).expect("metric creation failed");

    /// Writes to durable storage by outcome
    pub static ref STORES: CounterVec = CounterVec::new(
        Opts::new("seen_stores_total", "Filter set writes to durable storage"),
        &["outcome"]  // outcome: written/skipped
    ).expect("metric creation failed");

    /// Failed ticks by severity
    pub static ref SYNC_ERRORS: CounterVec = CounterVec::new(
        Opts::new("seen_sync_errors_total", "Sync ticks that ended in an error"),
        &["severity"]  // severity: fatal/recoverable
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry. Safe to call more than
/// once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SYNC_TICKS.clone()),
        Box::new(COLD_LOADS.clone()),
        Box::new(FULL_DOWNLOADS.clone()),
        Box::new(DELTAS_MERGED.clone()),
        Box::new(DOWNLOADED_BYTES.clone()),
        Box::new(QUERIES.clone()),
        Box::new(STORES.clone()),
        Box::new(SYNC_ERRORS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Feeds engine events into the global Prometheus counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusRecorder;

impl MetricsRecorder for PrometheusRecorder {
    fn record_tick(&self) {
        SYNC_TICKS.inc();
    }

    fn record_cold_load(&self) {
        COLD_LOADS.inc();
    }

    fn record_full_download(&self, bytes: usize) {
        FULL_DOWNLOADS.inc();
        DOWNLOADED_BYTES.inc_by(bytes as f64);
    }

    fn record_delta_merged(&self, bytes: usize) {
        DELTAS_MERGED.inc();
        DOWNLOADED_BYTES.inc_by(bytes as f64);
    }

    fn record_query(&self, positive: bool) {
        let result = if positive { "hit" } else { "miss" };
        QUERIES.with_label_values(&[result]).inc();
    }

    fn record_store(&self, skipped: bool) {
        let outcome = if skipped { "skipped" } else { "written" };
        STORES.with_label_values(&[outcome]).inc();
    }

    fn record_sync_error(&self, fatal: bool) {
        let severity = if fatal { "fatal" } else { "recoverable" };
        SYNC_ERRORS.with_label_values(&[severity]).inc();
    }
}
