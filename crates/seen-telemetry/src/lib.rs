//! # Seen Telemetry
//!
//! Structured logging and Prometheus metrics for hosts running the
//! seen-filters sync engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seen_telemetry::{init_telemetry, PrometheusRecorder, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//!
//! let engine = SyncEngine::new(..).with_metrics(Arc::new(PrometheusRecorder));
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `seen-filters` | Service name in logs |
//! | `SEEN_LOG_LEVEL` | `info` | Log level filter |
//! | `SEEN_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SEEN_JSON_LOGS` | `false` | JSON log lines |

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    gather_text, register_metrics, PrometheusRecorder, COLD_LOADS, DELTAS_MERGED,
    DOWNLOADED_BYTES, FULL_DOWNLOADS, QUERIES, STORES, SYNC_ERRORS, SYNC_TICKS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    tracing_setup::init_tracing(config)
}
