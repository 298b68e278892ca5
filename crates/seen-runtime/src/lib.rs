//! # Seen Runtime
//!
//! Hosts a [`SyncEngine`] for the lifetime of the process.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize logging and metrics
//! 3. Restore filters from disk, or cold-load them from the remote
//! 4. Spawn the polling task
//! 5. Serve line commands on stdin until EOF, `quit` or Ctrl+C
//!
//! A fatal sync error (a delta that cannot be combined with the filter it
//! targets) stops the process.

pub mod commands;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use seen_filters::{
    BitArrayBackend, FileFilterStore, FilterStore, HttpSnapshotSource, MurmurBackend,
    SnapshotSource, SyncConfig, SyncEngine, SyncError, SyncOutcome, SystemClock, TimeSource,
};
use seen_telemetry::{PrometheusRecorder, TelemetryConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub use commands::{execute, Command, CommandError};

pub const DEFAULT_STORE_PATH: &str = "data/seen_filters.bin";

/// The engine as wired for production.
pub type Engine = SyncEngine<MurmurBackend, HttpSnapshotSource, FileFilterStore, SystemClock>;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub sync: SyncConfig,
    /// Where the filter set is persisted between runs.
    pub store_path: PathBuf,
    pub telemetry: TelemetryConfig,
}

impl RuntimeConfig {
    /// Load from the environment. `SEEN_STORE_PATH` overrides the filter
    /// file location.
    pub fn from_env() -> Self {
        Self {
            sync: SyncConfig::from_env(),
            store_path: std::env::var("SEEN_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STORE_PATH)),
            telemetry: TelemetryConfig::from_env(),
        }
    }
}

pub struct SeenRuntime {
    engine: Arc<Engine>,
    poll_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SeenRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self, SyncError> {
        let source = HttpSnapshotSource::new(&config.sync)?;
        let store = FileFilterStore::new(&config.store_path);
        let poll_interval = config.sync.poll_interval();

        info!(
            base_url = %config.sync.base_url,
            mode = %config.sync.mode,
            store = %config.store_path.display(),
            poll_secs = poll_interval.as_secs(),
            "Creating seen runtime"
        );

        let engine = SyncEngine::new(config.sync, MurmurBackend, source, store, SystemClock)
            .with_metrics(Arc::new(PrometheusRecorder));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            engine: Arc::new(engine),
            poll_interval,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    /// Bring the filters up and spawn the polling task.
    ///
    /// A failed initial sync is only an error when it is fatal; otherwise
    /// the runtime serves whatever was restored and retries on the next
    /// poll.
    pub async fn start(&self) -> Result<JoinHandle<Result<(), SyncError>>, SyncError> {
        match self.engine.init().await {
            Ok(outcome) => info!(?outcome, "Filters ready"),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "Initial sync failed, will retry"),
        }

        Ok(tokio::spawn(poll_loop(
            self.engine(),
            self.poll_interval,
            self.shutdown_rx.clone(),
        )))
    }

    pub fn shutdown(&self) {
        info!("Initiating shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    }
}

/// Tick `engine` every `interval` until `shutdown` flips. Returns early
/// with the error when a tick fails fatally.
pub async fn poll_loop<B, R, S, T>(
    engine: Arc<SyncEngine<B, R, S, T>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError>
where
    B: BitArrayBackend,
    R: SnapshotSource,
    S: FilterStore,
    T: TimeSource,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; init already synced.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Poller shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                match engine.tick(false).await {
                    Ok(SyncOutcome::Busy) | Ok(SyncOutcome::Fresh) => {}
                    Ok(outcome) => debug!(?outcome, "Poll tick"),
                    Err(e) if e.is_fatal() => return Err(e),
                    // Already logged by the engine; retried next tick.
                    Err(_) => {}
                }
            }
        }
    }
}
