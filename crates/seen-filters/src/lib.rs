//! # Seen Filters
//!
//! Client-side membership cache answering "has this URL been posted, and
//! at what score?" from a set of threshold-partitioned Bloom filters that
//! are kept in step with a remotely published snapshot.
//!
//! ## Architecture
//!
//! This crate follows Hexagonal Architecture (Ports & Adapters):
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `BitArray`: Fixed-size bit array with 23 MurmurHash3 probes
//!   - `canonicalize`: URL to canonical membership key
//!   - `FilterRecord` / `FilterSet`: Per-threshold filters and their provenance
//!   - `RemoteManifest` / `plan_update`: Snapshot metadata and update planning
//!   - `SyncConfig`: Configuration with validation
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `SeenFilterApi`: Driving port (query, insert, force sync, reset)
//!   - `BitArrayBackend`, `SnapshotSource`, `FilterStore`, `TimeSource`: Driven ports
//!
//! - **Service Layer** (`service/`): Orchestration
//!   - `SyncEngine`: Implements `SeenFilterApi`
//!   - `PersistenceGateway`: Single-flight writes to durable storage
//!
//! - **Adapters Layer** (`adapters/`): External connections
//!   - `HttpSnapshotSource`: Manifest and blobs over HTTP
//!   - `FileFilterStore`: Locked, atomically replaced file on disk
//!   - `MurmurBackend`: In-process bit array backend
//!   - `StaticSnapshotSource`, `InMemoryFilterStore`, `FixedClock`: Test doubles
//!
//! ## Invariants
//!
//! - No false negatives: a key inserted into a record always tests present
//!   while that record is materialized and not being stored.
//! - Records in a set have strictly increasing thresholds.
//! - Only filters with equal size parameters are combined.
//!
//! ## Usage Example
//!
//! ```ignore
//! use seen_filters::{
//!     FileFilterStore, HttpSnapshotSource, MurmurBackend, SeenFilterApi, SyncConfig,
//!     SyncEngine, SystemClock,
//! };
//!
//! let config = SyncConfig::from_env();
//! let source = HttpSnapshotSource::new(&config)?;
//! let store = FileFilterStore::new("/var/lib/seen/filters.bin");
//! let engine = SyncEngine::new(config, MurmurBackend, source, store, SystemClock);
//!
//! engine.init().await?;
//! let thresholds = engine.query_set("https://example.com/story").await;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports for convenience
pub use adapters::{
    FileFilterStore, FixedClock, HttpSnapshotSource, InMemoryFilterStore, MurmurBackend,
    StaticSnapshotSource, SystemClock,
};
pub use domain::{
    canonicalize, BitArray, CanonicalKey, FilterMode, FilterProvenance, FilterRecord, FilterSet,
    RemoteManifest, StoredFilterSet, SyncConfig, Timestamp, UpdatePlan,
};
pub use error::{FilterError, SourceError, StoreError, SyncError};
pub use metrics::{MetricsRecorder, NoOpMetrics, SyncMetrics, SyncMetricsSnapshot};
pub use ports::{
    BitArrayBackend, FilterStore, RecordStatus, SeenFilterApi, SnapshotSource, SyncOutcome,
    SyncStatus, TimeSource,
};
pub use service::{PersistenceGateway, StoreOutcome, SyncEngine};
