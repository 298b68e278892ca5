//! Domain Layer - Pure business logic
//!
//! This layer contains:
//! - URL canonicalization
//! - The bit-array primitive in snapshot layout
//! - Filter records and the threshold-partitioned filter set
//! - Manifest parsing and update planning
//! - Configuration
//!
//! RULES:
//! - No network or storage access
//! - No async code

pub mod bit_array;
pub mod canonical;
pub mod config;
pub mod filter_set;
pub mod manifest;
pub mod record;

pub use bit_array::{BitArray, MAX_SIZE_PARAM, MIN_SIZE_PARAM, NUM_HASHES};
pub use canonical::{canonicalize, CanonicalKey};
pub use config::SyncConfig;
pub use filter_set::{FilterMode, FilterSet, StoredFilterSet, STORE_ENTRY};
pub use manifest::{
    delta_blob_name, full_blob_name, plan_update, RemoteManifest, UpdatePlan,
    DEFAULT_STALENESS_WINDOW_SECS,
};
pub use record::{FilterProvenance, FilterRecord, Materialization, StoredFilter, Timestamp};
