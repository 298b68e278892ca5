//! Error types for the seen-filter subsystem

use thiserror::Error;

/// Errors raised by filter records, the bit-array primitive and the
/// canonicalizer. None of these perform I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Input could not be parsed as a web URL. Callers skip the key.
    #[error("Malformed URL {url:?}: {reason}")]
    MalformedUrl { url: String, reason: String },

    /// A compressed filter could not be expanded into a bit array.
    ///
    /// Fatal for the affected record: the caller refetches a full filter
    /// instead of retrying the decompression.
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Two filters with different size parameters were combined.
    #[error("Incompatible filters: size parameter {left} != {right}")]
    IncompatibleFilters { left: u8, right: u8 },

    #[error("Invalid size parameter: {0} (must be between 3 and 31)")]
    InvalidSizeParam(u8),

    #[error("Buffer of {actual} bytes does not match size parameter {size_param} ({expected} bytes)")]
    BufferSizeMismatch {
        size_param: u8,
        expected: usize,
        actual: usize,
    },

    #[error("Filter for threshold {0} is not materialized")]
    NotMaterialized(u32),

    #[error("Invalid filter parameters: {0}")]
    InvalidParameters(String),
}

/// Errors from the remote snapshot source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout fetching {0}")]
    Timeout(String),

    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from durable filter storage
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Filter store is locked by another process: {0}")]
    Locked(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced at the sync engine boundary
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(#[from] SourceError),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// The manifest published no threshold usable in the configured mode.
    #[error("Manifest publishes no usable thresholds")]
    EmptyManifest,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Invariant violations that indicate a corrupted snapshot family.
    ///
    /// Everything else is recovered from on the next scheduled tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Filter(FilterError::IncompatibleFilters { .. })
        )
    }
}
