//! Outbound Ports (Driven Ports)
//!
//! Dependencies the sync engine needs from the outside: the bit-array
//! primitive, the remote snapshot publisher, durable storage and a clock.

use std::fmt;

use async_trait::async_trait;

use crate::domain::{RemoteManifest, StoredFilterSet, Timestamp};
use crate::error::{FilterError, SourceError, StoreError};

/// Bit-array membership primitive.
///
/// Handles are owned values; `destroy` consumes one. All calls are
/// synchronous and never suspend.
pub trait BitArrayBackend: Send + Sync {
    type Handle: Send + Sync + fmt::Debug;

    /// Allocate a zeroed array of `2^size_param` bits.
    fn create(&self, size_param: u8) -> Result<Self::Handle, FilterError>;

    /// Load raw snapshot bytes declared to have `size_param`.
    fn load(&self, size_param: u8, bytes: &[u8]) -> Result<Self::Handle, FilterError>;

    fn destroy(&self, handle: Self::Handle);

    fn insert(&self, handle: &mut Self::Handle, size_param: u8, key: &[u8]);

    fn test(&self, handle: &Self::Handle, size_param: u8, key: &[u8]) -> bool;

    /// OR `other` into `target`.
    fn combine(
        &self,
        target: &mut Self::Handle,
        other: &Self::Handle,
        size_param: u8,
    ) -> Result<(), FilterError>;

    /// Expand a compressed blob, returning the handle and the size
    /// parameter derived from the decompressed length.
    fn decompress(&self, bytes: &[u8]) -> Result<(Self::Handle, u8), FilterError>;

    /// Copy of the raw bytes held by `handle`.
    fn snapshot(&self, handle: &Self::Handle) -> Vec<u8>;
}

/// Remote publisher of manifests and filter blobs.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SourceError>;

    /// Fetch a blob by file name, e.g. `hn-10.blob`.
    async fn fetch_blob(&self, name: &str) -> Result<Vec<u8>, SourceError>;
}

/// Durable storage for the whole filter set.
///
/// Writes are all-or-nothing: a reader sees either the previous set or the
/// new one.
#[async_trait]
pub trait FilterStore: Send + Sync {
    async fn read(&self) -> Result<Option<StoredFilterSet>, StoreError>;

    async fn write(&self, set: &StoredFilterSet) -> Result<(), StoreError>;

    async fn remove(&self) -> Result<(), StoreError>;
}

/// Time source (for testability)
pub trait TimeSource: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}
