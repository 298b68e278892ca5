//! Ports Layer
//!
//! Defines the interfaces (traits) for:
//! - Driving Ports (inbound) - API for the host layer
//! - Driven Ports (outbound) - bit arrays, remote source, storage, clock

pub mod inbound;
pub mod outbound;

pub use inbound::{RecordStatus, SeenFilterApi, SyncOutcome, SyncStatus};
pub use outbound::{BitArrayBackend, FilterStore, SnapshotSource, TimeSource};
