//! Service Layer
//!
//! Orchestrates the domain through the outbound ports: the sync engine
//! drives ticks, and the persistence gateway moves the filter set to and
//! from durable storage.

pub mod persistence;
pub mod sync_engine;

pub use persistence::{PersistenceGateway, StoreOutcome};
pub use sync_engine::SyncEngine;
