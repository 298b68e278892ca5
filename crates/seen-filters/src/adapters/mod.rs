//! Adapters Layer
//!
//! Concrete implementations of the outbound ports:
//! - `MurmurBackend`: bit arrays in the published snapshot layout
//! - `HttpSnapshotSource` / `StaticSnapshotSource`: remote snapshots
//! - `FileFilterStore` / `InMemoryFilterStore`: durable filter state
//! - `SystemClock` / `FixedClock`: time

pub mod clock;
pub mod file_store;
pub mod http_source;
pub mod memory_store;
pub mod murmur_backend;
pub mod static_source;

pub use clock::{FixedClock, SystemClock};
pub use file_store::FileFilterStore;
pub use http_source::HttpSnapshotSource;
pub use memory_store::InMemoryFilterStore;
pub use murmur_backend::MurmurBackend;
pub use static_source::StaticSnapshotSource;
