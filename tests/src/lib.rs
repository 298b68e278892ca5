//! # Seen Filters Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Criterion benchmarks (hashing, canonicalization)
//! └── src/
//!     ├── fixtures.rs   # Published snapshot builders
//!     └── integration/  # Multi-day sync flows across restarts
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p seen-tests
//! cargo bench -p seen-tests
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod integration;
