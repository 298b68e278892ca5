//! # Integration Flows
//!
//! The sync engine driven through its host API across simulated days,
//! restarts and outages.

pub mod persistence_flows;
pub mod sync_flows;
