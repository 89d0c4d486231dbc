//! Per-server health tracking.
//!
//! Health state is process-local and ephemeral: it is rebuilt from live
//! traffic and never persisted. The store is the only mutable state shared
//! across concurrent requests.

pub mod store;

pub use store::{CircuitState, HealthRecord, HealthStore};
