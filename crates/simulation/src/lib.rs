//! Simulated key-value store.
//!
//! [`SimStore`] stands in for the store under test when exercising traffic
//! generation in-process. It keeps a revision counter, per-key revision
//! metadata, leases and atomic transactions, and can inject seeded failures
//! and latency so transient failures are reproducible.
//!
//! # Example
//!
//! ```ignore
//! use robustness_simulation::{FaultConfig, SimStore};
//!
//! let store = SimStore::with_faults(FaultConfig::default().with_failure_rate(0.05), 42);
//! let client = store.connect(0).await?;
//! client.put("0", "1", None).await?;
//! ```

mod state;
mod store;

pub use store::{FaultConfig, SimStore};
