//! Traffic generation for key-value store robustness testing.
//!
//! Drives a configurable number of concurrent clients against a store under
//! test and records every call, with invocation and completion timestamps,
//! into a [`History`](robustness_types::History) that a linearizability
//! checker can consume.
//!
//! # Architecture
//!
//! - **Governor**: token bucket shared by all clients, capping aggregate QPS
//! - **Recording client**: times out, records and returns every store call
//! - **Workloads**: generic key-value and structured-resource traffic drivers
//! - **Runner**: spawns clients, merges their histories and writes the final
//!   marker once traffic has settled
//!
//! # Example
//!
//! ```ignore
//! use robustness_simulation::SimStore;
//! use robustness_traffic::{simulate_traffic, TrafficConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = TrafficConfig::low_traffic().with_duration(Duration::from_secs(5));
//! let report = simulate_traffic(config, Arc::new(SimStore::new()), CancellationToken::new()).await?;
//! report.print();
//! ```

pub mod choice;
pub mod client;
pub mod config;
pub mod error;
pub mod governor;
pub mod identity;
pub mod lease;
pub mod report;
pub mod runner;
pub mod workloads;

pub use choice::{ChoiceError, ChoiceWeight, WeightedChoices};
pub use client::RecordingClient;
pub use config::{ConfigError, TrafficConfig, TrafficKind};
pub use error::TrafficError;
pub use governor::{Governor, GovernorError};
pub use identity::IdProvider;
pub use lease::LeaseIdStore;
pub use report::{KindStats, LatencySummary, TrafficReport};
pub use runner::{simulate_traffic, TrafficRunner, MARKER_KEY, MARKER_VALUE};
pub use workloads::{
    KvRequestType, KvTraffic, ResourceRequestType, ResourceTraffic, Traffic, TrafficContext,
};
