//! Run-level errors.

use crate::config::ConfigError;
use crate::governor::GovernorError;
use crate::report::TrafficReport;
use robustness_types::{HistoryError, StoreError};
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that abort or invalidate a traffic run.
///
/// Setup failures are returned before any traffic is issued. Completion
/// failures carry the report so the recorded history is never lost.
#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build throughput governor: {0}")]
    Governor(#[from] GovernorError),

    #[error("Failed to connect client: {0}")]
    Connect(#[source] StoreError),

    #[error("Client task failed: {0}")]
    ClientTask(#[from] JoinError),

    #[error("Recorded history is malformed: {0}")]
    MalformedHistory(#[from] HistoryError),

    #[error("Final marker write failed: {source}")]
    MarkerWrite {
        #[source]
        source: StoreError,
        report: Box<TrafficReport>,
    },

    #[error("Requiring minimal {required:.2} qps for reliable results, got {observed:.2} qps")]
    InsufficientQps {
        observed: f64,
        required: f64,
        report: Box<TrafficReport>,
    },
}

impl TrafficError {
    /// Report of a run that completed but failed a completion check.
    pub fn report(&self) -> Option<&TrafficReport> {
        match self {
            TrafficError::MarkerWrite { report, .. }
            | TrafficError::InsufficientQps { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Consume the error, returning the report if there is one.
    pub fn into_report(self) -> Option<TrafficReport> {
        match self {
            TrafficError::MarkerWrite { report, .. }
            | TrafficError::InsufficientQps { report, .. } => Some(*report),
            _ => None,
        }
    }
}
