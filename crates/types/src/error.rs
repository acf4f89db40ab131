//! Error types for store calls and history validation.

use crate::{ClientId, LeaseId, RequestId, Revision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single call to the store under test.
///
/// These are recorded verbatim in the history, so the checker sees every
/// failure instead of having it hidden by a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StoreError {
    /// The call did not complete within the per-request timeout.
    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The store could not be reached or refused the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A revision condition did not hold.
    #[error("Precondition failed for {key}: expected {expected}")]
    PreconditionFailed { key: String, expected: Revision },

    /// The lease does not exist (expired or revoked).
    #[error("{0} not found")]
    LeaseNotFound(LeaseId),

    /// The run was cancelled while the call was in flight.
    #[error("Request cancelled")]
    Cancelled,
}

/// Violations detected by [`History::validate`](crate::History::validate).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// A record completed before it was invoked.
    #[error("{0} returned before it was invoked")]
    InvertedInterval(RequestId),

    /// The same request identifier appears twice.
    #[error("{0} recorded more than once")]
    DuplicateRequest(RequestId),

    /// A client had two operations in flight at once.
    #[error("{client} issued {first} and {second} concurrently")]
    OverlappingClientOperations {
        client: ClientId,
        first: RequestId,
        second: RequestId,
    },
}
