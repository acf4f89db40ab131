//! Run-scoped identifier allocation.

use robustness_types::{ClientId, RequestId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out request and client identifiers for one run.
///
/// Each orchestrated run owns its own provider, so repeated runs in one
/// process never share counters.
#[derive(Debug, Default)]
pub struct IdProvider {
    next_request: AtomicU64,
    next_client: AtomicU64,
}

impl IdProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next request identifier. Distinct across all concurrent callers.
    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    /// Next client identifier.
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client.fetch_add(1, Ordering::Relaxed))
    }
}
