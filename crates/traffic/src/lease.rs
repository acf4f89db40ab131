//! Per-client lease tracking.

use dashmap::DashMap;
use robustness_types::{ClientId, LeaseId};

/// Lease currently held by each simulated client.
///
/// A client only ever touches its own entry; the map is shared so all clients
/// of a run can use one store.
#[derive(Debug, Default)]
pub struct LeaseIdStore {
    leases: DashMap<ClientId, LeaseId>,
}

impl LeaseIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease held by `client`, if any.
    pub fn get(&self, client: ClientId) -> Option<LeaseId> {
        self.leases.get(&client).map(|entry| *entry)
    }

    /// Record that `client` holds `lease`.
    pub fn set(&self, client: ClientId, lease: LeaseId) {
        self.leases.insert(client, lease);
    }

    /// Forget the lease held by `client`.
    pub fn clear(&self, client: ClientId) {
        self.leases.remove(&client);
    }
}
