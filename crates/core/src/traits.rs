//! Client traits for the key-value store under test.

use async_trait::async_trait;
use robustness_types::{
    Comparison, DeleteResponse, GetResponse, LeaseGrantResponse, LeaseId, LeaseRevokeResponse,
    LeaseTimeToLiveResponse, PutResponse, RangeResponse, StoreError, TxnOp, TxnResponse,
};
use std::sync::Arc;

/// Client connected to the store under test.
///
/// Implementations perform network I/O; callers bound every call with their
/// own timeout and never assume a call is retried.
///
/// # Example
///
/// ```ignore
/// let resp = client.get("0").await?;
/// let expected = resp.kv.map(|kv| kv.mod_revision).unwrap_or(Revision::ZERO);
/// let txn = client
///     .txn(
///         vec![Comparison { key: "0".into(), expected_revision: expected }],
///         vec![TxnOp::Put { key: "0".into(), value: "v".into() }],
///     )
///     .await?;
/// ```
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Read a single key.
    async fn get(&self, key: &str) -> Result<GetResponse, StoreError>;

    /// Read every key starting with `prefix`.
    async fn range(&self, prefix: &str) -> Result<RangeResponse, StoreError>;

    /// Write a key, optionally attaching it to a lease.
    async fn put(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<PutResponse, StoreError>;

    /// Delete a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<DeleteResponse, StoreError>;

    /// Atomically apply `ops` if every condition holds.
    ///
    /// A failed condition is not an error: the response reports
    /// `succeeded == false` and nothing is applied.
    async fn txn(
        &self,
        conditions: Vec<Comparison>,
        ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError>;

    /// Grant a lease with the given time-to-live.
    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseGrantResponse, StoreError>;

    /// Revoke a lease, deleting every key attached to it.
    async fn lease_revoke(&self, lease: LeaseId) -> Result<LeaseRevokeResponse, StoreError>;

    /// Query the remaining lifetime of a lease.
    async fn lease_time_to_live(
        &self,
        lease: LeaseId,
    ) -> Result<LeaseTimeToLiveResponse, StoreError>;

    /// Run a maintenance defragmentation on the connected member.
    async fn defragment(&self) -> Result<(), StoreError>;
}

/// Shared handle to a store client.
pub type SharedKvClient = Arc<dyn KvClient>;

/// Factory for store clients.
///
/// Each simulated client gets its own connection; `index` lets
/// implementations spread clients over the cluster's endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a client for the simulated client with the given index.
    async fn connect(&self, index: usize) -> Result<SharedKvClient, StoreError>;
}
