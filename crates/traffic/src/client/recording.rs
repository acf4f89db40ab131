//! Store client that records every call into a private history.

use crate::identity::IdProvider;
use robustness_core::SharedKvClient;
use robustness_types::{
    ClientId, Comparison, DeleteResponse, GetResponse, History, LeaseGrantResponse, LeaseId,
    LeaseRevokeResponse, LeaseTimeToLiveResponse, OperationRecord, PutResponse, RangeResponse,
    Request, Response, Revision, StoreError, Timestamp, TxnOp, TxnResponse,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Wraps a store client and appends one [`OperationRecord`] per call.
///
/// Every call is bounded by the request timeout and aborted when the run is
/// cancelled. The outcome is returned to the caller unchanged; failures are
/// recorded, never retried.
pub struct RecordingClient {
    id: ClientId,
    client: SharedKvClient,
    ids: Arc<IdProvider>,
    base_time: Instant,
    request_timeout: Duration,
    cancel: CancellationToken,
    history: History,
}

impl RecordingClient {
    /// Create a recording client.
    ///
    /// `base_time` must be shared by all clients of a run so their
    /// timestamps are comparable.
    pub fn new(
        id: ClientId,
        client: SharedKvClient,
        ids: Arc<IdProvider>,
        base_time: Instant,
        request_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            client,
            ids,
            base_time,
            request_timeout,
            cancel,
            history: History::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Operations recorded so far.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Consume the client, returning its history.
    pub fn into_history(self) -> History {
        self.history
    }

    pub async fn get(&mut self, key: &str) -> Result<GetResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let owned = key.to_string();
        let request = Request::Get {
            key: key.to_string(),
        };
        self.record(request, async move { client.get(&owned).await })
            .await
    }

    pub async fn range(&mut self, prefix: &str) -> Result<RangeResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let owned = prefix.to_string();
        let request = Request::Range {
            prefix: prefix.to_string(),
        };
        self.record(request, async move { client.range(&owned).await })
            .await
    }

    pub async fn put(&mut self, key: &str, value: &str) -> Result<PutResponse, StoreError> {
        self.put_inner(key, value, None).await
    }

    pub async fn put_with_lease(
        &mut self,
        key: &str,
        value: &str,
        lease: LeaseId,
    ) -> Result<PutResponse, StoreError> {
        self.put_inner(key, value, Some(lease)).await
    }

    async fn put_inner(
        &mut self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<PutResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let (k, v) = (key.to_string(), value.to_string());
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_string(),
            lease,
        };
        self.record(request, async move { client.put(&k, &v, lease).await })
            .await
    }

    pub async fn delete(&mut self, key: &str) -> Result<DeleteResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let owned = key.to_string();
        let request = Request::Delete {
            key: key.to_string(),
        };
        self.record(request, async move { client.delete(&owned).await })
            .await
    }

    /// Multi-operation transaction. A failed condition is reported through
    /// `succeeded`, not as an error.
    pub async fn txn(
        &mut self,
        conditions: Vec<Comparison>,
        ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let request = Request::Txn {
            conditions: conditions.clone(),
            ops: ops.clone(),
        };
        self.record(request, async move { client.txn(conditions, ops).await })
            .await
    }

    /// Put `key` only if its modification revision is `expected`.
    ///
    /// A revision mismatch fails with [`StoreError::PreconditionFailed`] and
    /// is recorded as a failed operation.
    pub async fn compare_revision_and_put(
        &mut self,
        key: &str,
        value: &str,
        expected: Revision,
    ) -> Result<TxnResponse, StoreError> {
        let op = TxnOp::Put {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.conditional(key, expected, op).await
    }

    /// Delete `key` only if its modification revision is `expected`.
    pub async fn compare_revision_and_delete(
        &mut self,
        key: &str,
        expected: Revision,
    ) -> Result<TxnResponse, StoreError> {
        let op = TxnOp::Delete {
            key: key.to_string(),
        };
        self.conditional(key, expected, op).await
    }

    async fn conditional(
        &mut self,
        key: &str,
        expected: Revision,
        op: TxnOp,
    ) -> Result<TxnResponse, StoreError> {
        let client = Arc::clone(&self.client);
        let condition = Comparison {
            key: key.to_string(),
            expected_revision: expected,
        };
        let request = Request::Txn {
            conditions: vec![condition.clone()],
            ops: vec![op.clone()],
        };
        let key = key.to_string();
        self.record(request, async move {
            let resp = client.txn(vec![condition], vec![op]).await?;
            if resp.succeeded {
                Ok(resp)
            } else {
                Err(StoreError::PreconditionFailed { key, expected })
            }
        })
        .await
    }

    pub async fn lease_grant(&mut self, ttl_secs: i64) -> Result<LeaseGrantResponse, StoreError> {
        let client = Arc::clone(&self.client);
        self.record(Request::LeaseGrant { ttl_secs }, async move {
            client.lease_grant(ttl_secs).await
        })
        .await
    }

    pub async fn lease_revoke(&mut self, lease: LeaseId) -> Result<LeaseRevokeResponse, StoreError> {
        let client = Arc::clone(&self.client);
        self.record(Request::LeaseRevoke { lease }, async move {
            client.lease_revoke(lease).await
        })
        .await
    }

    pub async fn lease_time_to_live(
        &mut self,
        lease: LeaseId,
    ) -> Result<LeaseTimeToLiveResponse, StoreError> {
        let client = Arc::clone(&self.client);
        self.record(Request::LeaseTimeToLive { lease }, async move {
            client.lease_time_to_live(lease).await
        })
        .await
    }

    pub async fn defragment(&mut self) -> Result<(), StoreError> {
        let client = Arc::clone(&self.client);
        self.record(Request::Defragment, async move { client.defragment().await })
            .await
    }

    /// Issue `call`, timing it and appending the outcome to the history.
    async fn record<T, F>(&mut self, request: Request, call: F) -> Result<T, StoreError>
    where
        T: Clone + Into<Response>,
        F: Future<Output = Result<T, StoreError>>,
    {
        let id = self.ids.next_request_id();
        let invoked = Timestamp::since(self.base_time);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(StoreError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, call) => {
                outcome.unwrap_or_else(|_| {
                    Err(StoreError::Timeout {
                        after_ms: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                })
            }
        };

        let returned = Timestamp::since(self.base_time);
        self.history.append(OperationRecord {
            client: self.id,
            id,
            request,
            invoked,
            returned,
            outcome: result.clone().map(Into::into),
        });
        result
    }
}
