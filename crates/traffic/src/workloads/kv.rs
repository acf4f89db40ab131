//! Generic key-value workload.
//!
//! Each iteration reads a uniformly chosen key from a small key space and
//! follows up with one weighted-random write, so roughly half of the traffic
//! is reads. A small key space keeps contention high, which is what makes the
//! recorded history interesting for a linearizability checker.

use super::{random_string, Traffic, TrafficContext};
use crate::choice::WeightedChoices;
use crate::client::RecordingClient;
use crate::identity::IdProvider;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use robustness_types::{KeyValue, Revision, StoreError, TxnOp};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Write operations the generic workload can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KvRequestType {
    Put,
    LargePut,
    Delete,
    MultiOpTxn,
    PutWithLease,
    LeaseRevoke,
    CompareAndSet,
    Defragment,
}

/// Sub-operation of a multi-operation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnOpType {
    Range,
    Put,
    Delete,
}

impl TxnOpType {
    /// 10% delete, 40% range, 50% put.
    fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match rng.gen_range(0..100) {
            0..=9 => TxnOpType::Delete,
            10..=49 => TxnOpType::Range,
            _ => TxnOpType::Put,
        }
    }
}

/// Read-modify-write traffic over keys `"0"..key_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvTraffic {
    /// Size of the key space.
    pub key_count: usize,

    /// Weighted write operations.
    pub write_choices: WeightedChoices<KvRequestType>,

    /// TTL of granted leases.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: i64,

    /// Payload size of large puts.
    #[serde(default = "default_large_put_size")]
    pub large_put_size: usize,

    /// Number of operations per multi-operation transaction.
    #[serde(default = "default_multi_op_txn_ops")]
    pub multi_op_txn_ops: usize,
}

fn default_lease_ttl_secs() -> i64 {
    KvTraffic::DEFAULT_LEASE_TTL_SECS
}

fn default_large_put_size() -> usize {
    KvTraffic::DEFAULT_LARGE_PUT_SIZE
}

fn default_multi_op_txn_ops() -> usize {
    KvTraffic::DEFAULT_MULTI_OP_TXN_OPS
}

impl KvTraffic {
    pub const DEFAULT_LEASE_TTL_SECS: i64 = 7200;
    pub const DEFAULT_MULTI_OP_TXN_OPS: usize = 4;
    /// Just above 32KiB.
    pub const DEFAULT_LARGE_PUT_SIZE: usize = 32769;

    /// Create a workload over `key_count` keys.
    pub fn new(key_count: usize, write_choices: WeightedChoices<KvRequestType>) -> Self {
        Self {
            key_count,
            write_choices,
            lease_ttl_secs: Self::DEFAULT_LEASE_TTL_SECS,
            large_put_size: Self::DEFAULT_LARGE_PUT_SIZE,
            multi_op_txn_ops: Self::DEFAULT_MULTI_OP_TXN_OPS,
        }
    }

    /// Set the TTL of granted leases.
    pub fn with_lease_ttl_secs(mut self, ttl: i64) -> Self {
        self.lease_ttl_secs = ttl;
        self
    }

    /// Set the payload size of large puts.
    pub fn with_large_put_size(mut self, size: usize) -> Self {
        self.large_put_size = size;
        self
    }

    /// Set the number of operations per multi-operation transaction.
    pub fn with_multi_op_txn_ops(mut self, ops: usize) -> Self {
        self.multi_op_txn_ops = ops;
        self
    }

    /// Returns true if `request` can be picked as a write.
    pub fn issues(&self, request: KvRequestType) -> bool {
        self.write_choices
            .iter()
            .any(|entry| entry.choice == request && entry.weight > 0)
    }

    async fn write(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
        key: &str,
        last: Option<&KeyValue>,
    ) -> Result<(), StoreError> {
        match *self.write_choices.pick(rng) {
            KvRequestType::Put => client.put(key, &ctx.unique_value()).await.map(drop),
            KvRequestType::LargePut => {
                let value = random_string(self.large_put_size, rng);
                client.put(key, &value).await.map(drop)
            }
            KvRequestType::Delete => client.delete(key).await.map(drop),
            KvRequestType::MultiOpTxn => {
                let ops = self.pick_multi_txn_ops(&ctx.ids, rng);
                client.txn(Vec::new(), ops).await.map(drop)
            }
            KvRequestType::CompareAndSet => {
                let expected = last.map_or(Revision::ZERO, |kv| kv.mod_revision);
                client
                    .compare_revision_and_put(key, &ctx.unique_value(), expected)
                    .await
                    .map(drop)
            }
            KvRequestType::PutWithLease => self.put_with_lease(ctx, client, key).await,
            KvRequestType::LeaseRevoke => revoke_lease(ctx, client).await,
            KvRequestType::Defragment => client.defragment().await,
        }
    }

    async fn put_with_lease(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        key: &str,
    ) -> Result<(), StoreError> {
        let lease = match ctx.leases.get(client.id()) {
            Some(lease) => lease,
            None => {
                let lease = client.lease_grant(self.lease_ttl_secs).await?.lease;
                ctx.leases.set(client.id(), lease);
                ctx.throttle().await;
                lease
            }
        };
        client
            .put_with_lease(key, &ctx.unique_value(), lease)
            .await
            .map(drop)
    }

    /// Build a transaction over distinct random keys containing at least one
    /// put, so every transaction writes a value nobody else wrote.
    fn pick_multi_txn_ops<R: Rng + ?Sized>(&self, ids: &IdProvider, rng: &mut R) -> Vec<TxnOp> {
        let mut keys: Vec<usize> = (0..self.key_count).collect();
        keys.shuffle(rng);

        let count = self.multi_op_txn_ops.min(self.key_count);
        let mut types: Vec<TxnOpType> = (0..count).map(|_| TxnOpType::pick(rng)).collect();
        if !types.contains(&TxnOpType::Put) {
            if let Some(first) = types.first_mut() {
                *first = TxnOpType::Put;
            }
        }

        types
            .into_iter()
            .zip(keys)
            .map(|(op, key)| {
                let key = key.to_string();
                match op {
                    TxnOpType::Range => TxnOp::Range { key },
                    TxnOpType::Put => TxnOp::Put {
                        key,
                        value: ids.next_request_id().0.to_string(),
                    },
                    TxnOpType::Delete => TxnOp::Delete { key },
                }
            })
            .collect()
    }
}

/// Revoke the client's lease, if it holds one.
///
/// The mapping is only cleared on success: after a failed revoke the lease
/// may still be alive.
async fn revoke_lease(ctx: &TrafficContext, client: &mut RecordingClient) -> Result<(), StoreError> {
    if let Some(lease) = ctx.leases.get(client.id()) {
        client.lease_revoke(lease).await?;
        ctx.leases.clear(client.id());
    }
    Ok(())
}

#[async_trait]
impl Traffic for KvTraffic {
    async fn run(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
    ) {
        while !ctx.should_stop() {
            let key = rng.gen_range(0..self.key_count).to_string();
            let last = match client.get(&key).await {
                Ok(resp) => resp.kv,
                Err(error) => {
                    trace!(client = %client.id(), %key, %error, "Read failed");
                    ctx.throttle().await;
                    continue;
                }
            };
            ctx.throttle().await;

            if let Err(error) = self.write(ctx, client, rng, &key, last.as_ref()).await {
                trace!(client = %client.id(), %key, %error, "Write failed");
            }
            ctx.throttle().await;
        }
    }
}
