//! In-process store implementing [`KvClient`].

use crate::state::StoreState;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use robustness_core::{Connector, KvClient, SharedKvClient};
use robustness_types::{
    Comparison, DeleteResponse, GetResponse, KeyValue, LeaseGrantResponse, LeaseId,
    LeaseRevokeResponse, LeaseTimeToLiveResponse, PutResponse, RangeResponse, Revision,
    StoreError, TxnOp, TxnResponse,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Faults injected into every call before it reaches the state.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability (0.0 to 1.0) that a call is refused as unavailable.
    pub failure_rate: f64,

    /// Delay added to every call.
    pub latency: Duration,
}

impl FaultConfig {
    /// Refuse calls with the given probability.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Call counters, for assertions in tests.
#[derive(Debug, Default)]
struct StoreStats {
    requests: AtomicU64,
    injected_failures: AtomicU64,
    lease_grants: AtomicU64,
    lease_revokes: AtomicU64,
}

struct Inner {
    state: Mutex<StoreState>,
    faults: FaultConfig,
    rng: Mutex<ChaCha8Rng>,
    stats: StoreStats,
}

/// Simulated key-value store.
///
/// Cloning is cheap and every clone shares the same state, so one store can
/// serve any number of simulated clients.
#[derive(Clone)]
pub struct SimStore {
    inner: Arc<Inner>,
}

impl Default for SimStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimStore {
    /// Create a store that never fails.
    pub fn new() -> Self {
        Self::with_faults(FaultConfig::default(), 0)
    }

    /// Create a store injecting `faults`, seeded for reproducible failures.
    pub fn with_faults(faults: FaultConfig, seed: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                faults,
                rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
                stats: StoreStats::default(),
            }),
        }
    }

    /// Current store revision.
    pub fn revision(&self) -> Revision {
        self.inner.state.lock().revision()
    }

    /// Read a key directly, bypassing fault injection.
    pub fn peek(&self, key: &str) -> Option<KeyValue> {
        self.inner.state.lock().get(key).kv
    }

    /// Number of leases currently alive.
    pub fn lease_count(&self) -> usize {
        self.inner.state.lock().lease_count()
    }

    /// Number of successful lease grants.
    pub fn lease_grants(&self) -> u64 {
        self.inner.stats.lease_grants.load(Ordering::Relaxed)
    }

    /// Number of successful lease revokes.
    pub fn lease_revokes(&self) -> u64 {
        self.inner.stats.lease_revokes.load(Ordering::Relaxed)
    }

    /// Number of calls received, including refused ones.
    pub fn requests(&self) -> u64 {
        self.inner.stats.requests.load(Ordering::Relaxed)
    }

    /// Number of calls refused by fault injection.
    pub fn injected_failures(&self) -> u64 {
        self.inner.stats.injected_failures.load(Ordering::Relaxed)
    }

    async fn admit(&self) -> Result<(), StoreError> {
        self.inner.stats.requests.fetch_add(1, Ordering::Relaxed);

        let faults = &self.inner.faults;
        if faults.latency.is_zero() {
            // Every call is a scheduling point, even with no latency configured.
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(faults.latency).await;
        }
        if faults.failure_rate > 0.0 {
            let roll: f64 = self.inner.rng.lock().gen();
            if roll < faults.failure_rate {
                self.inner
                    .stats
                    .injected_failures
                    .fetch_add(1, Ordering::Relaxed);
                trace!("Injecting store failure");
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KvClient for SimStore {
    async fn get(&self, key: &str) -> Result<GetResponse, StoreError> {
        self.admit().await?;
        Ok(self.inner.state.lock().get(key))
    }

    async fn range(&self, prefix: &str) -> Result<RangeResponse, StoreError> {
        self.admit().await?;
        Ok(self.inner.state.lock().range(prefix))
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<PutResponse, StoreError> {
        self.admit().await?;
        self.inner.state.lock().put(key, value, lease)
    }

    async fn delete(&self, key: &str) -> Result<DeleteResponse, StoreError> {
        self.admit().await?;
        Ok(self.inner.state.lock().delete(key))
    }

    async fn txn(
        &self,
        conditions: Vec<Comparison>,
        ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError> {
        self.admit().await?;
        Ok(self.inner.state.lock().txn(&conditions, &ops))
    }

    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseGrantResponse, StoreError> {
        self.admit().await?;
        let resp = self.inner.state.lock().lease_grant(ttl_secs);
        self.inner.stats.lease_grants.fetch_add(1, Ordering::Relaxed);
        Ok(resp)
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<LeaseRevokeResponse, StoreError> {
        self.admit().await?;
        let resp = self.inner.state.lock().lease_revoke(lease)?;
        self.inner.stats.lease_revokes.fetch_add(1, Ordering::Relaxed);
        Ok(resp)
    }

    async fn lease_time_to_live(
        &self,
        lease: LeaseId,
    ) -> Result<LeaseTimeToLiveResponse, StoreError> {
        self.admit().await?;
        self.inner.state.lock().lease_time_to_live(lease)
    }

    async fn defragment(&self) -> Result<(), StoreError> {
        self.admit().await
    }
}

#[async_trait]
impl Connector for SimStore {
    async fn connect(&self, _index: usize) -> Result<SharedKvClient, StoreError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = SimStore::new();
        let client = store.connect(0).await.unwrap();

        let put = client.put("k", "v", None).await.unwrap();
        assert_eq!(store.peek("k").unwrap().mod_revision, put.revision);
        assert_eq!(store.revision(), put.revision);
        assert_eq!(store.requests(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection_is_deterministic() {
        let faults = FaultConfig::default().with_failure_rate(0.5);
        let run = |store: SimStore| async move {
            let mut outcomes = Vec::new();
            for _ in 0..50 {
                outcomes.push(store.get("k").await.is_ok());
            }
            outcomes
        };

        let first = run(SimStore::with_faults(faults.clone(), 7)).await;
        let second = run(SimStore::with_faults(faults, 7)).await;

        assert_eq!(first, second);
        assert!(first.iter().any(|ok| *ok));
        assert!(first.iter().any(|ok| !*ok));
    }

    #[tokio::test]
    async fn test_refused_calls_let_other_tasks_run() {
        let store = SimStore::with_faults(FaultConfig::default().with_failure_rate(1.0), 3);
        let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let setter = ran.clone();
        tokio::spawn(async move { setter.store(true, Ordering::Relaxed) });

        for _ in 0..1000 {
            if ran.load(Ordering::Relaxed) {
                return;
            }
            assert!(store.get("k").await.is_err());
        }
        panic!("spawned task never ran while calls were refused");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_refused_write_is_not_applied() {
        let store = SimStore::with_faults(FaultConfig::default().with_failure_rate(1.0), 1);
        let before = store.revision();

        let result = store.put("k", "v", None).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.revision(), before);
        assert_eq!(store.injected_failures(), 1);
        assert!(logs_contain("Injecting store failure"));
    }

    #[tokio::test]
    async fn test_lease_counters() {
        let store = SimStore::new();
        let lease = store.lease_grant(60).await.unwrap().lease;
        store.put("k", "v", Some(lease)).await.unwrap();
        let ttl = store.lease_time_to_live(lease).await.unwrap();
        assert_eq!(ttl.granted_ttl_secs, 60);

        store.lease_revoke(lease).await.unwrap();
        assert!(store.lease_revoke(lease).await.is_err());

        assert_eq!(store.lease_grants(), 1);
        assert_eq!(store.lease_revokes(), 1);
        assert_eq!(store.lease_count(), 0);
        assert!(store.peek("k").is_none());
    }

    #[tokio::test]
    async fn test_latency_is_applied() {
        let store = SimStore::with_faults(
            FaultConfig::default().with_latency(Duration::from_millis(25)),
            0,
        );
        let start = std::time::Instant::now();
        store.defragment().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
