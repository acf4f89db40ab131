//! End-to-end traffic runs against the in-process store.

use async_trait::async_trait;
use robustness_core::{Connector, KvClient, SharedKvClient};
use robustness_simulation::{FaultConfig, SimStore};
use robustness_traffic::{
    simulate_traffic, KvTraffic, TrafficConfig, TrafficError, TrafficKind, TrafficReport,
    MARKER_KEY, MARKER_VALUE,
};
use robustness_types::{
    Comparison, DeleteResponse, GetResponse, LeaseGrantResponse, LeaseId, LeaseRevokeResponse,
    LeaseTimeToLiveResponse, OperationKind, PutResponse, RangeResponse, Request, StoreError,
    TxnOp, TxnResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn assert_marker_last(report: &TrafficReport) {
    let last = report.history().last().expect("history is empty");
    assert_eq!(
        last.request,
        Request::Put {
            key: MARKER_KEY.into(),
            value: MARKER_VALUE.into(),
            lease: None,
        }
    );
    for record in &report.history().operations()[..report.history().len() - 1] {
        assert!(record.returned <= last.invoked);
    }
}

/// Kv traffic with the low-traffic weights over `key_count` keys.
fn kv_config(client_count: usize, key_count: usize) -> TrafficConfig {
    let TrafficKind::Kv(preset) = TrafficConfig::low_traffic().traffic else {
        unreachable!("low traffic is kv traffic");
    };
    let traffic = KvTraffic::new(key_count, preset.write_choices).with_large_put_size(1024);
    TrafficConfig::new("e2e", client_count, TrafficKind::Kv(traffic))
        .with_settle_interval(Duration::from_millis(100))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kv_traffic_end_to_end() {
    let store = SimStore::new();
    let config = kv_config(4, 5)
        .with_qps(10.0, 200.0)
        .with_duration(Duration::from_secs(3));

    let report = match simulate_traffic(config, Arc::new(store.clone()), CancellationToken::new())
        .await
    {
        Ok(report) => {
            assert!(report.qps() >= 10.0);
            report
        }
        Err(TrafficError::InsufficientQps {
            observed, report, ..
        }) => {
            assert!(observed < 10.0);
            *report
        }
        Err(err) => panic!("unexpected error: {err}"),
    };

    assert_marker_last(&report);
    report.history().validate().unwrap();
    assert!(report.kind_stats(OperationKind::Get).total() > 0);
    assert!(report.kind_stats(OperationKind::Txn).total() > 0);
    assert!(store.lease_grants() > 0);

    for record in report.history().operations() {
        if let Request::Get { key } = &record.request {
            let index: usize = key.parse().unwrap();
            assert!(index < 5);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resource_traffic_end_to_end() {
    let store = SimStore::new();
    let config = TrafficConfig::kubernetes_traffic()
        .with_client_count(3)
        .with_qps(1.0, 300.0)
        .with_duration(Duration::from_secs(1))
        .with_settle_interval(Duration::from_millis(50));

    let report = simulate_traffic(config, Arc::new(store.clone()), CancellationToken::new())
        .await
        .unwrap();

    assert_marker_last(&report);
    assert!(report.kind_stats(OperationKind::Range).total() > 0);
    let writes = report.kind_stats(OperationKind::Txn);
    assert!(writes.succeeded > 0);
    for record in report.history().operations() {
        if let Request::Txn { ops, .. } = &record.request {
            assert!(ops[0].key().starts_with("/registry/pods/default/"));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_injected_failures_are_recorded() {
    let store = SimStore::with_faults(FaultConfig::default().with_failure_rate(0.3), 11);
    let config = kv_config(2, 3)
        .with_qps(0.0, 300.0)
        .with_duration(Duration::from_millis(500));

    let result = simulate_traffic(config, Arc::new(store.clone()), CancellationToken::new()).await;
    // The marker write is subject to injected failures too.
    let report = match result {
        Ok(report) => report,
        Err(err) => err.into_report().expect("completion failures carry a report"),
    };

    report.history().validate().unwrap();
    assert!(report.failed() > 0);
    assert_eq!(report.history().len() as u64, store.requests());
    let unavailable = report
        .history()
        .operations()
        .iter()
        .filter(|r| matches!(r.outcome, Err(StoreError::Unavailable(_))))
        .count() as u64;
    assert_eq!(unavailable, store.injected_failures());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_store_fails_qps_check() {
    let store = SimStore::with_faults(
        FaultConfig::default().with_latency(Duration::from_millis(50)),
        0,
    );
    let config = kv_config(1, 3)
        .with_qps(500.0, 1000.0)
        .with_request_timeout(Duration::from_millis(500))
        .with_duration(Duration::from_millis(500));

    let err = simulate_traffic(config, Arc::new(store), CancellationToken::new())
        .await
        .unwrap_err();

    let TrafficError::InsufficientQps {
        observed,
        required,
        report,
    } = err
    else {
        panic!("expected a qps shortfall, got {err}");
    };
    assert_eq!(required, 500.0);
    assert!(observed < 500.0);
    assert_marker_last(&report);
}

#[test]
fn test_always_failing_store_finishes_on_time() {
    // More clients than worker threads, and no latency to yield on.
    let store = SimStore::with_faults(FaultConfig::default().with_failure_rate(1.0), 5);
    let config = kv_config(4, 3)
        .with_qps(0.0, 200.0)
        .with_duration(Duration::from_millis(200))
        .with_settle_interval(Duration::from_millis(10));

    let (tx, rx) = std::sync::mpsc::channel();
    let driven = store.clone();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let result = runtime.block_on(simulate_traffic(
            config,
            Arc::new(driven),
            CancellationToken::new(),
        ));
        let _ = tx.send(result);
    });

    let err = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("traffic run did not finish")
        .unwrap_err();
    let TrafficError::MarkerWrite { source, report } = err else {
        panic!("expected the marker write to fail, got {err}");
    };
    assert!(matches!(source, StoreError::Unavailable(_)));
    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.history().len() as u64, store.requests());
    // Failed calls are paced by the governor like successful ones.
    assert!(report.history().len() < 1000);
}

/// Store that refuses the marker write.
struct RejectMarker(SimStore);

#[async_trait]
impl KvClient for RejectMarker {
    async fn get(&self, key: &str) -> Result<GetResponse, StoreError> {
        self.0.get(key).await
    }

    async fn range(&self, prefix: &str) -> Result<RangeResponse, StoreError> {
        self.0.range(prefix).await
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<PutResponse, StoreError> {
        if key == MARKER_KEY {
            return Err(StoreError::Unavailable("marker rejected".into()));
        }
        self.0.put(key, value, lease).await
    }

    async fn delete(&self, key: &str) -> Result<DeleteResponse, StoreError> {
        self.0.delete(key).await
    }

    async fn txn(
        &self,
        conditions: Vec<Comparison>,
        ops: Vec<TxnOp>,
    ) -> Result<TxnResponse, StoreError> {
        self.0.txn(conditions, ops).await
    }

    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseGrantResponse, StoreError> {
        self.0.lease_grant(ttl_secs).await
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<LeaseRevokeResponse, StoreError> {
        self.0.lease_revoke(lease).await
    }

    async fn lease_time_to_live(
        &self,
        lease: LeaseId,
    ) -> Result<LeaseTimeToLiveResponse, StoreError> {
        self.0.lease_time_to_live(lease).await
    }

    async fn defragment(&self) -> Result<(), StoreError> {
        self.0.defragment().await
    }
}

#[async_trait]
impl Connector for RejectMarker {
    async fn connect(&self, _index: usize) -> Result<SharedKvClient, StoreError> {
        Ok(Arc::new(RejectMarker(self.0.clone())))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_marker_failure_keeps_history() {
    let config = kv_config(2, 3)
        .with_qps(0.0, 200.0)
        .with_duration(Duration::from_millis(300));

    let err = simulate_traffic(
        config,
        Arc::new(RejectMarker(SimStore::new())),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    let TrafficError::MarkerWrite { source, report } = err else {
        panic!("expected a marker failure, got {err}");
    };
    assert_eq!(source, StoreError::Unavailable("marker rejected".into()));
    let last = report.history().last().unwrap();
    assert!(!last.is_success());
    assert!(report.history().len() > 1);
}

/// Connector for an unreachable cluster.
struct Unreachable;

#[async_trait]
impl Connector for Unreachable {
    async fn connect(&self, index: usize) -> Result<SharedKvClient, StoreError> {
        Err(StoreError::Unavailable(format!("endpoint {index} unreachable")))
    }
}

#[tokio::test]
async fn test_connect_failure_is_fatal() {
    let err = simulate_traffic(kv_config(2, 3), Arc::new(Unreachable), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TrafficError::Connect(_)));
    assert!(err.report().is_none());
}
