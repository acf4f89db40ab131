//! Traffic orchestration.
//!
//! A run connects one recording client per configured client, drives them
//! concurrently with a shared traffic pattern and governor, merges their
//! histories, then issues a final marker write once traffic has settled.

use crate::client::RecordingClient;
use crate::config::TrafficConfig;
use crate::error::TrafficError;
use crate::governor::Governor;
use crate::identity::IdProvider;
use crate::lease::LeaseIdStore;
use crate::report::TrafficReport;
use crate::workloads::TrafficContext;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use robustness_core::Connector;
use robustness_types::History;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Key of the final marker write.
pub const MARKER_KEY: &str = "tombstone";

/// Value of the final marker write.
pub const MARKER_VALUE: &str = "true";

/// Runs traffic against the store clients produced by a [`Connector`].
pub struct TrafficRunner {
    config: TrafficConfig,
    connector: Arc<dyn Connector>,
}

impl TrafficRunner {
    /// Create a runner, validating `config`.
    pub fn new(config: TrafficConfig, connector: Arc<dyn Connector>) -> Result<Self, TrafficError> {
        config.validate()?;
        Ok(Self { config, connector })
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Run one traffic phase followed by the marker write.
    ///
    /// Traffic stops when the configured duration elapses or `cancel` fires.
    /// Cancelling also aborts in-flight store calls. Every component with
    /// run-scoped state is created here, so a runner can be run repeatedly.
    pub async fn run(&self, cancel: CancellationToken) -> Result<TrafficReport, TrafficError> {
        let config = &self.config;
        let governor = Arc::new(Governor::new(config.maximal_qps, config.burst)?);
        let ids = Arc::new(IdProvider::new());
        let leases = Arc::new(LeaseIdStore::new());
        let finish = CancellationToken::new();
        let ctx = TrafficContext::new(
            governor,
            Arc::clone(&ids),
            leases,
            cancel.clone(),
            finish.clone(),
        );
        let request_timeout = *config.request_timeout;
        let start = Instant::now();

        let mut marker = RecordingClient::new(
            ids.next_client_id(),
            self.connector.connect(0).await.map_err(TrafficError::Connect)?,
            Arc::clone(&ids),
            start,
            request_timeout,
            cancel.clone(),
        );

        let mut clients = Vec::with_capacity(config.client_count);
        for index in 0..config.client_count {
            let store = self
                .connector
                .connect(index)
                .await
                .map_err(TrafficError::Connect)?;
            clients.push(RecordingClient::new(
                ids.next_client_id(),
                store,
                Arc::clone(&ids),
                start,
                request_timeout,
                cancel.clone(),
            ));
        }

        info!(
            name = %config.name,
            clients = config.client_count,
            max_qps = config.maximal_qps,
            duration = %config.duration,
            "Starting traffic"
        );

        let history = Arc::new(Mutex::new(History::new()));
        let driver = config.traffic.driver();
        let mut tasks = JoinSet::new();
        for (index, mut client) in clients.into_iter().enumerate() {
            let ctx = ctx.clone();
            let driver = Arc::clone(&driver);
            let history = Arc::clone(&history);
            let seed = config.seed.wrapping_add(index as u64);
            tasks.spawn(async move {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                driver.run(&ctx, &mut client, &mut rng).await;

                let id = client.id();
                let recorded = client.into_history();
                debug!(client = %id, count = recorded.len(), "Client finished");
                let mut merged = history.lock();
                *merged = merged.merge(&recorded);
            });
        }

        let deadline = tokio::time::sleep(*config.duration);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline, if !finish.is_cancelled() => finish.cancel(),
                joined = tasks.join_next() => match joined {
                    Some(result) => result?,
                    None => break,
                },
            }
        }
        let elapsed = start.elapsed();

        tokio::select! {
            _ = tokio::time::sleep(*config.settle_interval) => {}
            _ = cancel.cancelled() => {}
        }
        let marker_result = marker.put(MARKER_KEY, MARKER_VALUE).await;

        let history = history.lock().merge(&marker.into_history());
        history.validate()?;
        let report = TrafficReport::new(history, elapsed);

        if let Err(source) = marker_result {
            warn!(error = %source, "Final marker write failed");
            return Err(TrafficError::MarkerWrite {
                source,
                report: Box::new(report),
            });
        }

        info!(
            count = report.history().len(),
            qps = report.qps(),
            "Average traffic"
        );
        if report.qps() < config.minimal_qps {
            warn!(
                qps = report.qps(),
                required = config.minimal_qps,
                "Traffic below minimal QPS"
            );
            return Err(TrafficError::InsufficientQps {
                observed: report.qps(),
                required: config.minimal_qps,
                report: Box::new(report),
            });
        }

        Ok(report)
    }
}

/// Run `config` once against clients from `connector`.
pub async fn simulate_traffic(
    config: TrafficConfig,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
) -> Result<TrafficReport, TrafficError> {
    TrafficRunner::new(config, connector)?.run(cancel).await
}
