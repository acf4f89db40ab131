//! Traffic drivers.
//!
//! A driver decides, iteration by iteration, which operation a simulated
//! client issues next. Drivers are selected by configuration and share one
//! entry point, [`Traffic::run`].

mod kv;
mod resource;

pub use kv::{KvRequestType, KvTraffic};
pub use resource::{ResourceRequestType, ResourceTraffic};

use crate::client::RecordingClient;
use crate::governor::Governor;
use crate::identity::IdProvider;
use crate::lease::LeaseIdStore;
use async_trait::async_trait;
use rand::{Rng, RngCore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run-scoped state shared by every simulated client.
#[derive(Debug, Clone)]
pub struct TrafficContext {
    pub governor: Arc<Governor>,
    pub ids: Arc<IdProvider>,
    pub leases: Arc<LeaseIdStore>,
    /// Cancels in-flight calls and governor waits.
    pub cancel: CancellationToken,
    /// Stops drivers at their next iteration without touching in-flight calls.
    pub finish: CancellationToken,
}

impl TrafficContext {
    pub fn new(
        governor: Arc<Governor>,
        ids: Arc<IdProvider>,
        leases: Arc<LeaseIdStore>,
        cancel: CancellationToken,
        finish: CancellationToken,
    ) -> Self {
        Self {
            governor,
            ids,
            leases,
            cancel,
            finish,
        }
    }

    /// Non-blocking check of both stop signals.
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.finish.is_cancelled()
    }

    /// Pay one governor token.
    pub async fn throttle(&self) {
        self.governor.wait(&self.cancel).await;
    }

    /// Fresh value that is unique within the run.
    pub fn unique_value(&self) -> String {
        self.ids.next_request_id().0.to_string()
    }
}

/// Traffic pattern driving one simulated client.
#[async_trait]
pub trait Traffic: Send + Sync {
    /// Issue operations through `client` until `ctx` signals a stop.
    async fn run(
        &self,
        ctx: &TrafficContext,
        client: &mut RecordingClient,
        rng: &mut (dyn RngCore + Send),
    );
}

/// Random lowercase ASCII string.
pub(crate) fn random_string<R: Rng + ?Sized>(len: usize, rng: &mut R) -> String {
    (0..len)
        .map(|_| char::from(b'a' + rng.gen_range(0..26u8)))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use robustness_core::SharedKvClient;
    use robustness_types::ClientId;
    use std::time::{Duration, Instant};

    pub(crate) fn context() -> TrafficContext {
        TrafficContext::new(
            Arc::new(Governor::new(100_000.0, 1_000).unwrap()),
            Arc::new(IdProvider::new()),
            Arc::new(LeaseIdStore::new()),
            CancellationToken::new(),
            CancellationToken::new(),
        )
    }

    pub(crate) fn client(ctx: &TrafficContext, store: SharedKvClient) -> RecordingClient {
        RecordingClient::new(
            ClientId(0),
            store,
            Arc::clone(&ctx.ids),
            Instant::now(),
            Duration::from_secs(1),
            ctx.cancel.clone(),
        )
    }
}
