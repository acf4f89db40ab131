//! Configuration types for traffic runs.

use crate::choice::WeightedChoices;
use crate::workloads::{KvRequestType, KvTraffic, ResourceRequestType, ResourceTraffic, Traffic};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Traffic pattern driven by every client of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TrafficKind {
    /// Read-modify-write over a small numbered key space.
    Kv(KvTraffic),
    /// Typed objects under a resource prefix.
    Resource(ResourceTraffic),
}

impl TrafficKind {
    /// Build the driver shared by all clients.
    pub fn driver(&self) -> Arc<dyn Traffic> {
        match self {
            TrafficKind::Kv(traffic) => Arc::new(traffic.clone()),
            TrafficKind::Resource(traffic) => Arc::new(traffic.clone()),
        }
    }
}

/// Configuration for a traffic run.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Name used in logs and reports.
    pub name: String,

    /// Number of concurrent clients.
    pub client_count: usize,

    /// Observed QPS below which the run is considered unreliable.
    pub minimal_qps: f64,

    /// Aggregate request rate enforced by the governor.
    pub maximal_qps: f64,

    /// Governor burst capacity.
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Length of the traffic phase.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub duration: humantime::Duration,

    /// Per-call timeout.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(default = "default_request_timeout")]
    pub request_timeout: humantime::Duration,

    /// Pause between the end of the traffic phase and the marker write.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(default = "default_settle_interval")]
    pub settle_interval: humantime::Duration,

    /// Seed of the per-client random sources; client `i` uses `seed + i`.
    #[serde(default)]
    pub seed: u64,

    /// Traffic pattern.
    pub traffic: TrafficKind,
}

fn default_burst() -> u32 {
    TrafficConfig::DEFAULT_BURST
}

fn default_request_timeout() -> humantime::Duration {
    TrafficConfig::DEFAULT_REQUEST_TIMEOUT.into()
}

fn default_settle_interval() -> humantime::Duration {
    TrafficConfig::DEFAULT_SETTLE_INTERVAL.into()
}

impl TrafficConfig {
    pub const DEFAULT_BURST: u32 = 200;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(40);
    pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

    /// Create a configuration with default timing.
    pub fn new(name: impl Into<String>, client_count: usize, traffic: TrafficKind) -> Self {
        Self {
            name: name.into(),
            client_count,
            minimal_qps: 0.0,
            maximal_qps: 100.0,
            burst: Self::DEFAULT_BURST,
            duration: Self::DEFAULT_DURATION.into(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT.into(),
            settle_interval: Self::DEFAULT_SETTLE_INTERVAL.into(),
            seed: 0,
            traffic,
        }
    }

    /// Generic key-value traffic at low rate.
    pub fn low_traffic() -> Self {
        Self::new("low-traffic", 8, TrafficKind::Kv(default_kv_traffic())).with_qps(100.0, 200.0)
    }

    /// Generic key-value traffic at high rate.
    pub fn high_traffic() -> Self {
        Self::new("high-traffic", 12, TrafficKind::Kv(default_kv_traffic()))
            .with_qps(200.0, 1000.0)
    }

    /// Pod churn in a single namespace.
    pub fn kubernetes_traffic() -> Self {
        let choices = WeightedChoices::new([
            (ResourceRequestType::Update, 75),
            (ResourceRequestType::Delete, 15),
            (ResourceRequestType::Create, 10),
        ])
        .unwrap_or_else(|_| unreachable!("preset weights are non-zero"));
        let traffic = ResourceTraffic::new(5, "pods", "default", choices);
        Self::new("kubernetes-traffic", 12, TrafficKind::Resource(traffic)).with_qps(200.0, 1000.0)
    }

    /// Set the number of concurrent clients.
    pub fn with_client_count(mut self, count: usize) -> Self {
        self.client_count = count;
        self
    }

    /// Set the required minimum and enforced maximum QPS.
    pub fn with_qps(mut self, minimal: f64, maximal: f64) -> Self {
        self.minimal_qps = minimal;
        self.maximal_qps = maximal;
        self
    }

    /// Set the governor burst capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Set the length of the traffic phase.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.into();
        self
    }

    /// Set the pause before the marker write.
    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval.into();
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the traffic pattern.
    pub fn with_traffic(mut self, traffic: TrafficKind) -> Self {
        self.traffic = traffic;
        self
    }

    /// Check the invariants the orchestrator relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_count == 0 {
            return Err(ConfigError::Invalid("client_count must be at least 1".into()));
        }
        if !self.maximal_qps.is_finite() || self.maximal_qps <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "maximal_qps must be positive, got {}",
                self.maximal_qps
            )));
        }
        if self.minimal_qps > self.maximal_qps {
            return Err(ConfigError::Invalid(format!(
                "minimal_qps {} exceeds maximal_qps {}",
                self.minimal_qps, self.maximal_qps
            )));
        }
        match &self.traffic {
            TrafficKind::Kv(kv) if kv.key_count == 0 => {
                Err(ConfigError::Invalid("key_count must be at least 1".into()))
            }
            TrafficKind::Kv(kv)
                if kv.multi_op_txn_ops == 0 && kv.issues(KvRequestType::MultiOpTxn) =>
            {
                Err(ConfigError::Invalid("multi_op_txn_ops must be at least 1".into()))
            }
            TrafficKind::Kv(kv)
                if kv.large_put_size == 0 && kv.issues(KvRequestType::LargePut) =>
            {
                Err(ConfigError::Invalid("large_put_size must be at least 1".into()))
            }
            TrafficKind::Resource(resource) if resource.resource.is_empty() => {
                Err(ConfigError::Invalid("resource must not be empty".into()))
            }
            _ => Ok(()),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self::low_traffic()
    }
}

fn default_kv_traffic() -> KvTraffic {
    let choices = WeightedChoices::new([
        (KvRequestType::Put, 45),
        (KvRequestType::LargePut, 5),
        (KvRequestType::Delete, 10),
        (KvRequestType::MultiOpTxn, 10),
        (KvRequestType::PutWithLease, 10),
        (KvRequestType::LeaseRevoke, 10),
        (KvRequestType::CompareAndSet, 10),
    ])
    .unwrap_or_else(|_| unreachable!("preset weights are non-zero"));
    KvTraffic::new(10, choices)
}
