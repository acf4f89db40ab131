//! Robustness Simulator
//!
//! Runs a traffic scenario against the in-process [`SimStore`] and exports
//! the recorded history for an external linearizability checker.
//!
//! # Example
//!
//! ```ignore
//! use robustness_simulator::{Preset, Simulator};
//! use std::time::Duration;
//!
//! let config = Preset::Low.config().with_duration(Duration::from_secs(5));
//! let simulator = Simulator::new(config).with_failure_rate(0.05);
//! let report = simulator.run(CancellationToken::new()).await?;
//! robustness_simulator::write_history(report.history(), "history.json")?;
//! ```

use robustness_simulation::{FaultConfig, SimStore};
use robustness_traffic::{simulate_traffic, TrafficConfig, TrafficError, TrafficReport};
use robustness_types::History;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors writing simulator output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Bundled traffic scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// Generic key-value traffic, 100 to 200 QPS.
    Low,
    /// Generic key-value traffic, 200 to 1000 QPS.
    High,
    /// Pod churn in a single namespace.
    Kubernetes,
}

impl Preset {
    pub fn config(self) -> TrafficConfig {
        match self {
            Preset::Low => TrafficConfig::low_traffic(),
            Preset::High => TrafficConfig::high_traffic(),
            Preset::Kubernetes => TrafficConfig::kubernetes_traffic(),
        }
    }
}

/// A traffic scenario bound to a fresh simulated store.
pub struct Simulator {
    config: TrafficConfig,
    faults: FaultConfig,
    store_seed: u64,
}

impl Simulator {
    pub fn new(config: TrafficConfig) -> Self {
        let store_seed = config.seed;
        Self {
            config,
            faults: FaultConfig::default(),
            store_seed,
        }
    }

    /// Refuse store calls with the given probability.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.faults = self.faults.with_failure_rate(rate);
        self
    }

    /// Delay every store call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.faults = self.faults.with_latency(latency);
        self
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    /// Run the scenario once against a new store.
    pub async fn run(&self, cancel: CancellationToken) -> Result<TrafficReport, TrafficError> {
        let store = SimStore::with_faults(self.faults.clone(), self.store_seed);
        let result = simulate_traffic(self.config.clone(), Arc::new(store.clone()), cancel).await;
        info!(
            revision = %store.revision(),
            requests = store.requests(),
            injected_failures = store.injected_failures(),
            "Store finished"
        );
        result
    }
}

/// Write `history` as JSON, one array of operation records.
pub fn write_history(history: &History, path: impl AsRef<Path>) -> Result<(), OutputError> {
    let path = path.as_ref();
    let io_error = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
    serde_json::to_writer_pretty(&mut writer, history.operations())?;
    writer.flush().map_err(io_error)?;
    Ok(())
}
