//! Robustness Simulator CLI
//!
//! Runs a traffic scenario against the in-process store and writes the
//! recorded history as JSON.

use clap::{Parser, Subcommand};
use robustness_simulator::{write_history, Preset, Simulator};
use robustness_traffic::TrafficConfig;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "robustness-sim")]
#[command(about = "Traffic generator and history recorder for key-value store robustness tests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a traffic scenario against the simulated store
    Run {
        /// Bundled scenario to start from
        #[arg(long, value_enum, default_value = "low")]
        preset: Preset,

        /// TOML scenario file, replaces the preset
        #[arg(long)]
        config: Option<PathBuf>,

        /// Duration of the traffic phase (e.g., "10s", "1m")
        #[arg(short, long)]
        duration: Option<humantime::Duration>,

        /// Number of concurrent clients
        #[arg(long)]
        clients: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Probability (0.0 to 1.0) that a store call fails
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Latency added to every store call (e.g., "2ms")
        #[arg(long)]
        latency: Option<humantime::Duration>,

        /// Where to write the recorded history
        #[arg(short, long, default_value = "history.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            preset,
            config,
            duration,
            clients,
            seed,
            failure_rate,
            latency,
            output,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();

            let mut traffic = match config {
                Some(path) => TrafficConfig::load(path)?,
                None => preset.config(),
            };
            if let Some(duration) = duration {
                traffic = traffic.with_duration(*duration);
            }
            if let Some(clients) = clients {
                traffic = traffic.with_client_count(clients);
            }
            if let Some(seed) = seed {
                traffic = traffic.with_seed(seed);
            }
            traffic.validate()?;

            let mut simulator = Simulator::new(traffic).with_failure_rate(failure_rate);
            if let Some(latency) = latency {
                simulator = simulator.with_latency(*latency);
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping traffic");
                    on_signal.cancel();
                }
            });

            println!(
                "Running {} for {}...",
                simulator.config().name,
                simulator.config().duration
            );
            match simulator.run(cancel).await {
                Ok(report) => {
                    report.print();
                    write_history(report.history(), &output)?;
                    println!("History written to {}", output.display());
                }
                Err(err) => {
                    // Completion failures still produce a history worth keeping.
                    if let Some(report) = err.report() {
                        report.print();
                        write_history(report.history(), &output)?;
                        println!("History written to {}", output.display());
                    }
                    return Err(err.into());
                }
            }
        }
    }

    Ok(())
}
