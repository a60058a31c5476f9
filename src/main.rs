use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fractalbot::alerts::{notifier_from_config, Alert, Notifier};
use fractalbot::api::BybitClient;
use fractalbot::config::AppConfig;
use fractalbot::logging::setup_logging;
use fractalbot::persistence::{PositionStore, ReferenceBalanceStore};
use fractalbot::risk::{RiskMonitor, RiskOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "fractalbot",
    about = "Drawdown monitor: liquidates every position once equity falls too far below the reference balance"
)]
struct Cli {
    /// Path to a TOML config file. Defaults to config/fractalbot.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Without a subcommand, run one monitoring cycle.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Overwrite the reference balance.
    Reset {
        /// New reference balance in the settlement coin.
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Print the reference balance and time until the next automatic rebase.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let notifier = match notifier_from_config(&config.alerts) {
        Ok(notifier) => notifier,
        Err(e) => {
            tracing::error!("Failed to set up alerts: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &config, notifier.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Risk monitor failed: {:#}", e);
            notifier
                .send(Alert::error("risk monitor failed", format!("{:#}", e)))
                .await;
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Option<Command>, config: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<()> {
    let exchange = Arc::new(BybitClient::new(&config.exchange).context("Failed to build exchange client")?);
    let monitor = RiskMonitor::new(
        config,
        exchange,
        PositionStore::new(&config.storage.positions_path),
        ReferenceBalanceStore::new(&config.storage.balance_path),
        notifier,
    );

    match command {
        Some(Command::Reset { value }) => {
            monitor
                .reset(value, Utc::now())
                .context("Failed to reset reference balance")?;
            println!("Reference balance reset to {:.2}", value);
        }
        Some(Command::Status) => {
            let status = monitor
                .status(Utc::now())
                .context("Failed to read reference balance")?;
            println!("{}", status);
        }
        None => {
            config.require_credentials()?;
            tracing::info!("Risk check started");

            match monitor.run().await.context("Risk check aborted")? {
                RiskOutcome::Normal(reading) => {
                    tracing::info!("Within limits (loss ratio {:.1}%)", reading.loss_ratio * 100.0)
                }
                RiskOutcome::Tripped(report) => tracing::warn!(
                    "Emergency stop executed: {} closed, {} still open",
                    report.closed.len(),
                    report.still_open.len()
                ),
            }
        }
    }

    Ok(())
}
