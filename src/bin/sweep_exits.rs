use anyhow::{Context, Result};
use clap::Parser;
use fractalbot::alerts::{notifier_from_config, Alert, Notifier};
use fractalbot::api::BybitClient;
use fractalbot::config::AppConfig;
use fractalbot::execution::ExitScheduler;
use fractalbot::logging::setup_logging;
use fractalbot::persistence::PositionStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Close every recorded position whose holding time has run out.
#[derive(Parser)]
#[command(name = "sweep_exits")]
struct Cli {
    /// Path to a TOML config file. Defaults to config/fractalbot.toml.
    #[arg(long)]
    config: Option<PathBuf>,
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

    match run(&config, notifier.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Exit sweep failed: {:#}", e);
            notifier
                .send(Alert::error("exit sweep failed", format!("{:#}", e)))
                .await;
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<()> {
    config.require_credentials()?;

    let exchange = Arc::new(BybitClient::new(&config.exchange).context("Failed to build exchange client")?);
    let scheduler = ExitScheduler::new(
        config,
        exchange,
        PositionStore::new(&config.storage.positions_path),
        notifier,
    );

    let report = scheduler.sweep().await;
    tracing::info!(
        "Exit sweep done: {} closed, {} pending, {} failed, {} deferred",
        report.closed.len(),
        report.pending.len(),
        report.failed.len(),
        report.deferred.len()
    );

    Ok(())
}
