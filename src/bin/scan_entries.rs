use anyhow::{Context, Result};
use clap::Parser;
use fractalbot::alerts::{notifier_from_config, Alert, Notifier};
use fractalbot::api::BybitClient;
use fractalbot::config::AppConfig;
use fractalbot::execution::EntryScanner;
use fractalbot::logging::setup_logging;
use fractalbot::persistence::PositionStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Scan every configured symbol once and enter on dual-fractal signals.
#[derive(Parser)]
#[command(name = "scan_entries")]
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
            tracing::error!("Entry scan failed: {:#}", e);
            notifier
                .send(Alert::error("entry scan failed", format!("{:#}", e)))
                .await;
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<()> {
    config.require_credentials()?;

    let exchange = Arc::new(BybitClient::new(&config.exchange).context("Failed to build exchange client")?);
    let scanner = EntryScanner::new(
        config,
        exchange,
        PositionStore::new(&config.storage.positions_path),
        notifier,
    );

    let report = scanner.run().await;
    tracing::info!(
        "Entry scan done: {} entered, {} skipped, {} failed",
        report.entered.len(),
        report.skipped.len(),
        report.failed.len()
    );

    Ok(())
}
