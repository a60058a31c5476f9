use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use fractalbot::api::{BybitClient, Exchange};
use fractalbot::config::AppConfig;
use fractalbot::indicators::{detect_dual_fractals, FractalPoint};
use fractalbot::logging::setup_logging;
use fractalbot::strategy::signals::prepare_candles;
use futures::future::join_all;
use std::path::PathBuf;

/// Print every dual fractal in recent history for the configured symbols.
#[derive(Parser)]
#[command(name = "list_fractals")]
struct Cli {
    /// Path to a TOML config file. Defaults to config/fractalbot.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Candle intervals in minutes.
    #[arg(long, value_delimiter = ',', default_value = "15,60,240")]
    intervals: Vec<u32>,

    /// Candles fetched per symbol and interval.
    #[arg(long, default_value_t = 300)]
    limit: usize,

    /// Restrict to these symbols instead of every configured one.
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let exchange = BybitClient::new(&config.exchange).context("Failed to build exchange client")?;
    let levels = config.trading.fractal_levels();

    let symbols = if cli.symbols.is_empty() {
        config.symbol_names()
    } else {
        cli.symbols.clone()
    };

    let jobs: Vec<(String, u32)> = symbols
        .iter()
        .flat_map(|symbol| cli.intervals.iter().map(move |&interval| (symbol.clone(), interval)))
        .collect();

    let now = Utc::now();
    let limit = cli.limit;
    let results = join_all(jobs.iter().map(|(symbol, interval)| {
        let exchange = &exchange;
        async move {
            let raw = exchange.fetch_candles(symbol, *interval, limit).await?;
            let candles = prepare_candles(raw, *interval, now);
            Ok::<_, fractalbot::BotError>(detect_dual_fractals(&candles, candles.len(), &levels))
        }
    }))
    .await;

    println!(
        "{:<10} {:>5}  {:<20} {:>12} {:>12} {:>8}",
        "symbol", "tf", "time (UTC)", "high", "low", "range %"
    );

    for ((symbol, interval), result) in jobs.iter().zip(results) {
        match result {
            Ok(points) => {
                for point in &points {
                    println!("{}", format_row(symbol, *interval, point));
                }
            }
            Err(e) => tracing::warn!("{} {}m: {}", symbol, interval, e),
        }
    }

    Ok(())
}

fn format_row(symbol: &str, interval: u32, point: &FractalPoint) -> String {
    format!(
        "{:<10} {:>5}  {:<20} {:>12} {:>12} {:>8.2}",
        symbol,
        format!("{}m", interval),
        point.timestamp.format("%Y-%m-%d %H:%M"),
        point.high,
        point.low,
        point.volatility_pct
    )
}
