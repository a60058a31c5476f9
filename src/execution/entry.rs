use crate::alerts::{Alert, Notifier, Severity};
use crate::api::Exchange;
use crate::config::AppConfig;
use crate::error::BotError;
use crate::execution::gateway::OrderGateway;
use crate::models::{Direction, TradeIntent};
use crate::persistence::{PositionRecord, PositionStore};
use crate::strategy::signals::prepare_candles;
use crate::strategy::{DualFractalStrategy, Strategy};
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;

/// Benign reasons a symbol produced no order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A position record already exists for the symbol
    AlreadyOpen,
    /// No fractal triggered on the latest completed candle
    NoSignal,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyOpen => f.write_str("position already open"),
            SkipReason::NoSignal => f.write_str("no signal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Entered(TradeIntent),
    Skipped(SkipReason),
}

/// What one entry batch did, per symbol
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub entered: Vec<String>,
    pub skipped: Vec<(String, SkipReason)>,
    pub failed: Vec<String>,
}

/// Entry pipeline: candles -> signal -> order -> position record
pub struct EntryScanner {
    config: AppConfig,
    exchange: Arc<dyn Exchange>,
    gateway: OrderGateway,
    store: PositionStore,
    notifier: Arc<dyn Notifier>,
}

impl EntryScanner {
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        store: PositionStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: config.clone(),
            gateway: OrderGateway::new(exchange.clone()),
            exchange,
            store,
            notifier,
        }
    }

    pub async fn run(&self) -> ScanReport {
        self.run_at(Utc::now()).await
    }

    /// Scan every configured symbol concurrently
    ///
    /// A failing symbol is alerted on its own and never affects the others.
    pub async fn run_at(&self, now: DateTime<Utc>) -> ScanReport {
        let symbols = self.config.symbol_names();

        // Without a readable store every symbol would look flat and be re-entered
        if let Err(e) = self.store.load() {
            tracing::error!("Cannot read position store, skipping entry scan: {}", e);
            self.notifier
                .send(Alert::error("position store unreadable", e.to_string()))
                .await;
            return ScanReport {
                failed: symbols,
                ..ScanReport::default()
            };
        }

        tracing::info!("Entry scan over {} symbols", symbols.len());

        let results = join_all(symbols.iter().map(|symbol| self.scan_symbol(symbol, now))).await;

        let mut report = ScanReport::default();
        for (symbol, result) in symbols.into_iter().zip(results) {
            match result {
                Ok(ScanOutcome::Entered(_)) => report.entered.push(symbol),
                Ok(ScanOutcome::Skipped(reason)) => {
                    tracing::info!("{}: skipped ({})", symbol, reason);
                    report.skipped.push((symbol, reason));
                }
                Err(e) => {
                    tracing::error!("{}: entry scan failed: {}", symbol, e);
                    self.notifier
                        .send(Alert::error(format!("{} entry failed", symbol), e.to_string()))
                        .await;
                    report.failed.push(symbol);
                }
            }
        }

        self.notifier
            .send(
                Alert::status("entry scan complete")
                    .field("Entered", report.entered.len())
                    .field("Skipped", report.skipped.len())
                    .field("Failed", report.failed.len()),
            )
            .await;

        report
    }

    /// Run the full pipeline for one symbol
    pub async fn scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> Result<ScanOutcome> {
        if self.store.load()?.contains_key(symbol) {
            return Ok(ScanOutcome::Skipped(SkipReason::AlreadyOpen));
        }

        let strategy = DualFractalStrategy::for_symbol(&self.config, symbol)?;
        let trading = &self.config.trading;

        let raw = self
            .exchange
            .fetch_candles(symbol, trading.interval_minutes, trading.candle_limit)
            .await?;
        let candles = prepare_candles(raw, trading.interval_minutes, now);
        if candles.is_empty() {
            return Err(BotError::data(format!("{}: no completed candles", symbol)));
        }
        if candles.len() < strategy.min_candles_required() {
            tracing::warn!(
                "{}: only {} candles, {} needs {}",
                symbol,
                candles.len(),
                strategy.name(),
                strategy.min_candles_required()
            );
        }

        let intent = match strategy.evaluate(symbol, &candles)? {
            Some(intent) => intent,
            None => return Ok(ScanOutcome::Skipped(SkipReason::NoSignal)),
        };

        let result = self.gateway.submit_entry(&intent).await?;
        if !result.success {
            return Err(BotError::Api {
                code: result.code.unwrap_or(-1),
                message: result.message,
            });
        }

        // Recorded on acceptance, not on fill
        self.store
            .put(symbol, PositionRecord::from_intent(&intent, now))?;
        tracing::info!(
            "{}: {} entry recorded at {} (TP {})",
            symbol,
            intent.direction.label(),
            intent.entry_price,
            intent.take_profit
        );

        let severity = match intent.direction {
            Direction::Long => Severity::LongEntry,
            Direction::Short => Severity::ShortEntry,
        };
        self.notifier
            .send(
                Alert::trade(severity, format!("{} entry", intent.direction.label()))
                    .field("Result", &result.message)
                    .field("Symbol", symbol)
                    .field("Qty", intent.quantity)
                    .field("Entry price", intent.entry_price)
                    .field("Take profit", intent.take_profit)
                    .field("ADX", format!("{:.2}", intent.adx)),
            )
            .await;

        Ok(ScanOutcome::Entered(intent))
    }
}
