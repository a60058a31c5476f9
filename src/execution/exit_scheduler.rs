use crate::alerts::{Alert, Notifier, Severity};
use crate::api::Exchange;
use crate::config::AppConfig;
use crate::error::BotError;
use crate::execution::gateway::{OrderGateway, RetryPolicy};
use crate::persistence::{PositionRecord, PositionStore};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;

/// What happened to each record during one sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitReport {
    /// Closed and removed from the store
    pub closed: Vec<String>,
    /// Still inside the holding window
    pub pending: Vec<String>,
    /// Past the deadline but the close (or its bookkeeping) failed; retried next run
    pub failed: Vec<String>,
    /// No usable opening time, left alone
    pub deferred: Vec<String>,
}

impl ExitReport {
    pub fn examined(&self) -> usize {
        self.closed.len() + self.pending.len() + self.failed.len() + self.deferred.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitOutcome {
    Closed,
    Pending,
    Failed,
    Deferred,
}

/// Latest instant a position opened at `opened_at` may stay open
///
/// `None` when the holding window does not fit in the representable range.
pub fn close_deadline(
    opened_at: DateTime<Utc>,
    max_holding_bars: u32,
    bars_per_hour: f64,
) -> Option<DateTime<Utc>> {
    let millis = (max_holding_bars as f64 / bars_per_hour * 3_600_000.0).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return None;
    }

    Duration::try_milliseconds(millis as i64).and_then(|window| opened_at.checked_add_signed(window))
}

/// Time-based exit sweep over the position store
pub struct ExitScheduler {
    config: AppConfig,
    gateway: OrderGateway,
    store: PositionStore,
    notifier: Arc<dyn Notifier>,
}

impl ExitScheduler {
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        store: PositionStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: config.clone(),
            gateway: OrderGateway::new(exchange),
            store,
            notifier,
        }
    }

    pub async fn sweep(&self) -> ExitReport {
        self.sweep_at(Utc::now()).await
    }

    /// Close every record whose holding window ended before `now`
    ///
    /// One close attempt per record per sweep; a failure leaves the record in
    /// place for the next scheduled sweep.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> ExitReport {
        let mut report = ExitReport::default();
        let positions = match self.store.load() {
            Ok(positions) => positions,
            Err(e) => {
                tracing::error!("Cannot read position store, skipping sweep: {}", e);
                self.notifier
                    .send(Alert::error("position store unreadable", e.to_string()))
                    .await;
                return report;
            }
        };

        if positions.is_empty() {
            tracing::info!("No open position records, nothing to sweep");
            return report;
        }

        tracing::info!("Sweeping {} position records", positions.len());

        let outcomes = join_all(
            positions
                .iter()
                .map(|(symbol, record)| self.process(symbol, record, now)),
        )
        .await;

        for (symbol, outcome) in positions.keys().cloned().zip(outcomes) {
            match outcome {
                ExitOutcome::Closed => report.closed.push(symbol),
                ExitOutcome::Pending => report.pending.push(symbol),
                ExitOutcome::Failed => report.failed.push(symbol),
                ExitOutcome::Deferred => report.deferred.push(symbol),
            }
        }

        self.notifier
            .send(
                Alert::status(format!("exit sweep processed {} records", report.examined()))
                    .field("Closed", report.closed.len())
                    .field("Pending", report.pending.len())
                    .field("Failed", report.failed.len())
                    .field("Deferred", report.deferred.len()),
            )
            .await;

        report
    }

    async fn process(&self, symbol: &str, record: &PositionRecord, now: DateTime<Utc>) -> ExitOutcome {
        match self.try_process(symbol, record, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("{}: exit sweep failed: {}", symbol, e);
                self.notifier
                    .send(Alert::error(format!("{} exit failed", symbol), e.to_string()))
                    .await;
                ExitOutcome::Failed
            }
        }
    }

    async fn try_process(
        &self,
        symbol: &str,
        record: &PositionRecord,
        now: DateTime<Utc>,
    ) -> Result<ExitOutcome> {
        let spec = self.config.symbol(symbol)?;

        // Missing timestamp counts as opened now: never close on corrupt data
        let Some(opened_at) = record.opened_at else {
            tracing::warn!("{}: record has no usable opening time", symbol);
            self.notifier
                .send(Alert::error(
                    "timestamp missing",
                    format!("{}: position record has no opening time, close deferred", symbol),
                ))
                .await;
            return Ok(ExitOutcome::Deferred);
        };

        let deadline = close_deadline(
            opened_at,
            spec.max_holding_bars,
            self.config.trading.bars_per_hour(),
        )
        .ok_or_else(|| {
            BotError::data(format!(
                "{}: holding limit of {} bars is out of range",
                symbol, spec.max_holding_bars
            ))
        })?;
        if now <= deadline {
            tracing::debug!("{}: holding until {}", symbol, deadline);
            return Ok(ExitOutcome::Pending);
        }

        tracing::info!("{}: holding time ended at {}, closing", symbol, deadline);
        let result = self
            .gateway
            .submit_close(symbol, record.side, record.qty, &RetryPolicy::once())
            .await;

        if !result.success {
            self.notifier
                .send(
                    Alert::error(format!("{} close failed", symbol), result.message.clone())
                        .field("Code", result.code.map_or("none".to_string(), |c| c.to_string())),
                )
                .await;
            return Ok(ExitOutcome::Failed);
        }

        self.store.delete(symbol)?;

        self.notifier
            .send(
                Alert::trade(Severity::Close, "Position closed")
                    .with_description("holding time limit reached")
                    .field("Symbol", symbol)
                    .field("Qty", record.qty)
                    .field("Entry price", record.entry_price)
                    .field("Exit target", record.exit_price),
            )
            .await;

        Ok(ExitOutcome::Closed)
    }
}
