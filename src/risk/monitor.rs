use crate::alerts::{Alert, Notifier, Severity};
use crate::api::Exchange;
use crate::config::AppConfig;
use crate::error::BotError;
use crate::execution::gateway::{OrderGateway, RetryPolicy};
use crate::models::{AccountSnapshot, ExchangePosition};
use crate::persistence::{PositionStore, ReferenceBalance, ReferenceBalanceStore};
use crate::risk::drawdown::{DrawdownGuard, DrawdownReading, DrawdownTrip};
use crate::Result;
use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of one emergency liquidation
#[derive(Debug, Clone, PartialEq)]
pub struct EmergencyReport {
    pub reading: DrawdownReading,
    /// Symbols whose close order was accepted
    pub closed: Vec<String>,
    /// Symbols still open after every attempt failed
    pub still_open: Vec<String>,
    /// Closed symbols that also had a position record removed
    pub purged: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskOutcome {
    Normal(DrawdownReading),
    Tripped(EmergencyReport),
}

/// Reference balance state as printed by `status`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub reference_balance: f64,
    pub last_update: DateTime<Utc>,
    pub hours_since_update: f64,
    pub hours_until_rebase: f64,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Reference balance:  {:.2}", self.reference_balance)?;
        writeln!(
            f,
            "Last update:        {}",
            self.last_update
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "Since update:       {:.1} h", self.hours_since_update)?;
        write!(f, "Until next rebase:  {:.1} h", self.hours_until_rebase)
    }
}

/// Account-wide drawdown watchdog
///
/// Measures equity against a reference balance that rebases itself to the
/// wallet balance every `balance_update_hours`, and liquidates every exchange
/// position once the loss ratio reaches the limit.
pub struct RiskMonitor {
    config: AppConfig,
    exchange: Arc<dyn Exchange>,
    gateway: OrderGateway,
    positions: PositionStore,
    balances: ReferenceBalanceStore,
    notifier: Arc<dyn Notifier>,
    guard: DrawdownGuard,
    close_policy: RetryPolicy,
}

impl RiskMonitor {
    pub fn new(
        config: &AppConfig,
        exchange: Arc<dyn Exchange>,
        positions: PositionStore,
        balances: ReferenceBalanceStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let risk = &config.risk;

        Self {
            config: config.clone(),
            gateway: OrderGateway::new(exchange.clone()),
            exchange,
            positions,
            balances,
            notifier,
            guard: DrawdownGuard::new(risk.max_loss_fraction),
            close_policy: RetryPolicy::emergency(
                risk.emergency_close_attempts,
                Duration::from_secs(risk.emergency_backoff_secs),
            ),
        }
    }

    pub fn with_close_policy(mut self, policy: RetryPolicy) -> Self {
        self.close_policy = policy;
        self
    }

    pub async fn run(&self) -> Result<RiskOutcome> {
        self.run_at(Utc::now()).await
    }

    /// One monitoring cycle
    ///
    /// Any fetch failure aborts before a drawdown decision is made.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RiskOutcome> {
        let wallet_balance = self.exchange.wallet_balance().await?;
        let reference = self.current_reference(wallet_balance, now)?;
        let positions = self.exchange.open_positions().await?;

        let snapshot = AccountSnapshot {
            wallet_balance,
            positions,
        };
        let equity = snapshot.total_equity();

        tracing::info!(
            "Reference {:.2} | balance {:.2} | unrealised {:.2} | equity {:.2}",
            reference.reference_balance,
            snapshot.wallet_balance,
            snapshot.total_unrealised_pnl(),
            equity
        );

        match self.guard.check(reference.reference_balance, equity) {
            Ok(reading) => {
                tracing::info!("Loss ratio {:.1}% within limit", reading.loss_ratio * 100.0);
                self.notifier
                    .send(
                        Alert::status("risk check normal")
                            .field("Equity", format!("{:.2}", reading.total_equity))
                            .field("Reference", format!("{:.2}", reading.reference_balance))
                            .field("Loss ratio", format!("{:.1}%", reading.loss_ratio * 100.0)),
                    )
                    .await;
                Ok(RiskOutcome::Normal(reading))
            }
            Err(trip) => Ok(RiskOutcome::Tripped(self.liquidate(trip, &snapshot).await)),
        }
    }

    /// Load (or seed) the reference and rebase it to `wallet_balance` when due
    fn current_reference(&self, wallet_balance: f64, now: DateTime<Utc>) -> Result<ReferenceBalance> {
        let risk = &self.config.risk;
        let reference = self.balances.load_or_seed(risk.initial_balance, now)?;

        if !reference.is_rebase_due(now, risk.balance_update_hours) {
            return Ok(reference);
        }

        tracing::info!(
            "Rebasing reference balance {:.2} -> {:.2}",
            reference.reference_balance,
            wallet_balance
        );
        self.balances.save(wallet_balance, now)
    }

    async fn liquidate(&self, trip: DrawdownTrip, snapshot: &AccountSnapshot) -> EmergencyReport {
        let reading = trip.reading;
        tracing::error!(
            "Loss ratio {:.1}% reached limit {:.1}%, closing {} positions",
            reading.loss_ratio * 100.0,
            trip.max_loss_fraction * 100.0,
            snapshot.positions.len()
        );

        let breakdown = snapshot
            .positions
            .iter()
            .map(|p| format!("{}: {:.2}", p.symbol, p.unrealised_pnl))
            .collect::<Vec<_>>()
            .join("\n");
        self.notifier
            .send(
                Alert::error("emergency stop triggered", breakdown)
                    .field("Reference", format!("{:.2}", reading.reference_balance))
                    .field("Balance", format!("{:.2}", snapshot.wallet_balance))
                    .field("Unrealised PnL", format!("{:.2}", snapshot.total_unrealised_pnl()))
                    .field("Equity", format!("{:.2}", reading.total_equity))
                    .field("Loss ratio", format!("{:.1}%", reading.loss_ratio * 100.0)),
            )
            .await;

        let results = join_all(snapshot.positions.iter().map(|p| self.close_position(p))).await;

        let mut closed = Vec::new();
        let mut still_open = Vec::new();
        for (position, success) in snapshot.positions.iter().zip(results) {
            if success {
                closed.push(position.symbol.clone());
            } else {
                still_open.push(position.symbol.clone());
            }
        }

        // A hedged symbol keeps its record while any of its legs is still open
        let mut purgeable: Vec<String> = closed
            .iter()
            .filter(|symbol| !still_open.contains(symbol))
            .cloned()
            .collect();
        purgeable.sort();
        purgeable.dedup();

        if let Err(e) = self.positions.load() {
            tracing::error!("Position store unreadable before purge: {}", e);
            self.notifier
                .send(Alert::error("position store unreadable", e.to_string()))
                .await;
        }

        let purged = match self.positions.delete_many(&purgeable) {
            Ok(purged) => purged,
            Err(e) => {
                tracing::error!("Failed to purge closed symbols from the store: {}", e);
                self.notifier
                    .send(Alert::error("position store update failed", e.to_string()))
                    .await;
                Vec::new()
            }
        };

        for position in snapshot.positions.iter().filter(|p| closed.contains(&p.symbol)) {
            self.notifier
                .send(
                    Alert::trade(Severity::Close, "Emergency close")
                        .with_description("drawdown limit reached")
                        .field("Symbol", &position.symbol)
                        .field("Qty", position.size)
                        .field("Unrealised PnL", format!("{:.2}", position.unrealised_pnl)),
                )
                .await;
        }

        let summary = if still_open.is_empty() {
            Alert::status("emergency close complete")
        } else {
            Alert::error(
                "emergency close incomplete",
                format!("still open: {}", still_open.join(", ")),
            )
        };
        self.notifier
            .send(
                summary
                    .field("Closed", list_or_dash(&closed))
                    .field("Still open", list_or_dash(&still_open)),
            )
            .await;

        EmergencyReport {
            reading,
            closed,
            still_open,
            purged,
        }
    }

    async fn close_position(&self, position: &ExchangePosition) -> bool {
        self.gateway
            .submit_close(
                &position.symbol,
                position.side.opposite(),
                position.size,
                &self.close_policy,
            )
            .await
            .success
    }

    /// Overwrite the reference balance by hand
    pub fn reset(&self, value: f64, now: DateTime<Utc>) -> Result<ReferenceBalance> {
        if !value.is_finite() {
            return Err(BotError::data(format!("{} is not a usable balance", value)));
        }

        let reference = self.balances.save(value, now)?;
        tracing::info!("Reference balance reset to {:.2}", value);
        Ok(reference)
    }

    /// Current reference state, seeding the document if it does not exist yet
    pub fn status(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        let risk = &self.config.risk;
        let reference = self.balances.load_or_seed(risk.initial_balance, now)?;

        Ok(StatusReport {
            reference_balance: reference.reference_balance,
            last_update: reference.last_update,
            hours_since_update: reference.hours_since_update(now),
            hours_until_rebase: reference.hours_until_rebase(now, risk.balance_update_hours),
        })
    }
}

fn list_or_dash(symbols: &[String]) -> String {
    if symbols.is_empty() {
        "-".to_string()
    } else {
        symbols.join(", ")
    }
}
