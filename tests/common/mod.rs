// Shared fixtures for the pipeline tests: a scripted exchange, a recording
// alert sink and candle series that do or do not trigger an entry.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use fractalbot::alerts::{Alert, Channel, Notifier};
use fractalbot::api::Exchange;
use fractalbot::config::AppConfig;
use fractalbot::error::BotError;
use fractalbot::models::{Candle, ExchangePosition, OrderRequest, Side};
use fractalbot::Result;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

pub const OK_ORDER: &str = r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"1001","orderLinkId":"x"}}"#;
pub const REJECTED_ORDER: &str =
    r#"{"retCode":110007,"retMsg":"ab not enough for new order","result":{}}"#;

/// What the fake answers to one order submission
#[derive(Debug, Clone)]
pub enum Reply {
    Body(String),
    Transport(String),
}

#[derive(Default)]
struct FakeState {
    candles: HashMap<String, Vec<Candle>>,
    candle_failures: HashMap<String, String>,
    candle_requests: Vec<String>,
    balance: Option<f64>,
    positions: Vec<ExchangePosition>,
    positions_failure: Option<String>,
    replies: HashMap<String, VecDeque<Reply>>,
    orders: Vec<OrderRequest>,
}

/// In-memory exchange with scripted answers
///
/// Orders without a scripted reply are accepted.
#[derive(Default)]
pub struct FakeExchange {
    state: Mutex<FakeState>,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.state.lock().unwrap().candles.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_candle_failure(self, symbol: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .candle_failures
            .insert(symbol.to_string(), message.to_string());
        self
    }

    pub fn with_balance(self, balance: f64) -> Self {
        self.state.lock().unwrap().balance = Some(balance);
        self
    }

    pub fn with_position(self, symbol: &str, side: Side, size: Decimal, pnl: f64) -> Self {
        self.state.lock().unwrap().positions.push(ExchangePosition {
            symbol: symbol.to_string(),
            side,
            size,
            unrealised_pnl: pnl,
        });
        self
    }

    pub fn with_positions_failure(self, message: &str) -> Self {
        self.state.lock().unwrap().positions_failure = Some(message.to_string());
        self
    }

    /// Queue replies for `symbol`, consumed one per order
    pub fn with_replies(self, symbol: &str, replies: Vec<Reply>) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(symbol.to_string())
            .or_default()
            .extend(replies);
        self
    }

    pub fn orders(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn orders_for(&self, symbol: &str) -> Vec<OrderRequest> {
        self.orders().into_iter().filter(|o| o.symbol == symbol).collect()
    }

    pub fn candle_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().candle_requests.clone()
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    async fn fetch_candles(
        &self,
        symbol: &str,
        _interval_minutes: u32,
        _limit: usize,
    ) -> Result<Vec<Candle>> {
        let mut state = self.state.lock().unwrap();
        state.candle_requests.push(symbol.to_string());

        if let Some(message) = state.candle_failures.get(symbol) {
            return Err(BotError::Transport(message.clone()));
        }
        Ok(state.candles.get(symbol).cloned().unwrap_or_default())
    }

    async fn wallet_balance(&self) -> Result<f64> {
        self.state
            .lock()
            .unwrap()
            .balance
            .ok_or_else(|| BotError::Transport("wallet endpoint unreachable".to_string()))
    }

    async fn open_positions(&self) -> Result<Vec<ExchangePosition>> {
        let state = self.state.lock().unwrap();
        match &state.positions_failure {
            Some(message) => Err(BotError::Transport(message.clone())),
            None => Ok(state.positions.clone()),
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.orders.push(order.clone());

        let reply = state
            .replies
            .get_mut(&order.symbol)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Reply::Body(OK_ORDER.to_string()));

        match reply {
            Reply::Body(body) => Ok(body),
            Reply::Transport(message) => Err(BotError::Transport(message)),
        }
    }
}

/// Keeps every alert for later inspection
#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.title).collect()
    }

    pub fn on_channel(&self, channel: Channel) -> Vec<Alert> {
        self.alerts()
            .into_iter()
            .filter(|a| a.channel == channel)
            .collect()
    }

    pub fn find(&self, title: &str) -> Option<Alert> {
        self.alerts().into_iter().find(|a| a.title == title)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: Alert) {
        self.alerts.lock().unwrap().push(alert);
    }
}

/// Default configuration restricted to `symbols`, with state files under `dir`
pub fn test_config(dir: &Path, symbols: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.symbols.retain(|symbol, _| symbols.contains(&symbol.as_str()));
    config.storage.positions_path = dir.join("position_status.json");
    config.storage.balance_path = dir.join("balance_reference.json");
    config
}

pub fn series_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
}

fn bar(i: usize, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp: series_start() + Duration::minutes(15 * i as i64),
        open: 105.0,
        high,
        low,
        close,
        volume: 100.0,
    }
}

/// 60 quiet 15-minute candles around 105 with an outside bar (110 / 100) at
/// index 50 and a final candle closing at `last_close`, newest first
///
/// A close at or below 67.64 triggers a long with target 95; at or above
/// 142.36 a short with target 115.
pub fn fractal_candles(last_close: f64) -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..59)
        .map(|i| {
            if i == 50 {
                bar(i, 110.0, 100.0, 105.0)
            } else {
                bar(i, 105.5, 104.5, 105.0)
            }
        })
        .collect();
    candles.push(bar(59, last_close.max(105.5), last_close.min(104.5), last_close));
    candles.reverse();
    candles
}

/// First instant at which every candle from [`fractal_candles`] is complete
pub fn after_series() -> DateTime<Utc> {
    series_start() + Duration::minutes(15 * 60)
}
