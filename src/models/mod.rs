use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// OHLCV candlestick data
///
/// `timestamp` is the candle open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// False when any price or volume field is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Order side, spelled the way the exchange spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Parse the exchange's side string. Flat positions report an empty side.
    pub fn parse(raw: &str) -> Option<Side> {
        match raw {
            "Buy" => Some(Side::Buy),
            "Sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn entry_side(self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// Side of the order that later exits this trade
    pub fn closing_side(self) -> Side {
        self.entry_side().opposite()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

/// A single actionable entry produced by the signal detector
#[derive(Debug, Clone, PartialEq)]
pub struct TradeIntent {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: Decimal,
    /// Close of the most recent completed candle
    pub entry_price: f64,
    /// Take-profit already floored onto the tick grid
    pub take_profit: Decimal,
    pub adx: f64,
    /// Open time of the dual-extremum candle that triggered the entry
    pub fractal_time: DateTime<Utc>,
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub unrealised_pnl: f64,
}

/// Account state observed during one risk-monitor run (never persisted)
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub wallet_balance: f64,
    /// Every exchange-reported position with nonzero size, tracked or not
    pub positions: Vec<ExchangePosition>,
}

impl AccountSnapshot {
    pub fn total_unrealised_pnl(&self) -> f64 {
        self.positions.iter().map(|p| p.unrealised_pnl).sum()
    }

    pub fn total_equity(&self) -> f64 {
        self.wallet_balance + self.total_unrealised_pnl()
    }
}

/// Market order as submitted to the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub take_profit: Option<Decimal>,
    pub reduce_only: bool,
    pub order_link_id: String,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, qty: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            qty: qty.normalize(),
            take_profit: None,
            reduce_only: false,
            order_link_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

/// Normalised outcome of an order submission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub success: bool,
    /// `None` when the response was empty or not valid JSON
    pub code: Option<i64>,
    pub message: String,
    pub order_id: Option<String>,
}

impl OrderResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: None,
            message: message.into(),
            order_id: None,
        }
    }
}
