use crate::error::BotError;
use crate::models::Candle;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Turn raw exchange candles into an analysable series
///
/// - drops rows with any non-finite OHLCV value
/// - sorts ascending by open time and removes duplicate timestamps
/// - drops the still-forming candle, so the last element is the most recent
///   completed candle at `now`
pub fn prepare_candles(
    mut candles: Vec<Candle>,
    interval_minutes: u32,
    now: DateTime<Utc>,
) -> Vec<Candle> {
    let interval = Duration::minutes(interval_minutes as i64);

    candles.retain(|c| c.is_finite() && c.timestamp + interval <= now);
    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);

    candles
}

/// Floor `price` onto the `tick_size` grid using exact decimal arithmetic
///
/// `floor(price / tick) * tick`, so the result never exceeds the input and
/// applying it twice changes nothing.
pub fn floor_to_tick(price: f64, tick_size: Decimal) -> Result<Decimal> {
    // Shortest round-trip representation, not the binary expansion
    let exact = Decimal::from_str(&price.to_string())
        .map_err(|e| BotError::data(format!("price {} is not representable: {}", price, e)))?;

    let steps = exact
        .checked_div(tick_size)
        .ok_or_else(|| BotError::data(format!("cannot divide {} by tick {}", exact, tick_size)))?
        .floor();

    Ok((steps * tick_size).normalize())
}

/// Order size for an entry: the symbol's minimum lot times the configured leverage
///
/// Deliberately independent of account equity.
pub fn order_quantity(min_lot: Decimal, leverage: u32) -> Decimal {
    (min_lot * Decimal::from(leverage)).normalize()
}
