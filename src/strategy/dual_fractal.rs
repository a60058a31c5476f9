use crate::config::{AppConfig, SymbolSpec};
use crate::error::BotError;
use crate::indicators::{calculate_adx_series, detect_dual_fractals, FractalLevels, FractalPoint};
use crate::models::{Candle, Direction, TradeIntent};
use crate::strategy::signals::{floor_to_tick, order_quantity};
use crate::strategy::Strategy;
use crate::Result;

/// Mean-reversion entries off dual fractals, gated by low ADX
///
/// A long fires when the latest completed close has fallen to the fractal's
/// 4.236 extension below its high; a short when it has risen to the same
/// extension above its low. Either way ADX must sit at or below the symbol's
/// ceiling, i.e. the market is ranging rather than trending.
#[derive(Debug, Clone)]
pub struct DualFractalStrategy {
    spec: SymbolSpec,
    leverage: u32,
    adx_period: usize,
    lookback: usize,
    levels: FractalLevels,
}

impl DualFractalStrategy {
    pub fn new(
        spec: SymbolSpec,
        leverage: u32,
        adx_period: usize,
        lookback: usize,
        levels: FractalLevels,
    ) -> Self {
        Self {
            spec,
            leverage,
            adx_period,
            lookback,
            levels,
        }
    }

    pub fn for_symbol(config: &AppConfig, symbol: &str) -> Result<Self> {
        let spec = config.symbol(symbol)?.clone();
        Ok(Self::new(
            spec,
            config.trading.leverage,
            config.trading.adx_period,
            config.trading.fractal_lookback,
            config.trading.fractal_levels(),
        ))
    }

    fn build_intent(
        &self,
        symbol: &str,
        direction: Direction,
        point: &FractalPoint,
        latest: &Candle,
        adx: f64,
    ) -> Result<TradeIntent> {
        let raw_target = match direction {
            Direction::Long => point.long_target,
            Direction::Short => point.short_target,
        };

        Ok(TradeIntent {
            symbol: symbol.to_string(),
            direction,
            quantity: order_quantity(self.spec.min_lot, self.leverage),
            entry_price: latest.close,
            take_profit: floor_to_tick(raw_target, self.spec.tick_size)?,
            adx,
            fractal_time: point.timestamp,
        })
    }
}

/// Direction the latest close triggers for a fractal, if any
pub fn triggered_direction(close: f64, point: &FractalPoint) -> Option<Direction> {
    if close <= point.long_trigger {
        Some(Direction::Long)
    } else if close >= point.short_trigger {
        Some(Direction::Short)
    } else {
        None
    }
}

impl Strategy for DualFractalStrategy {
    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Result<Option<TradeIntent>> {
        let latest = candles
            .last()
            .ok_or_else(|| BotError::data(format!("{}: no candle data", symbol)))?;

        let adx_series = calculate_adx_series(candles, self.adx_period);
        if adx_series.iter().all(Option::is_none) {
            return Err(BotError::data(format!(
                "{}: ADX({}) undefined for all {} candles",
                symbol,
                self.adx_period,
                candles.len()
            )));
        }

        let fractals = detect_dual_fractals(candles, self.lookback, &self.levels);
        tracing::debug!(
            "{}: {} dual fractals in last {} candles",
            symbol,
            fractals.len(),
            self.lookback
        );

        let adx = match adx_series.last().copied().flatten() {
            Some(adx) if adx <= self.spec.adx_ceiling => adx,
            Some(adx) => {
                tracing::debug!(
                    "{}: ADX {:.2} above ceiling {:.2}, no entry",
                    symbol,
                    adx,
                    self.spec.adx_ceiling
                );
                return Ok(None);
            }
            None => {
                tracing::debug!("{}: ADX undefined on latest candle, no entry", symbol);
                return Ok(None);
            }
        };

        let actionable = fractals
            .iter()
            .filter(|point| point.passes_volatility(self.spec.min_volatility_pct))
            .find_map(|point| triggered_direction(latest.close, point).map(|d| (d, point)));

        match actionable {
            Some((direction, point)) => {
                let intent = self.build_intent(symbol, direction, point, latest, adx)?;
                tracing::info!(
                    "{}: {} signal from fractal at {} (close {}, ADX {:.2}, TP {})",
                    symbol,
                    direction.label(),
                    point.timestamp.format("%Y-%m-%d %H:%M"),
                    latest.close,
                    adx,
                    intent.take_profit
                );
                Ok(Some(intent))
            }
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "Dual Fractal"
    }

    fn min_candles_required(&self) -> usize {
        2 * self.adx_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn spec() -> SymbolSpec {
        SymbolSpec {
            adx_ceiling: 24.0,
            min_volatility_pct: 0.4,
            min_lot: Decimal::new(1, 3),
            tick_size: Decimal::new(1, 1),
            max_holding_bars: 1312,
        }
    }

    fn strategy(spec: SymbolSpec) -> DualFractalStrategy {
        DualFractalStrategy::new(spec, 20, 14, 144, FractalLevels::default())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    }

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: start() + Duration::minutes(15 * i as i64),
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    /// 60 quiet candles around 105 with outside bars at `fractals`
    /// and a final candle closing at `last_close`
    fn series(fractals: &[(usize, f64, f64)], last_close: f64) -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..59)
            .map(|i| match fractals.iter().find(|(at, _, _)| *at == i) {
                Some(&(_, high, low)) => bar(i, 105.0, high, low, 105.0),
                None => bar(i, 105.0, 105.5, 104.5, 105.0),
            })
            .collect();

        let high = last_close.max(105.5);
        let low = last_close.min(104.5);
        candles.push(bar(59, 105.0, high, low, last_close));
        candles
    }

    #[test]
    fn test_long_entry_below_trigger() {
        // high 110 / low 100 -> long trigger 67.64, target 95
        let candles = series(&[(50, 110.0, 100.0)], 65.0);

        let intent = strategy(spec()).evaluate("BTCUSDT", &candles).unwrap().unwrap();

        assert_eq!(intent.direction, Direction::Long);
        assert_eq!(intent.take_profit, Decimal::new(95, 0));
        assert_eq!(intent.quantity, Decimal::new(2, 2));
        assert_eq!(intent.entry_price, 65.0);
        assert_eq!(intent.fractal_time, candles[50].timestamp);
        assert!(intent.adx <= 24.0);
    }

    #[test]
    fn test_no_entry_just_above_trigger() {
        let candles = series(&[(50, 110.0, 100.0)], 67.65);
        assert!(strategy(spec()).evaluate("BTCUSDT", &candles).unwrap().is_none());
    }

    #[test]
    fn test_short_entry_above_trigger() {
        // short trigger 142.36, target 115
        let candles = series(&[(50, 110.0, 100.0)], 145.0);

        let intent = strategy(spec()).evaluate("BTCUSDT", &candles).unwrap().unwrap();

        assert_eq!(intent.direction, Direction::Short);
        assert_eq!(intent.take_profit, Decimal::new(115, 0));
    }

    #[test]
    fn test_adx_ceiling_blocks_entry() {
        let candles = series(&[(50, 110.0, 100.0)], 65.0);
        let strict = SymbolSpec {
            adx_ceiling: 1.0,
            ..spec()
        };

        assert!(strategy(strict).evaluate("BTCUSDT", &candles).unwrap().is_none());
    }

    #[test]
    fn test_low_volatility_fractal_is_ignored() {
        let candles = series(&[(50, 110.0, 100.0)], 65.0);
        let picky = SymbolSpec {
            min_volatility_pct: 20.0,
            ..spec()
        };

        assert!(strategy(picky).evaluate("BTCUSDT", &candles).unwrap().is_none());
    }

    #[test]
    fn test_first_actionable_fractal_wins() {
        // Both fire for a close of 50; the older one (target 95) is used
        let candles = series(&[(40, 110.0, 100.0), (50, 112.0, 98.0)], 50.0);

        let intent = strategy(spec()).evaluate("BTCUSDT", &candles).unwrap().unwrap();

        assert_eq!(intent.fractal_time, candles[40].timestamp);
        assert_eq!(intent.take_profit, Decimal::new(95, 0));
    }

    #[test]
    fn test_empty_candles_is_data_error() {
        let result = strategy(spec()).evaluate("BTCUSDT", &[]);
        assert!(matches!(result, Err(BotError::Data(_))));
    }

    #[test]
    fn test_undefined_adx_is_data_error() {
        let candles: Vec<Candle> = (0..20).map(|i| bar(i, 105.0, 105.5, 104.5, 105.0)).collect();
        let result = strategy(spec()).evaluate("BTCUSDT", &candles);
        assert!(matches!(result, Err(BotError::Data(_))));
    }

    #[test]
    fn test_triggered_direction_boundaries() {
        let point = FractalPoint::from_candle(
            0,
            &bar(0, 105.0, 110.0, 100.0, 105.0),
            &FractalLevels::default(),
        );

        assert_eq!(triggered_direction(point.long_trigger, &point), Some(Direction::Long));
        assert_eq!(triggered_direction(point.short_trigger, &point), Some(Direction::Short));
        assert_eq!(triggered_direction(105.0, &point), None);
    }
}
