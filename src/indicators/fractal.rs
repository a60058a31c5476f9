// Dual fractal detection
//
// A dual fractal is a candle whose high beats the highs of the two candles on
// each side AND whose low undercuts their lows: an outside bar against its whole
// 5-candle neighborhood.

use crate::models::Candle;
use chrono::{DateTime, Utc};

/// Neighbor offsets compared against the center candle
const NEIGHBORS: [isize; 4] = [-2, -1, 1, 2];

/// Multipliers applied to a fractal's high-low range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractalLevels {
    /// Extension used for the entry trigger (4.236)
    pub trigger_multiplier: f64,
    /// Retracement used for the take-profit target (1.5)
    pub target_multiplier: f64,
}

impl Default for FractalLevels {
    fn default() -> Self {
        Self {
            trigger_multiplier: 4.236,
            target_multiplier: 1.5,
        }
    }
}

/// A detected dual fractal with its derived price levels
#[derive(Debug, Clone, PartialEq)]
pub struct FractalPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Long entries fire at or below this price
    pub long_trigger: f64,
    /// Short entries fire at or above this price
    pub short_trigger: f64,
    pub long_target: f64,
    pub short_target: f64,
    /// Candle range as a percentage of its open
    pub volatility_pct: f64,
}

impl FractalPoint {
    pub fn from_candle(index: usize, candle: &Candle, levels: &FractalLevels) -> Self {
        let diff = candle.high - candle.low;

        Self {
            index,
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            long_trigger: candle.high - diff * levels.trigger_multiplier,
            short_trigger: candle.low + diff * levels.trigger_multiplier,
            long_target: candle.high - diff * levels.target_multiplier,
            short_target: candle.low + diff * levels.target_multiplier,
            volatility_pct: diff / candle.open * 100.0,
        }
    }

    /// True when the candle moved enough to be worth trading
    pub fn passes_volatility(&self, min_volatility_pct: f64) -> bool {
        self.volatility_pct.is_finite() && self.volatility_pct >= min_volatility_pct
    }
}

/// Check whether candle `i` is both the highest high and the lowest low of its
/// 5-candle neighborhood. Indices without two neighbors on each side never qualify.
pub fn is_dual_fractal(candles: &[Candle], i: usize) -> bool {
    if i < 2 || i + 2 >= candles.len() {
        return false;
    }

    let center = &candles[i];
    NEIGHBORS.iter().all(|&offset| {
        let neighbor = &candles[(i as isize + offset) as usize];
        center.high > neighbor.high && center.low < neighbor.low
    })
}

/// Scan the trailing `lookback` candles for dual fractals, oldest first
///
/// The two most recent candles are never candidates because their right-hand
/// neighbors do not exist yet.
pub fn detect_dual_fractals(
    candles: &[Candle],
    lookback: usize,
    levels: &FractalLevels,
) -> Vec<FractalPoint> {
    let end = candles.len().saturating_sub(2);
    let start = candles.len().saturating_sub(lookback);

    (start..end)
        .filter(|&i| is_dual_fractal(candles, i))
        .map(|i| FractalPoint::from_candle(i, &candles[i], levels))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize, open: f64, high: f64, low: f64) -> Candle {
        Candle {
            timestamp: DateTime::from_timestamp(1_700_000_000 + 900 * i as i64, 0).unwrap(),
            open,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 10.0,
        }
    }

    fn flat_with_outside_bar_at(len: usize, at: usize) -> Vec<Candle> {
        (0..len)
            .map(|i| {
                if i == at {
                    candle(i, 105.0, 110.0, 100.0)
                } else {
                    candle(i, 105.0, 106.0, 104.0)
                }
            })
            .collect()
    }

    #[test]
    fn test_levels_from_range() {
        let point = FractalPoint::from_candle(
            0,
            &candle(0, 105.0, 110.0, 100.0),
            &FractalLevels::default(),
        );

        assert!((point.long_trigger - 67.64).abs() < 1e-9);
        assert!((point.long_target - 95.0).abs() < 1e-9);
        assert!((point.short_trigger - 142.36).abs() < 1e-9);
        assert!((point.short_target - 115.0).abs() < 1e-9);
        assert!((point.volatility_pct - 10.0 / 105.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_detects_outside_bar() {
        let candles = flat_with_outside_bar_at(20, 10);
        let points = detect_dual_fractals(&candles, 144, &FractalLevels::default());

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].index, 10);
        assert_eq!(points[0].high, 110.0);
    }

    #[test]
    fn test_requires_strict_inequality() {
        let mut candles = flat_with_outside_bar_at(20, 10);
        // Neighbor ties the high: no longer a strict maximum
        candles[12].high = 110.0;

        assert!(!is_dual_fractal(&candles, 10));
    }

    #[test]
    fn test_high_only_fractal_is_rejected() {
        let mut candles = flat_with_outside_bar_at(20, 10);
        candles[10].low = 105.0;

        assert!(!is_dual_fractal(&candles, 10));
    }

    #[test]
    fn test_last_two_candles_are_excluded() {
        // Outside bar at len - 2 has only one right neighbor
        let candles = flat_with_outside_bar_at(20, 18);
        let points = detect_dual_fractals(&candles, 144, &FractalLevels::default());
        assert!(points.is_empty());
    }

    #[test]
    fn test_lookback_limits_scan() {
        let candles = flat_with_outside_bar_at(200, 20);

        assert!(detect_dual_fractals(&candles, 144, &FractalLevels::default()).is_empty());
        assert_eq!(
            detect_dual_fractals(&candles, 190, &FractalLevels::default()).len(),
            1
        );
    }

    #[test]
    fn test_detected_points_dominate_neighbors() {
        // Deterministic wiggly series with plenty of local extremes
        let candles: Vec<Candle> = (0..300)
            .map(|i| {
                let x = i as f64;
                let mid = 100.0 + 2.0 * (x * 0.21).sin();
                let half_range = 1.0 + 2.5 * (x * 0.9).sin().abs();
                candle(i, mid, mid + half_range, mid - half_range)
            })
            .collect();

        let points = detect_dual_fractals(&candles, 144, &FractalLevels::default());
        assert!(!points.is_empty());

        for point in points {
            let i = point.index;
            assert!(i >= candles.len() - 144 && i < candles.len() - 2);
            for j in [i - 2, i - 1, i + 1, i + 2] {
                assert!(candles[i].high > candles[j].high);
                assert!(candles[i].low < candles[j].low);
            }
        }
    }

    #[test]
    fn test_volatility_filter() {
        let point = FractalPoint::from_candle(
            0,
            &candle(0, 100.0, 100.3, 100.0),
            &FractalLevels::default(),
        );

        assert!(!point.passes_volatility(0.4));
        assert!(point.passes_volatility(0.2));

        let degenerate =
            FractalPoint::from_candle(0, &candle(0, 0.0, 1.0, 0.5), &FractalLevels::default());
        assert!(!degenerate.passes_volatility(0.4));
    }
}
