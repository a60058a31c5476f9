/// Average Directional Index (ADX) - Measures trend strength
///
/// ADX ranges from 0 to 100:
/// - ADX > 25: Strong trend (bull or bear)
/// - ADX 20-25: Moderate trend
/// - ADX < 20: Weak trend / choppy / ranging market
///
/// Also returns +DI and -DI to determine trend direction:
/// - +DI > -DI: Uptrend
/// - -DI > +DI: Downtrend
///
/// Smoothing follows Wilder: TR and ±DM are seeded with a simple average of the
/// first `period` values, DX is averaged the same way to seed ADX, so the first
/// defined ADX sits at index `2 * period - 1`.

use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
struct DirectionalPoint {
    adx: f64,
    plus_di: f64,
    minus_di: f64,
}

/// ADX value for every candle, `None` where it is not yet defined
///
/// The returned vector always has the same length as `candles`.
pub fn calculate_adx_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    directional_series(candles, period)
        .into_iter()
        .map(|p| p.map(|p| p.adx))
        .collect()
}

/// Calculate ADX, +DI, and -DI for the latest candle
///
/// Returns (adx, plus_di, minus_di) or None if insufficient data
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<(f64, f64, f64)> {
    directional_series(candles, period)
        .last()
        .copied()
        .flatten()
        .map(|p| (p.adx, p.plus_di, p.minus_di))
}

fn directional_series(candles: &[Candle], period: usize) -> Vec<Option<DirectionalPoint>> {
    let n = candles.len();
    let mut out = vec![None; n];

    if period == 0 || n < 2 * period {
        return out;
    }

    // Step 1: True Range (TR) and Directional Movement (+DM, -DM); index 0 has no predecessor
    let mut true_ranges = vec![0.0; n];
    let mut plus_dms = vec![0.0; n];
    let mut minus_dms = vec![0.0; n];

    for i in 1..n {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;

        // True Range = max(high - low, abs(high - prev_close), abs(low - prev_close))
        true_ranges[i] = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        if up_move > down_move && up_move > 0.0 {
            plus_dms[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dms[i] = down_move;
        }
    }

    // Step 2: Wilder smoothing, seeded at index `period`
    let p = period as f64;
    let mut smoothed_tr = true_ranges[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_plus = plus_dms[1..=period].iter().sum::<f64>() / p;
    let mut smoothed_minus = minus_dms[1..=period].iter().sum::<f64>() / p;

    let mut dx_seed = Vec::with_capacity(period);
    let mut adx: Option<f64> = None;

    for i in period..n {
        if i > period {
            smoothed_tr = (smoothed_tr * (p - 1.0) + true_ranges[i]) / p;
            smoothed_plus = (smoothed_plus * (p - 1.0) + plus_dms[i]) / p;
            smoothed_minus = (smoothed_minus * (p - 1.0) + minus_dms[i]) / p;
        }

        // Step 3: +DI and -DI
        let (plus_di, minus_di) = if smoothed_tr > 0.0 {
            (
                smoothed_plus / smoothed_tr * 100.0,
                smoothed_minus / smoothed_tr * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        // Step 4: DX
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            (plus_di - minus_di).abs() / di_sum * 100.0
        } else {
            0.0
        };

        // Step 5: ADX is the Wilder average of DX
        adx = match adx {
            Some(prev) => Some((prev * (p - 1.0) + dx) / p),
            None => {
                dx_seed.push(dx);
                if dx_seed.len() == period {
                    Some(dx_seed.iter().sum::<f64>() / p)
                } else {
                    None
                }
            }
        };

        if let Some(adx) = adx {
            if adx.is_finite() {
                out[i] = Some(DirectionalPoint {
                    adx,
                    plus_di,
                    minus_di,
                });
            }
        }
    }

    out
}
