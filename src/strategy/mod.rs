// Trading strategy module
pub mod dual_fractal;
pub mod signals;

pub use dual_fractal::DualFractalStrategy;

use crate::models::{Candle, TradeIntent};
use crate::Result;

/// Base trait for all entry strategies
pub trait Strategy: Send + Sync {
    /// Decide whether `symbol` should be entered on the latest completed candle
    ///
    /// `Ok(None)` means no trade; `Err` means the data could not be evaluated.
    fn evaluate(&self, symbol: &str, candles: &[Candle]) -> Result<Option<TradeIntent>>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
