pub mod bybit;

pub use bybit::BybitClient;

use crate::models::{Candle, ExchangePosition, OrderRequest};
use crate::Result;
use async_trait::async_trait;

/// Everything the pipelines need from the derivatives exchange
///
/// Implementations own transport and authentication. Order responses are
/// handed back raw so the order gateway decides what counts as success.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Up to `limit` candles of `interval_minutes`, in whatever order the venue returns them
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Wallet balance of the settlement coin
    async fn wallet_balance(&self) -> Result<f64>;

    /// Every position with a nonzero size
    async fn open_positions(&self) -> Result<Vec<ExchangePosition>>;

    /// Submit a market order and return the response body unparsed
    async fn place_order(&self, order: &OrderRequest) -> Result<String>;
}
