use super::Exchange;
use crate::config::ExchangeConfig;
use crate::error::BotError;
use crate::models::{Candle, ExchangePosition, OrderRequest, Side};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::ConfigError;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Bybit v5 REST client
///
/// Cloneable; clones share the HTTP connection pool and the rate limiter.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    category: String,
    settle_coin: String,
    account_type: String,
    rate_limiter: Arc<BybitRateLimiter>,
}

/// Common v5 response wrapper
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

/// `/v5/market/kline` row: [startTime, open, high, low, close, volume, turnover]
type KlineRow = Vec<String>;

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<WalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    symbol: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    unrealised_pnl: String,
}

impl BybitClient {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
            category: config.category.clone(),
            settle_coin: config.settle_coin.clone(),
            account_type: config.account_type.clone(),
            rate_limiter,
        })
    }

    /// Point the client somewhere else (testnet, a local mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// hex(HMAC_SHA256(secret, timestamp + api_key + recv_window + payload))
    fn sign(&self, timestamp: &str, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).map_err(|e| {
            BotError::Config(ConfigError::Message(format!("invalid API secret: {}", e)))
        })?;
        mac.update(timestamp.as_bytes());
        mac.update(self.api_key.as_bytes());
        mac.update(self.recv_window_ms.to_string().as_bytes());
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_request(
        &self,
        request: reqwest::RequestBuilder,
        payload: &str,
    ) -> Result<reqwest::RequestBuilder> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, payload)?;

        Ok(request
            .header("X-BAPI-API-KEY", &self.api_key)
            .header("X-BAPI-TIMESTAMP", timestamp)
            .header("X-BAPI-RECV-WINDOW", self.recv_window_ms.to_string())
            .header("X-BAPI-SIGN", signature))
    }

    /// GET `path` and unwrap the v5 envelope; `signed` adds the auth headers
    async fn get<T>(&self, path: &str, query: &[(&str, String)], signed: bool) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        // Signed payload must be byte-identical to the query string sent
        let query_string = query
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}{}?{}", self.base_url, path, query_string);

        self.rate_limiter.until_ready().await;

        let mut request = self.client.get(&url);
        if signed {
            request = self.signed_request(request, &query_string)?;
        }

        let body = request.send().await?.text().await?;
        if body.trim().is_empty() {
            return Err(BotError::data(format!("empty response from {}", path)));
        }

        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| BotError::data(format!("malformed response from {}: {}", path, e)))?;

        if envelope.ret_code != 0 {
            return Err(BotError::Api {
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| BotError::data(format!("unexpected result shape from {}: {}", path, e)))
    }

    fn order_body(&self, order: &OrderRequest) -> Value {
        let mut body = Map::new();
        body.insert("category".into(), json!(self.category));
        body.insert("symbol".into(), json!(order.symbol));
        body.insert("side".into(), json!(order.side.as_str()));
        body.insert("orderType".into(), json!("Market"));
        body.insert("qty".into(), json!(order.qty.to_string()));
        if let Some(take_profit) = order.take_profit {
            body.insert("takeProfit".into(), json!(take_profit.to_string()));
        }
        if order.reduce_only {
            body.insert("reduceOnly".into(), json!(true));
        }
        body.insert("orderLinkId".into(), json!(order.order_link_id));
        Value::Object(body)
    }
}

/// Numbers arrive as strings; anything unparsable becomes NaN and is dropped later
fn parse_number(raw: &str) -> f64 {
    raw.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_kline(row: &[String]) -> Option<Candle> {
    if row.len() < 6 {
        return None;
    }
    let start_ms = row[0].parse::<i64>().ok()?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(start_ms)?;

    Some(Candle {
        timestamp,
        open: parse_number(&row[1]),
        high: parse_number(&row[2]),
        low: parse_number(&row[3]),
        close: parse_number(&row[4]),
        volume: parse_number(&row[5]),
    })
}

fn parse_position(row: PositionRow) -> Option<ExchangePosition> {
    let size = Decimal::from_str(&row.size).ok()?;
    if size <= Decimal::ZERO {
        return None;
    }

    let side = match Side::parse(&row.side) {
        Some(side) => side,
        None => {
            tracing::warn!("{}: nonzero size {} with side {:?}", row.symbol, size, row.side);
            return None;
        }
    };

    Some(ExchangePosition {
        symbol: row.symbol,
        side,
        size,
        unrealised_pnl: row.unrealised_pnl.parse::<f64>().unwrap_or(0.0),
    })
}

#[async_trait]
impl Exchange for BybitClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval_minutes: u32,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let query = [
            ("category", self.category.clone()),
            ("symbol", symbol.to_string()),
            ("interval", interval_minutes.to_string()),
            ("limit", limit.to_string()),
        ];

        let result: ListResult<KlineRow> = self.get("/v5/market/kline", &query, false).await?;
        let total = result.list.len();
        let candles: Vec<Candle> = result.list.iter().filter_map(|row| parse_kline(row)).collect();

        if candles.len() < total {
            tracing::warn!(
                "{}: skipped {} unreadable kline rows",
                symbol,
                total - candles.len()
            );
        }
        tracing::debug!("{}: fetched {} candles", symbol, candles.len());

        Ok(candles)
    }

    async fn wallet_balance(&self) -> Result<f64> {
        let query = [("accountType", self.account_type.clone())];
        let result: ListResult<WalletAccount> =
            self.get("/v5/account/wallet-balance", &query, true).await?;

        let coin = result
            .list
            .iter()
            .flat_map(|account| account.coin.iter())
            .find(|coin| coin.coin == self.settle_coin)
            .ok_or_else(|| {
                BotError::data(format!("no {} entry in wallet balance", self.settle_coin))
            })?;

        coin.wallet_balance.parse::<f64>().map_err(|_| {
            BotError::data(format!(
                "unreadable {} wallet balance {:?}",
                self.settle_coin, coin.wallet_balance
            ))
        })
    }

    async fn open_positions(&self) -> Result<Vec<ExchangePosition>> {
        let query = [
            ("category", self.category.clone()),
            ("settleCoin", self.settle_coin.clone()),
        ];
        let result: ListResult<PositionRow> = self.get("/v5/position/list", &query, true).await?;

        Ok(result.list.into_iter().filter_map(parse_position).collect())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let payload = self.order_body(order).to_string();
        let url = format!("{}/v5/order/create", self.base_url);

        self.rate_limiter.until_ready().await;

        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        let response = self
            .signed_request(request, &payload)?
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!("{}: order endpoint answered HTTP {}", order.symbol, status);
        }

        Ok(body)
    }
}
