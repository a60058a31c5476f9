use crate::api::Exchange;
use crate::models::{OrderRequest, OrderResult, Side, TradeIntent};
use crate::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// How many times a close is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt; the next scheduled run is the retry
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn emergency(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Same attempt count without sleeping, for tests
    pub fn without_backoff(self) -> Self {
        Self {
            backoff: Duration::ZERO,
            ..self
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    #[serde(default)]
    result: Option<OrderCreated>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreated {
    #[serde(default)]
    order_id: Option<String>,
}

/// Normalise a raw order-create response
///
/// Success requires a well-formed, non-empty body with a zero result code.
pub fn parse_order_response(body: &str) -> OrderResult {
    if body.trim().is_empty() {
        return OrderResult::failed("empty response");
    }

    match serde_json::from_str::<OrderResponse>(body) {
        Ok(response) => OrderResult {
            success: response.ret_code == 0,
            code: Some(response.ret_code),
            message: response.ret_msg,
            order_id: response.result.and_then(|r| r.order_id).filter(|id| !id.is_empty()),
        },
        Err(e) => OrderResult::failed(format!("malformed response: {}", e)),
    }
}

/// Submits market orders and reports normalised outcomes
#[derive(Clone)]
pub struct OrderGateway {
    exchange: Arc<dyn Exchange>,
}

impl OrderGateway {
    pub fn new(exchange: Arc<dyn Exchange>) -> Self {
        Self { exchange }
    }

    /// Single attempt at opening `intent` with its take-profit attached
    ///
    /// A transport fault comes back as `Err`; an exchange rejection as an
    /// unsuccessful [`OrderResult`].
    pub async fn submit_entry(&self, intent: &TradeIntent) -> Result<OrderResult> {
        let order = OrderRequest::market(&intent.symbol, intent.direction.entry_side(), intent.quantity)
            .with_take_profit(intent.take_profit);

        tracing::info!(
            "{}: submitting {} {} qty {} TP {}",
            order.symbol,
            intent.direction.label(),
            order.side,
            order.qty,
            intent.take_profit
        );

        let body = self.exchange.place_order(&order).await?;
        Ok(parse_order_response(&body))
    }

    /// Close `qty` of `symbol` with a reduce-only market order on `side`
    ///
    /// Transport faults count as failed attempts. The last attempt's result
    /// is returned when every attempt fails.
    pub async fn submit_close(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        policy: &RetryPolicy,
    ) -> OrderResult {
        let mut last = OrderResult::failed("no attempt made");

        for attempt in 1..=policy.max_attempts {
            let order = OrderRequest::market(symbol, side, qty).reduce_only();

            last = match self.exchange.place_order(&order).await {
                Ok(body) => parse_order_response(&body),
                Err(e) => OrderResult::failed(e.to_string()),
            };

            if last.success {
                tracing::info!("{}: close {} {} accepted (attempt {})", symbol, side, qty, attempt);
                return last;
            }

            tracing::warn!(
                "{}: close attempt {}/{} failed: {}",
                symbol,
                attempt,
                policy.max_attempts,
                last.message
            );

            if attempt < policy.max_attempts && !policy.backoff.is_zero() {
                tokio::time::sleep(policy.backoff).await;
            }
        }

        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_code_is_success() {
        let result = parse_order_response(
            r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"1321003749386327552","orderLinkId":"x"}}"#,
        );

        assert!(result.success);
        assert_eq!(result.code, Some(0));
        assert_eq!(result.order_id.as_deref(), Some("1321003749386327552"));
    }

    #[test]
    fn test_nonzero_code_is_failure() {
        let result = parse_order_response(
            r#"{"retCode":110007,"retMsg":"ab not enough for new order","result":{}}"#,
        );

        assert!(!result.success);
        assert_eq!(result.code, Some(110007));
        assert_eq!(result.message, "ab not enough for new order");
        assert_eq!(result.order_id, None);
    }

    #[test]
    fn test_empty_and_malformed_bodies_fail() {
        assert!(!parse_order_response("").success);
        assert!(!parse_order_response("   ").success);

        let malformed = parse_order_response("<html>502 Bad Gateway</html>");
        assert!(!malformed.success);
        assert_eq!(malformed.code, None);
    }

    #[test]
    fn test_retry_policy_constructors() {
        assert_eq!(RetryPolicy::once().max_attempts, 1);

        let emergency = RetryPolicy::emergency(3, Duration::from_secs(2));
        assert_eq!(emergency.max_attempts, 3);
        assert_eq!(emergency.without_backoff().backoff, Duration::ZERO);
        assert_eq!(emergency.without_backoff().max_attempts, 3);

        assert_eq!(RetryPolicy::emergency(0, Duration::ZERO).max_attempts, 1);
    }
}
