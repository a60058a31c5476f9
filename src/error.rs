use thiserror::Error;

/// Failures the trading pipelines can hit.
///
/// Benign skips (symbol already in a trade, no signal) are not errors; they
/// travel as [`crate::execution::SkipReason`] values instead.
#[derive(Debug, Error)]
pub enum BotError {
    /// Network fault or timeout talking to the exchange or a webhook.
    #[error("transport error: {0}")]
    Transport(String),

    /// The exchange answered with a non-zero result code.
    #[error("exchange rejected request (retCode {code}): {message}")]
    Api { code: i64, message: String },

    /// Malformed, empty or otherwise unusable market data.
    #[error("data error: {0}")]
    Data(String),

    /// A persisted document could not be understood.
    #[error("state error: {0}")]
    State(String),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Transport(format!("request timed out: {}", err))
        } else {
            BotError::Transport(err.to_string())
        }
    }
}

impl BotError {
    pub fn data(msg: impl Into<String>) -> Self {
        BotError::Data(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        BotError::State(msg.into())
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, BotError::Transport(_))
    }
}
