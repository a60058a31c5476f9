use crate::error::BotError;
use crate::indicators::FractalLevels;
use crate::Result;
use config::{Config, ConfigError, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/fractalbot.toml";
const ENV_PREFIX: &str = "FRACTALBOT";

/// Process-wide settings, built once at startup and passed down by reference
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub storage: StorageConfig,
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub alerts: AlertConfig,
    #[serde(default = "default_symbols")]
    pub symbols: BTreeMap<String, SymbolSpec>,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub recv_window_ms: u64,
    pub category: String,
    pub settle_coin: String,
    pub account_type: String,
    pub timeout_secs: u64,
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub positions_path: PathBuf,
    pub balance_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub leverage: u32,
    /// Carried for operators; order sizing does not read it
    pub risk_pct: f64,
    pub interval_minutes: u32,
    pub candle_limit: usize,
    pub fractal_lookback: usize,
    pub adx_period: usize,
    pub trigger_multiplier: f64,
    pub target_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Fraction of the reference balance that may be lost before liquidation
    pub max_loss_fraction: f64,
    pub balance_update_hours: f64,
    /// Seed for the reference balance when no document exists yet
    pub initial_balance: f64,
    pub emergency_close_attempts: u32,
    pub emergency_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub trade_webhook: Option<String>,
    pub status_webhook: Option<String>,
    pub error_webhook: Option<String>,
    pub footer: String,
}

/// Per-symbol trading parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SymbolSpec {
    /// Entries only fire while ADX is at or below this value
    pub adx_ceiling: f64,
    /// Fractals with a smaller range (% of open) are ignored
    pub min_volatility_pct: f64,
    pub min_lot: Decimal,
    pub tick_size: Decimal,
    /// Holding limit measured in entry-interval bars
    pub max_holding_bars: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            storage: StorageConfig::default(),
            trading: TradingConfig::default(),
            risk: RiskConfig::default(),
            alerts: AlertConfig::default(),
            symbols: default_symbols(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bybit.com".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: 5000,
            category: "linear".to_string(),
            settle_coin: "USDT".to_string(),
            account_type: "UNIFIED".to_string(),
            timeout_secs: 10,
            requests_per_second: 10,
        }
    }
}

// Keep the secret out of logs
impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &mask(&self.api_secret))
            .field("recv_window_ms", &self.recv_window_ms)
            .field("category", &self.category)
            .field("settle_coin", &self.settle_coin)
            .field("account_type", &self.account_type)
            .field("timeout_secs", &self.timeout_secs)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

fn mask(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            positions_path: PathBuf::from("position_status.json"),
            balance_path: PathBuf::from("balance_reference.json"),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: 20,
            risk_pct: 0.07,
            interval_minutes: 15,
            candle_limit: 500,
            fractal_lookback: 144,
            adx_period: 14,
            trigger_multiplier: 4.236,
            target_multiplier: 1.5,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_loss_fraction: 0.7,
            balance_update_hours: 24.0,
            initial_balance: 30.0,
            emergency_close_attempts: 3,
            emergency_backoff_secs: 2,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            trade_webhook: None,
            status_webhook: None,
            error_webhook: None,
            footer: "powered by fractalbot".to_string(),
        }
    }
}

fn default_symbols() -> BTreeMap<String, SymbolSpec> {
    // (symbol, adx ceiling, min volatility %, min lot, tick size, max holding bars)
    let table = [
        ("BTCUSDT", 24.0, 0.4, Decimal::new(1, 3), Decimal::new(1, 1), 1312),
        ("ETHUSDT", 22.0, 1.4, Decimal::new(1, 2), Decimal::new(1, 2), 608),
        ("SUIUSDT", 28.0, 1.4, Decimal::new(10, 0), Decimal::new(1, 4), 968),
        ("SOLUSDT", 21.0, 1.3, Decimal::new(1, 1), Decimal::new(1, 2), 968),
    ];

    table
        .into_iter()
        .map(|(symbol, adx_ceiling, min_volatility_pct, min_lot, tick_size, bars)| {
            (
                symbol.to_string(),
                SymbolSpec {
                    adx_ceiling,
                    min_volatility_pct,
                    min_lot,
                    tick_size,
                    max_holding_bars: bars,
                },
            )
        })
        .collect()
}

impl TradingConfig {
    pub fn bars_per_hour(&self) -> f64 {
        60.0 / self.interval_minutes as f64
    }

    pub fn fractal_levels(&self) -> FractalLevels {
        FractalLevels {
            trigger_multiplier: self.trigger_multiplier,
            target_multiplier: self.target_multiplier,
        }
    }
}

impl AppConfig {
    /// Load settings from `.env`, the TOML file and `FRACTALBOT__*` variables
    ///
    /// A missing file is fine; everything has a default except credentials.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FRACTALBOT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let settings = Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        let config = config.normalized();
        config.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());

        Ok(config)
    }

    /// Symbol keys are matched upper-case regardless of how they were written
    fn normalized(mut self) -> Self {
        self.symbols = self
            .symbols
            .into_iter()
            .map(|(symbol, spec)| (symbol.to_uppercase(), spec))
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| BotError::Config(ConfigError::Message(msg));

        if self.symbols.is_empty() {
            return Err(invalid("no symbols configured".to_string()));
        }
        for (symbol, spec) in &self.symbols {
            if spec.min_lot <= Decimal::ZERO {
                return Err(invalid(format!("{}: min_lot must be positive", symbol)));
            }
            if spec.tick_size <= Decimal::ZERO {
                return Err(invalid(format!("{}: tick_size must be positive", symbol)));
            }
            if spec.max_holding_bars == 0 {
                return Err(invalid(format!("{}: max_holding_bars must be positive", symbol)));
            }
        }
        if self.trading.interval_minutes == 0 || self.trading.interval_minutes > 60 {
            return Err(invalid("trading.interval_minutes must be in 1..=60".to_string()));
        }
        if self.trading.leverage == 0 {
            return Err(invalid("trading.leverage must be positive".to_string()));
        }
        if self.trading.adx_period == 0 {
            return Err(invalid("trading.adx_period must be positive".to_string()));
        }
        if !(self.risk.max_loss_fraction > 0.0 && self.risk.max_loss_fraction <= 1.0) {
            return Err(invalid("risk.max_loss_fraction must be in (0, 1]".to_string()));
        }
        if self.risk.emergency_close_attempts == 0 {
            return Err(invalid("risk.emergency_close_attempts must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Reject running against the exchange without credentials
    pub fn require_credentials(&self) -> Result<()> {
        if self.exchange.api_key.is_empty() || self.exchange.api_secret.is_empty() {
            return Err(BotError::Config(ConfigError::Message(
                "exchange.api_key and exchange.api_secret are required".to_string(),
            )));
        }
        Ok(())
    }

    pub fn symbol(&self, symbol: &str) -> Result<&SymbolSpec> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| BotError::data(format!("{} is not a configured symbol", symbol)))
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.symbols.len(), 4);
        assert_eq!(config.trading.bars_per_hour(), 4.0);

        let btc = config.symbol("BTCUSDT").unwrap();
        assert_eq!(btc.tick_size, Decimal::new(1, 1));
        assert_eq!(btc.max_holding_bars, 1312);
    }

    #[test]
    fn test_unknown_symbol_is_data_error() {
        let config = AppConfig::default();
        assert!(matches!(config.symbol("DOGEUSDT"), Err(BotError::Data(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[risk]
max_loss_fraction = 0.5

[trading]
leverage = 10

[symbols.XRPUSDT]
adx_ceiling = 25.0
min_volatility_pct = 1.0
min_lot = 1
tick_size = 0.0001
max_holding_bars = 400
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.risk.max_loss_fraction, 0.5);
        assert_eq!(config.risk.balance_update_hours, 24.0);
        assert_eq!(config.trading.leverage, 10);
        assert_eq!(config.symbol_names(), vec!["XRPUSDT".to_string()]);
        assert_eq!(
            config.symbol("XRPUSDT").unwrap().tick_size,
            Decimal::new(1, 4)
        );
    }

    #[test]
    fn test_rejects_bad_loss_fraction() {
        let mut config = AppConfig::default();
        config.risk.max_loss_fraction = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = AppConfig::default();
        config.exchange.api_secret = "super-secret".to_string();

        let rendered = format!("{:?}", config.exchange);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
