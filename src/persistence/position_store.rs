use super::{quarantine_path, timestamp, write_atomic};
use crate::error::BotError;
use crate::models::{Side, TradeIntent};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Open positions keyed by symbol
pub type Positions = BTreeMap<String, PositionRecord>;

/// What this system believes is open for one symbol
///
/// Written when the entry order is accepted (not when it fills) and never
/// mutated afterwards; it is only ever deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub qty: Decimal,
    pub entry_price: f64,
    /// Take-profit level the entry order carried
    pub exit_price: Decimal,
    /// Older documents key this as `timestamp`
    #[serde(default, alias = "timestamp", with = "timestamp::lenient")]
    pub opened_at: Option<DateTime<Utc>>,
    /// Side of the order that closes this position
    pub side: Side,
}

impl PositionRecord {
    pub fn from_intent(intent: &TradeIntent, opened_at: DateTime<Utc>) -> Self {
        Self {
            qty: intent.quantity,
            entry_price: intent.entry_price,
            exit_price: intent.take_profit,
            opened_at: Some(opened_at),
            side: intent.direction.closing_side(),
        }
    }
}

/// Symbol-keyed map of open positions persisted as a single JSON document
///
/// Every mutation re-reads the file right before rewriting it, which keeps the
/// window for lost updates between overlapping batches small but not closed.
#[derive(Debug, Clone)]
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document
    ///
    /// A missing or blank file is an empty map; unparsable JSON is a state error.
    pub fn load(&self) -> Result<Positions> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Positions::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            tracing::debug!("{} is empty", self.path.display());
            return Ok(Positions::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            BotError::state(format!(
                "{} is not a valid position document: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Every open record; a corrupt document counts as no open positions
    pub fn list(&self) -> Positions {
        self.load().unwrap_or_else(|e| {
            tracing::warn!("Treating position store as empty: {}", e);
            Positions::new()
        })
    }

    pub fn get(&self, symbol: &str) -> Option<PositionRecord> {
        self.list().remove(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.list().contains_key(symbol)
    }

    pub fn put(&self, symbol: &str, record: PositionRecord) -> Result<()> {
        let mut positions = self.load_for_update()?;
        positions.insert(symbol.to_string(), record);
        self.save(&positions)?;

        tracing::debug!("Stored position record for {}", symbol);
        Ok(())
    }

    pub fn delete(&self, symbol: &str) -> Result<Option<PositionRecord>> {
        let mut positions = self.load_for_update()?;
        let removed = positions.remove(symbol);

        if removed.is_some() {
            self.save(&positions)?;
            tracing::debug!("Removed position record for {}", symbol);
        }

        Ok(removed)
    }

    /// Remove several symbols with a single rewrite, returning the ones that were present
    pub fn delete_many(&self, symbols: &[String]) -> Result<Vec<String>> {
        let mut positions = self.load_for_update()?;
        let removed: Vec<String> = symbols
            .iter()
            .filter(|symbol| positions.remove(symbol.as_str()).is_some())
            .cloned()
            .collect();

        if !removed.is_empty() {
            self.save(&positions)?;
        }

        Ok(removed)
    }

    /// Rewrite the whole document
    pub fn save(&self, positions: &Positions) -> Result<()> {
        let json = serde_json::to_string_pretty(positions)?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Load for a read-modify-write, moving a corrupt document aside first
    fn load_for_update(&self) -> Result<Positions> {
        match self.load() {
            Ok(positions) => Ok(positions),
            Err(BotError::State(msg)) => {
                let quarantine = quarantine_path(&self.path);
                tracing::warn!(
                    "{}; moving it to {} and starting empty",
                    msg,
                    quarantine.display()
                );
                fs::rename(&self.path, &quarantine)?;
                Ok(Positions::new())
            }
            Err(e) => Err(e),
        }
    }
}
