use super::{timestamp, write_atomic};
use crate::error::BotError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Equity baseline that drawdown is measured against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBalance {
    pub reference_balance: f64,
    #[serde(with = "timestamp::required")]
    pub last_update: DateTime<Utc>,
}

impl ReferenceBalance {
    pub fn hours_since_update(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_update).num_milliseconds() as f64 / 3_600_000.0
    }

    /// A rebase is due once `interval_hours` have elapsed; exactly on the boundary counts
    pub fn is_rebase_due(&self, now: DateTime<Utc>, interval_hours: f64) -> bool {
        self.hours_since_update(now) >= interval_hours
    }

    pub fn hours_until_rebase(&self, now: DateTime<Utc>, interval_hours: f64) -> f64 {
        (interval_hours - self.hours_since_update(now)).max(0.0)
    }
}

/// JSON document holding the [`ReferenceBalance`]
#[derive(Debug, Clone)]
pub struct ReferenceBalanceStore {
    path: PathBuf,
}

impl ReferenceBalanceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no document has been written yet
    pub fn load(&self) -> Result<Option<ReferenceBalance>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            BotError::state(format!(
                "{} is not a valid reference balance document: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Load the reference, writing `initial` as the seed on first use
    pub fn load_or_seed(&self, initial: f64, now: DateTime<Utc>) -> Result<ReferenceBalance> {
        match self.load()? {
            Some(reference) => Ok(reference),
            None => {
                tracing::info!(
                    "No reference balance at {}, seeding with {:.2}",
                    self.path.display(),
                    initial
                );
                self.save(initial, now)
            }
        }
    }

    /// Overwrite the reference with `value`, stamped at `now`
    pub fn save(&self, value: f64, now: DateTime<Utc>) -> Result<ReferenceBalance> {
        let reference = ReferenceBalance {
            reference_balance: value,
            last_update: now,
        };
        let json = serde_json::to_string_pretty(&reference)?;
        write_atomic(&self.path, json.as_bytes())?;
        Ok(reference)
    }
}
