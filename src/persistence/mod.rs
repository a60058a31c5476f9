// File-backed state shared by the independently scheduled batches
//
// Both documents are small JSON files rewritten wholesale. Writes go to a
// sibling `.tmp` file that is renamed over the target, so a reader never sees a
// torn document. There is no lock: two batches that mutate the same file
// concurrently can still lose one update.

pub mod position_store;
pub mod reference_balance;
mod timestamp;

pub use position_store::{PositionRecord, PositionStore, Positions};
pub use reference_balance::{ReferenceBalance, ReferenceBalanceStore};

use crate::error::BotError;
use crate::Result;
use chrono::Utc;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `path` with `suffix` appended to the full file name (`a.json` -> `a.json.tmp`)
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Unused `<path>.corrupt.<timestamp>` name for moving a bad document aside
pub(crate) fn quarantine_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f").to_string();
    let candidate = sibling(path, &format!(".corrupt.{}", stamp));
    if !candidate.exists() {
        return candidate;
    }

    (1u32..)
        .map(|n| sibling(path, &format!(".corrupt.{}.{}", stamp, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Replace the file at `path` with `contents` via write-to-temp + rename
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling(path, ".tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(&tmp_path);
        BotError::from(e)
    })
}
