// =============================================================================
// Trade journal — CSV append-only trade log
// =============================================================================
//
// Every row is appended by rewriting the whole file to a temp path and
// renaming it over the original, the same pattern `RuntimeConfig` and the
// session recovery record use: a crash between the temp write and the
// rename leaves either the old file intact or the new file with exactly one
// additional row, never a half-written one. A missing or corrupt header is
// repaired on the next append rather than failing the write. Once the file
// grows past a size threshold, it is rotated to a timestamped backup and a
// fresh file started.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::constants::JOURNAL_MAX_SIZE_BYTES;

#[derive(Debug, Clone, Serialize)]
pub struct JournalRow {
    pub trade_id: String,
    pub symbol: String,
    pub direction: String,
    pub stake: f64,
    pub martingale_level: u32,
    pub result: String,
    pub profit: f64,
    pub opened_at: String,
    pub closed_at: String,
}

pub struct Journal {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Append a row, rotating to a backup first if the file has grown past
    /// `JOURNAL_MAX_SIZE_BYTES`.
    pub fn append(&self, row: &JournalRow) -> Result<()> {
        let _guard = self.lock.lock();

        if let Ok(metadata) = std::fs::metadata(&self.path) {
            if metadata.len() > JOURNAL_MAX_SIZE_BYTES {
                self.rotate()?;
            }
        }

        let existing = std::fs::read(&self.path).unwrap_or_default();
        let needs_header = !existing.starts_with(Self::header_bytes().as_slice());
        if needs_header && !existing.is_empty() {
            warn!(path = %self.path.display(), "journal header missing or corrupt, repairing");
        }

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
        if needs_header {
            writer.write_record(Self::header_fields()).context("write journal header")?;
        }
        writer.serialize(row).context("serialise journal row")?;
        let new_bytes = writer.into_inner().context("flush journal row buffer")?;

        let mut content = existing;
        content.extend_from_slice(&new_bytes);

        let tmp_path = self.path.with_extension("csv.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("write tmp journal to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("rename tmp journal to {}", self.path.display()))?;

        Ok(())
    }

    fn rotate(&self) -> Result<()> {
        let backup = self.path.with_extension(format!("csv.{}.bak", Utc::now().timestamp()));
        std::fs::rename(&self.path, &backup)
            .with_context(|| format!("rotate journal to {}", backup.display()))?;
        info!(backup = %backup.display(), "trade journal rotated past size threshold");
        Ok(())
    }

    fn header_fields() -> [&'static str; 9] {
        [
            "trade_id", "symbol", "direction", "stake", "martingale_level", "result", "profit", "opened_at",
            "closed_at",
        ]
    }

    fn header_bytes() -> Vec<u8> {
        format!("{}\n", Self::header_fields().join(",")).into_bytes()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(trade_id: &str) -> JournalRow {
        JournalRow {
            trade_id: trade_id.to_string(),
            symbol: "R_100".to_string(),
            direction: "CALL".to_string(),
            stake: 1.0,
            martingale_level: 0,
            result: "win".to_string(),
            profit: 0.85,
            opened_at: "2026-07-29T00:00:00Z".to_string(),
            closed_at: "2026-07-29T00:00:05Z".to_string(),
        }
    }

    #[test]
    fn append_writes_header_once() {
        let dir = std::env::temp_dir().join(format!("journal_test_{}", Utc::now().timestamp_nanos_opt().unwrap()));
        let journal = Journal::new(&dir);

        journal.append(&row("t1")).unwrap();
        journal.append(&row("t2")).unwrap();

        let content = std::fs::read_to_string(&dir).unwrap();
        assert_eq!(content.matches("trade_id").count(), 1);
        assert_eq!(content.lines().count(), 3);

        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn append_to_missing_file_creates_it_with_header() {
        let dir = std::env::temp_dir().join(format!("journal_test_fresh_{}", Utc::now().timestamp_nanos_opt().unwrap()));
        let journal = Journal::new(&dir);
        journal.append(&row("t1")).unwrap();

        let content = std::fs::read_to_string(&dir).unwrap();
        assert!(content.starts_with("trade_id,symbol"));

        let _ = std::fs::remove_file(&dir);
    }
}
