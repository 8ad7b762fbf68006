// =============================================================================
// Session recovery — atomic JSON snapshot, restored on a fresh `start`
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{MAX_MARTINGALE_LEVEL, SESSION_RECOVERY_MAX_AGE_SECS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecoveryRecord {
    pub symbol: String,
    pub base_stake: f64,
    pub current_stake: f64,
    pub duration: u32,
    pub target_trades: u32,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub martingale_level: u32,
    pub consecutive_losses: u32,
    pub daily_pnl: f64,
    /// Unix millis at save time.
    pub saved_at_ms: i64,
}

impl SessionRecoveryRecord {
    /// `wins + losses == total`, stake above zero, martingale level in bounds,
    /// and the record isn't stale. A failing record is treated as corrupt.
    pub fn is_consistent(&self, min_stake: f64, now_ms: i64) -> bool {
        let age_secs = (now_ms - self.saved_at_ms) / 1000;
        self.wins + self.losses == self.total_trades
            && self.current_stake >= min_stake
            && self.martingale_level <= MAX_MARTINGALE_LEVEL
            && age_secs >= 0
            && age_secs <= SESSION_RECOVERY_MAX_AGE_SECS
    }

    /// Load and validate a recovery record from `path`. Any failure — missing
    /// file, bad JSON, failed consistency check — results in the stale file
    /// being deleted (if present) and `None` returned so the caller starts a
    /// fresh session.
    pub fn load_and_validate(path: impl AsRef<Path>, min_stake: f64) -> Option<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).ok()?;

        let record: Self = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "recovery record unparsable, discarding");
                let _ = std::fs::remove_file(path);
                return None;
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        if !record.is_consistent(min_stake, now_ms) {
            warn!(path = %path.display(), "recovery record failed integrity check, discarding");
            let _ = std::fs::remove_file(path);
            return None;
        }

        info!(symbol = %record.symbol, total_trades = record.total_trades, "session recovery record restored");
        Some(record)
    }

    /// Atomic temp-write + rename, matching `RuntimeConfig::save`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("serialise recovery record")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("write tmp recovery record to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("rename tmp recovery record to {}", path.display()))?;
        Ok(())
    }

    pub fn clear(path: impl AsRef<Path>) {
        let _ = std::fs::remove_file(path.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(saved_at_ms: i64) -> SessionRecoveryRecord {
        SessionRecoveryRecord {
            symbol: "R_100".to_string(),
            base_stake: 1.0,
            current_stake: 1.0,
            duration: 5,
            target_trades: 0,
            total_trades: 10,
            wins: 6,
            losses: 4,
            martingale_level: 0,
            consecutive_losses: 0,
            daily_pnl: 3.5,
            saved_at_ms,
        }
    }

    #[test]
    fn fresh_record_is_consistent() {
        let now = Utc::now().timestamp_millis();
        assert!(record(now - 1_000).is_consistent(0.5, now));
    }

    #[test]
    fn stale_record_fails_consistency() {
        let now = Utc::now().timestamp_millis();
        let stale = record(now - (SESSION_RECOVERY_MAX_AGE_SECS + 60) * 1000);
        assert!(!stale.is_consistent(0.5, now));
    }

    #[test]
    fn mismatched_win_loss_total_fails_consistency() {
        let now = Utc::now().timestamp_millis();
        let mut r = record(now);
        r.total_trades = 999;
        assert!(!r.is_consistent(0.5, now));
    }

    #[test]
    fn martingale_level_beyond_max_fails_consistency() {
        let now = Utc::now().timestamp_millis();
        let mut r = record(now);
        r.martingale_level = MAX_MARTINGALE_LEVEL + 1;
        assert!(!r.is_consistent(0.5, now));
    }

    #[test]
    fn load_missing_file_returns_none() {
        assert!(SessionRecoveryRecord::load_and_validate("/nonexistent/path/recovery.json", 0.5).is_none());
    }
}
