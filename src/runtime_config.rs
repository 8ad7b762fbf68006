// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the trading engine. Every tunable parameter
// lives here so the engine can be reconfigured at runtime without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default = "...")]` so that adding new
// fields never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants;
use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_symbols() -> Vec<String> {
    vec!["R_100".to_string(), "R_75".to_string(), "R_50".to_string()]
}

fn default_app_id() -> String {
    constants::DEFAULT_APP_ID.to_string()
}

fn default_max_concurrent_positions() -> u32 {
    1
}

fn default_max_daily_loss_pct() -> f64 {
    10.0
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_max_trades_per_day() -> u32 {
    200
}

fn default_base_stake() -> f64 {
    1.0
}

fn default_martingale_multiplier() -> f64 {
    constants::MARTINGALE_MULTIPLIER
}

fn default_max_martingale_level() -> u32 {
    constants::MAX_MARTINGALE_LEVEL
}

fn default_min_confidence_threshold() -> f64 {
    constants::MIN_CONFIDENCE_THRESHOLD
}

fn default_confluence_floor() -> f64 {
    constants::CONFLUENCE_FLOOR
}

fn default_same_side_cooldown_secs() -> u64 {
    constants::SAME_SIDE_COOLDOWN_SECS
}

fn default_contract_duration() -> u32 {
    5
}

fn default_risk_mode() -> String {
    "high_probability".to_string()
}

// =============================================================================
// StrategyParams
// =============================================================================

/// Tunable parameters for the prediction voting and signal synthesis stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Minimum blended confidence required to act on a signal.
    #[serde(default = "default_min_confidence_threshold")]
    pub min_confidence_threshold: f64,

    /// Minimum confluence score (0-100) required to act on a signal.
    #[serde(default = "default_confluence_floor")]
    pub confluence_floor: f64,

    /// Minimum seconds between two signals on the same symbol and side.
    #[serde(default = "default_same_side_cooldown_secs")]
    pub same_side_cooldown_secs: u64,

    /// Whether an EXTREME volatility-zone classification hard-blocks new
    /// trades outright rather than merely soft-adjusting confidence.
    #[serde(default = "default_false")]
    pub extreme_volatility_blocks_trading: bool,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            min_confidence_threshold: default_min_confidence_threshold(),
            confluence_floor: default_confluence_floor(),
            same_side_cooldown_secs: default_same_side_cooldown_secs(),
            extreme_volatility_blocks_trading: constants::EXTREME_VOLATILITY_BLOCKS_TRADING,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Operational modes ---------------------------------------------------
    #[serde(default)]
    pub trading_mode: TradingMode,

    #[serde(default)]
    pub account_mode: AccountMode,

    // --- Connection ------------------------------------------------------------
    #[serde(default = "default_app_id")]
    pub app_id: String,

    // --- Symbols & limits ---------------------------------------------------
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,

    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,

    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,

    // --- Trade sizing --------------------------------------------------------
    #[serde(default = "default_base_stake")]
    pub base_stake: f64,

    #[serde(default = "default_martingale_multiplier")]
    pub martingale_multiplier: f64,

    #[serde(default = "default_max_martingale_level")]
    pub max_martingale_level: u32,

    #[serde(default = "default_contract_duration")]
    pub contract_duration: u32,

    /// Risk-mode used by the Entry Filter: "low_risk" | "high_probability" | "aggressive" | "sniper".
    #[serde(default = "default_risk_mode")]
    pub risk_mode: String,

    // --- Strategy parameters ------------------------------------------------
    #[serde(default)]
    pub strategy_params: StrategyParams,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            app_id: default_app_id(),
            symbols: default_symbols(),
            max_concurrent_positions: default_max_concurrent_positions(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            max_trades_per_day: default_max_trades_per_day(),
            base_stake: default_base_stake(),
            martingale_multiplier: default_martingale_multiplier(),
            max_martingale_level: default_max_martingale_level(),
            contract_duration: default_contract_duration(),
            risk_mode: default_risk_mode(),
            strategy_params: StrategyParams::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Load from `path`, falling back to defaults with a warning if the file
    /// is missing or unparsable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load runtime config, using defaults");
            Self::default()
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert_eq!(cfg.symbols, vec!["R_100", "R_75", "R_50"]);
        assert_eq!(cfg.max_concurrent_positions, 1);
        assert_eq!(cfg.max_martingale_level, 5);
        assert!(!cfg.strategy_params.extreme_volatility_blocks_trading);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert_eq!(cfg.max_consecutive_losses, 5);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "symbols": ["R_10"] }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.symbols, vec!["R_10"]);
        assert_eq!(cfg.max_concurrent_positions, 1);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.max_concurrent_positions, cfg2.max_concurrent_positions);
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
    }

    #[test]
    fn enum_mode_assignment_compatible() {
        let mut cfg = RuntimeConfig::default();
        cfg.trading_mode = TradingMode::Paused;
        cfg.account_mode = AccountMode::Demo;
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
    }
}
