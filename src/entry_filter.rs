// =============================================================================
// Entry Filter — universal confidence/volatility/trend/session guard
// =============================================================================
//
// A stateless scorer wrapping any strategy's `Signal`. Independent of the
// gate chain in `trade_insurance.rs` (which governs whether the *process* may
// trade at all); this governs whether *this particular signal* clears the bar
// for the operator's chosen risk mode.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::constants::{
    ENTRY_FILTER_MIN_CONFIDENCE_AGGRESSIVE, ENTRY_FILTER_MIN_CONFIDENCE_HIGH_PROBABILITY,
    ENTRY_FILTER_MIN_CONFIDENCE_LOW_RISK, ENTRY_FILTER_MIN_CONFIDENCE_SNIPER,
    ENTRY_FILTER_MIN_SCORE_AGGRESSIVE, ENTRY_FILTER_MIN_SCORE_HIGH_PROBABILITY,
    ENTRY_FILTER_MIN_SCORE_LOW_RISK, ENTRY_FILTER_MIN_SCORE_SNIPER, ENTRY_FILTER_WEIGHT_CONFIDENCE,
    ENTRY_FILTER_WEIGHT_SESSION, ENTRY_FILTER_WEIGHT_TREND, ENTRY_FILTER_WEIGHT_VOLATILITY,
};
use crate::strategy::{Signal, VolatilityZone};
use crate::types::Regime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskMode {
    LowRisk,
    HighProbability,
    Aggressive,
    Sniper,
}

impl RiskMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "low_risk" => Self::LowRisk,
            "aggressive" => Self::Aggressive,
            "sniper" => Self::Sniper,
            _ => Self::HighProbability,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowRisk => "low_risk",
            Self::HighProbability => "high_probability",
            Self::Aggressive => "aggressive",
            Self::Sniper => "sniper",
        }
    }

    fn min_score(self) -> f64 {
        match self {
            Self::LowRisk => ENTRY_FILTER_MIN_SCORE_LOW_RISK,
            Self::HighProbability => ENTRY_FILTER_MIN_SCORE_HIGH_PROBABILITY,
            Self::Aggressive => ENTRY_FILTER_MIN_SCORE_AGGRESSIVE,
            Self::Sniper => ENTRY_FILTER_MIN_SCORE_SNIPER,
        }
    }

    fn min_confidence(self) -> f64 {
        match self {
            Self::LowRisk => ENTRY_FILTER_MIN_CONFIDENCE_LOW_RISK,
            Self::HighProbability => ENTRY_FILTER_MIN_CONFIDENCE_HIGH_PROBABILITY,
            Self::Aggressive => ENTRY_FILTER_MIN_CONFIDENCE_AGGRESSIVE,
            Self::Sniper => ENTRY_FILTER_MIN_CONFIDENCE_SNIPER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntryFilterResult {
    pub score: f64,
    pub allowed: bool,
    pub reasons: Vec<String>,
    pub block_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct ModeStats {
    allow_count: u64,
    block_count: u64,
    score_sum: f64,
    block_breakdown: HashMap<String, u64>,
}

/// Rolling per-mode acceptance statistics, plus the stateless scoring
/// function itself.
#[derive(Default)]
pub struct EntryFilter {
    stats: RwLock<HashMap<&'static str, ModeStats>>,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score and gate a signal under `mode`. `trend_required` models whether
    /// the caller demands regime/direction alignment (the pair scanner always
    /// does; a manual override might not). `blocks_extreme_volatility` mirrors
    /// `RuntimeConfig::strategy_params.extreme_volatility_blocks_trading`: when
    /// false, an EXTREME classification only depresses the score via
    /// `volatility_component` rather than hard-blocking the signal.
    pub fn evaluate(
        &self,
        mode: RiskMode,
        signal: &Signal,
        trend_required: bool,
        session_open: bool,
        blocks_extreme_volatility: bool,
    ) -> EntryFilterResult {
        let mut reasons = Vec::new();
        let mut block_reasons = Vec::new();

        let confidence_component = signal.confidence.clamp(0.0, 1.0);
        reasons.push(format!("confidence={:.2}", confidence_component));

        let volatility_component = match signal.volatility_zone {
            VolatilityZone::Normal => 1.0,
            VolatilityZone::High | VolatilityZone::Low => 0.7,
            VolatilityZone::ExtremeHigh | VolatilityZone::ExtremeLow => 0.0,
        };
        if signal.volatility_zone.is_extreme() {
            if blocks_extreme_volatility {
                block_reasons.push("volatility classified EXTREME".to_string());
            } else {
                reasons.push("volatility classified EXTREME (scored, not blocked)".to_string());
            }
        }

        let trend_aligned = matches!(signal.regime, Regime::Trending) || !trend_required;
        let trend_component = if trend_aligned { 1.0 } else { 0.5 };
        if trend_required && !trend_aligned {
            reasons.push("trend not confirmed (non-trending regime)".to_string());
        }

        let session_component = if session_open { 1.0 } else { 0.0 };
        if !session_open {
            block_reasons.push("symbol session closed".to_string());
        }

        let score = 100.0
            * (ENTRY_FILTER_WEIGHT_CONFIDENCE * confidence_component
                + ENTRY_FILTER_WEIGHT_VOLATILITY * volatility_component
                + ENTRY_FILTER_WEIGHT_TREND * trend_component
                + ENTRY_FILTER_WEIGHT_SESSION * session_component);

        if confidence_component < mode.min_confidence() {
            block_reasons.push(format!(
                "confidence {:.2} below {} minimum {:.2}",
                confidence_component,
                mode.as_str(),
                mode.min_confidence()
            ));
        }
        if score < mode.min_score() {
            block_reasons.push(format!("score {:.1} below {} minimum {:.1}", score, mode.as_str(), mode.min_score()));
        }

        let allowed = block_reasons.is_empty();

        let mut stats = self.stats.write();
        let entry = stats.entry(mode.as_str()).or_default();
        entry.score_sum += score;
        if allowed {
            entry.allow_count += 1;
        } else {
            entry.block_count += 1;
            for reason in &block_reasons {
                *entry.block_breakdown.entry(reason.clone()).or_insert(0) += 1;
            }
        }

        EntryFilterResult { score, allowed, reasons, block_reasons }
    }

    pub fn allow_rate(&self, mode: RiskMode) -> f64 {
        let stats = self.stats.read();
        match stats.get(mode.as_str()) {
            Some(s) if s.allow_count + s.block_count > 0 => {
                s.allow_count as f64 / (s.allow_count + s.block_count) as f64
            }
            _ => 0.0,
        }
    }

    pub fn average_score(&self, mode: RiskMode) -> f64 {
        let stats = self.stats.read();
        match stats.get(mode.as_str()) {
            Some(s) if s.allow_count + s.block_count > 0 => s.score_sum / (s.allow_count + s.block_count) as f64,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::IndicatorSnapshot;
    use crate::types::Direction;

    fn base_signal() -> Signal {
        Signal {
            symbol: "R_100".to_string(),
            direction: Direction::Call,
            confidence: 0.85,
            reason: "test".to_string(),
            regime: Regime::Trending,
            adx: 28.0,
            volatility_zone: VolatilityZone::Normal,
            tp_distance: 1.0,
            sl_distance: 0.6,
            confluence_score: 70.0,
            timestamp_ms: 0,
            indicators_snapshot: IndicatorSnapshot::default(),
        }
    }

    #[test]
    fn high_confidence_trending_signal_passes_sniper() {
        let filter = EntryFilter::new();
        let signal = base_signal();
        let result = filter.evaluate(RiskMode::Sniper, &signal, true, true, false);
        assert!(result.allowed, "{:?}", result.block_reasons);
    }

    #[test]
    fn low_confidence_blocks_low_risk_mode() {
        let filter = EntryFilter::new();
        let mut signal = base_signal();
        signal.confidence = 0.5;
        let result = filter.evaluate(RiskMode::LowRisk, &signal, true, true, false);
        assert!(!result.allowed);
    }

    #[test]
    fn extreme_volatility_blocks_when_flag_enabled() {
        let filter = EntryFilter::new();
        let mut signal = base_signal();
        signal.volatility_zone = VolatilityZone::ExtremeHigh;
        let result = filter.evaluate(RiskMode::Aggressive, &signal, false, true, true);
        assert!(!result.allowed);
        assert!(result.block_reasons.iter().any(|r| r.contains("EXTREME")));
    }

    #[test]
    fn extreme_volatility_only_scored_when_flag_disabled() {
        let filter = EntryFilter::new();
        let mut signal = base_signal();
        signal.volatility_zone = VolatilityZone::ExtremeHigh;
        let result = filter.evaluate(RiskMode::Aggressive, &signal, false, true, false);
        assert!(!result.block_reasons.iter().any(|r| r.contains("EXTREME")));
    }

    #[test]
    fn closed_session_blocks_regardless_of_confidence() {
        let filter = EntryFilter::new();
        let signal = base_signal();
        let result = filter.evaluate(RiskMode::Aggressive, &signal, false, false, false);
        assert!(!result.allowed);
    }

    #[test]
    fn stats_track_allow_rate() {
        let filter = EntryFilter::new();
        let signal = base_signal();
        filter.evaluate(RiskMode::Sniper, &signal, true, true, false);
        assert!(filter.allow_rate(RiskMode::Sniper) > 0.0);
    }

    #[test]
    fn risk_mode_round_trips_through_parse() {
        for mode in [RiskMode::LowRisk, RiskMode::HighProbability, RiskMode::Aggressive, RiskMode::Sniper] {
            assert_eq!(RiskMode::parse(mode.as_str()), mode);
        }
    }
}
