// =============================================================================
// Regime Detection
// =============================================================================
//
// Classifies the current market state per symbol as TRENDING, RANGING, or
// TRANSITIONAL from ADX, the +DI/-DI spread, and Bollinger Band Width
// percentile. Hurst exponent and Shannon entropy are retained as auxiliary
// confidence inputs rather than primary classifiers: they temper confidence
// (persistent trends raise it, noisy/random stretches lower it) but never
// flip the regime on their own.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;

use crate::constants::{
    REGIME_ADX_RANGING_MAX, REGIME_ADX_RANGING_SOFT_MAX, REGIME_ADX_TRENDING_MIN,
    REGIME_BBW_LOOKBACK, REGIME_BBW_PERCENTILE_RANGING_MAX, REGIME_DI_SPREAD_TRENDING_MIN,
};
use crate::indicators::{adx, bollinger};
use crate::tick_buffer::Candle;
use crate::regime::entropy::ShannonEntropyFilter;
use crate::regime::hurst::calculate_hurst_exponent;
use crate::types::Regime;

/// Inputs to classification, computed once per evaluation from a symbol's
/// synthetic candle series.
#[derive(Debug, Clone, Copy)]
pub struct RegimeSignals {
    pub adx: f64,
    pub di_spread: f64,
    pub bbw_percentile: Option<f64>,
}

/// Classify a regime from its core signals, following trending-first priority:
/// a strong trend outranks a simultaneous squeeze reading (rare, but ADX
/// dominates when both fire).
pub fn classify(signals: RegimeSignals) -> Regime {
    if signals.adx >= REGIME_ADX_TRENDING_MIN && signals.di_spread >= REGIME_DI_SPREAD_TRENDING_MIN
    {
        return Regime::Trending;
    }

    if signals.adx < REGIME_ADX_RANGING_MAX {
        return Regime::Ranging;
    }

    if let Some(pct) = signals.bbw_percentile {
        if pct < REGIME_BBW_PERCENTILE_RANGING_MAX && signals.adx < REGIME_ADX_RANGING_SOFT_MAX {
            return Regime::Ranging;
        }
    }

    Regime::Transitional
}

/// Confidence in the classification: how far past threshold ADX and DI
/// spread sit, softened/sharpened by Hurst persistence and Shannon entropy
/// when available. Always clamped to [0.0, 1.0].
pub fn confidence(regime: Regime, signals: RegimeSignals, hurst: Option<f64>, entropy: Option<f64>) -> f64 {
    let base = match regime {
        Regime::Trending => {
            let adx_over = (signals.adx - REGIME_ADX_TRENDING_MIN) / REGIME_ADX_TRENDING_MIN;
            let di_over = (signals.di_spread - REGIME_DI_SPREAD_TRENDING_MIN)
                / REGIME_DI_SPREAD_TRENDING_MIN;
            0.5 + 0.25 * adx_over.clamp(0.0, 1.0) + 0.25 * di_over.clamp(0.0, 1.0)
        }
        Regime::Ranging => {
            let adx_under = (REGIME_ADX_RANGING_MAX - signals.adx) / REGIME_ADX_RANGING_MAX;
            let bbw_term = signals
                .bbw_percentile
                .map(|p| (REGIME_BBW_PERCENTILE_RANGING_MAX - p) / REGIME_BBW_PERCENTILE_RANGING_MAX)
                .unwrap_or(0.0);
            0.5 + 0.25 * adx_under.clamp(0.0, 1.0) + 0.25 * bbw_term.clamp(0.0, 1.0)
        }
        Regime::Transitional => 0.4,
    };

    let mut adjusted = base;
    if let Some(h) = hurst {
        // Persistent series (H far from 0.5) reinforces whichever regime won;
        // anti-persistent / random series pulls confidence down.
        let persistence = (h - 0.5).abs() * 2.0;
        adjusted *= 0.85 + 0.15 * persistence.clamp(0.0, 1.0);
    }
    if let Some(e) = entropy {
        // High entropy (near-random up/down split) tempers confidence in any
        // regime call.
        adjusted *= 1.0 - 0.3 * e.clamp(0.0, 1.0);
    }

    adjusted.clamp(0.0, 1.0)
}

/// Compute [`RegimeSignals`] from a synthetic candle series and its flat
/// close-price view, or `None` when there isn't enough history yet.
pub fn compute_signals(candles: &[Candle], closes: &[f64], adx_period: usize) -> Option<RegimeSignals> {
    let adx_value = adx::calculate_adx(candles, adx_period)?;
    let (plus_di, minus_di) = adx::calculate_di(candles, adx_period)?;
    let bbw_percentile = bollinger::bbw_percentile(closes, 20, 2.0, REGIME_BBW_LOOKBACK);

    Some(RegimeSignals {
        adx: adx_value,
        di_spread: (plus_di - minus_di).abs(),
        bbw_percentile,
    })
}

/// Snapshot of the most recent classification for a symbol.
#[derive(Debug, Clone)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: f64,
    pub signals: RegimeSignals,
    pub since: Instant,
}

/// Per-symbol regime classifier with change tracking.
pub struct RegimeDetector {
    states: RwLock<HashMap<String, RegimeState>>,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeDetector {
    pub fn new() -> Self {
        Self { states: RwLock::new(HashMap::new()) }
    }

    /// Classify `symbol` from its candle/close history and update the stored
    /// state. Returns `None` when there isn't enough data for a reading yet,
    /// leaving any prior state untouched.
    pub fn update(&self, symbol: &str, candles: &[Candle], closes: &[f64], adx_period: usize) -> Option<RegimeState> {
        let signals = compute_signals(candles, closes, adx_period)?;
        let hurst = calculate_hurst_exponent(closes);
        let entropy = ShannonEntropyFilter::calculate(candles, 50);
        let regime = classify(signals);
        let conf = confidence(regime, signals, hurst, entropy);

        let mut map = self.states.write();
        let changed = map.get(symbol).map(|s| s.regime != regime).unwrap_or(true);
        let since = if changed {
            Instant::now()
        } else {
            map.get(symbol).map(|s| s.since).unwrap_or_else(Instant::now)
        };

        let state = RegimeState { regime, confidence: conf, signals, since };
        map.insert(symbol.to_string(), state.clone());
        Some(state)
    }

    pub fn current(&self, symbol: &str) -> Option<RegimeState> {
        self.states.read().get(symbol).cloned()
    }

    pub fn current_regime(&self, symbol: &str) -> Regime {
        self.current(symbol).map(|s| s.regime).unwrap_or_default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle { open_time: 0, close_time: 0, open: o, high: h, low: l, close: c }
    }

    #[test]
    fn strong_trend_classifies_trending() {
        let signals = RegimeSignals { adx: 30.0, di_spread: 20.0, bbw_percentile: Some(80.0) };
        assert_eq!(classify(signals), Regime::Trending);
    }

    #[test]
    fn low_adx_classifies_ranging() {
        let signals = RegimeSignals { adx: 8.0, di_spread: 2.0, bbw_percentile: Some(50.0) };
        assert_eq!(classify(signals), Regime::Ranging);
    }

    #[test]
    fn tight_squeeze_classifies_ranging() {
        let signals = RegimeSignals { adx: 15.0, di_spread: 3.0, bbw_percentile: Some(10.0) };
        assert_eq!(classify(signals), Regime::Ranging);
    }

    #[test]
    fn ambiguous_signals_classify_transitional() {
        let signals = RegimeSignals { adx: 15.0, di_spread: 5.0, bbw_percentile: Some(50.0) };
        assert_eq!(classify(signals), Regime::Transitional);
    }

    #[test]
    fn confidence_is_always_bounded() {
        let signals = RegimeSignals { adx: 90.0, di_spread: 90.0, bbw_percentile: Some(1.0) };
        let c = confidence(Regime::Trending, signals, Some(0.95), Some(0.0));
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn detector_tracks_state_change_timing() {
        let detector = RegimeDetector::new();
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let state = detector.update("R_100", &candles, &closes, 14);
        assert!(state.is_some());
        assert_eq!(detector.current_regime("R_100"), state.unwrap().regime);
    }

    #[test]
    fn unknown_symbol_defaults_to_transitional() {
        let detector = RegimeDetector::new();
        assert_eq!(detector.current_regime("UNKNOWN"), Regime::Transitional);
    }
}
