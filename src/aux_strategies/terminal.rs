// =============================================================================
// Terminal strategy
// =============================================================================
//
// Favors a single fixed-horizon terminal confidence check instead of the
// main Strategy Engine's multi-horizon vote: RSI extremity and Z-score
// deviation are read once, at a fixed lookback, and combined directly into a
// confidence score. Simpler and cheaper than voting across horizons, at the
// cost of not cross-checking the call against momentum at other windows.

use std::sync::Arc;

use tracing::debug;

use crate::constants::{MIN_TICKS_FOR_ANALYSIS, RSI_OVERBOUGHT, RSI_OVERSOLD, RSI_PERIOD, ZSCORE_PERIOD};
use crate::indicators::cache::{RsiCache, ZScoreCache};
use crate::regime::RegimeDetector;
use crate::strategy::{IndicatorSnapshot, Signal, VolatilityZone};
use crate::tick_buffer::{Tick, TickBuffer};
use crate::types::Direction;

const ZSCORE_EXTREME: f64 = 1.5;

pub struct TerminalStrategy {
    symbol: String,
    ticks: TickBuffer,
    rsi: RsiCache,
    zscore: ZScoreCache,
    regime_detector: Arc<RegimeDetector>,
}

impl TerminalStrategy {
    pub fn new(symbol: impl Into<String>, regime_detector: Arc<RegimeDetector>) -> Self {
        Self {
            symbol: symbol.into(),
            ticks: TickBuffer::default(),
            rsi: RsiCache::new(RSI_PERIOD),
            zscore: ZScoreCache::new(ZSCORE_PERIOD),
            regime_detector,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.len(&self.symbol)
    }

    pub fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        self.ticks.push(&self.symbol, Tick { price, timestamp: timestamp_ms });
    }

    pub fn clear_history(&mut self) {
        self.ticks.clear(&self.symbol);
        self.rsi = RsiCache::new(RSI_PERIOD);
        self.zscore = ZScoreCache::new(ZSCORE_PERIOD);
    }

    pub fn analyze(&mut self) -> Signal {
        let closes = self.ticks.closes(&self.symbol);
        let now_ms = self.ticks.last_timestamp(&self.symbol).unwrap_or(0);

        if closes.len() < MIN_TICKS_FOR_ANALYSIS {
            return self.wait(format!("insufficient ticks: {} < {}", closes.len(), MIN_TICKS_FOR_ANALYSIS), now_ms);
        }

        let rsi = self.rsi.update(&closes);
        let zscore = self.zscore.update(&closes);
        let (Some(rsi), Some(zscore)) = (rsi, zscore) else {
            return self.wait("RSI/Z-score not ready".to_string(), now_ms);
        };

        let rsi_call = rsi < RSI_OVERSOLD;
        let rsi_put = rsi > RSI_OVERBOUGHT;
        let zscore_call = zscore <= -ZSCORE_EXTREME;
        let zscore_put = zscore >= ZSCORE_EXTREME;

        let candidate = if rsi_call && zscore_call {
            Direction::Call
        } else if rsi_put && zscore_put {
            Direction::Put
        } else {
            return self.wait(format!("terminal check inconclusive: rsi={rsi:.1} zscore={zscore:.2}"), now_ms);
        };

        let rsi_extremity = match candidate {
            Direction::Call => (RSI_OVERSOLD - rsi).max(0.0) / RSI_OVERSOLD,
            Direction::Put => (rsi - RSI_OVERBOUGHT).max(0.0) / (100.0 - RSI_OVERBOUGHT),
            Direction::Wait => 0.0,
        };
        let zscore_extremity = ((zscore.abs() - ZSCORE_EXTREME) / ZSCORE_EXTREME).clamp(0.0, 1.0);
        let confidence = (0.5 + 0.25 * rsi_extremity.clamp(0.0, 1.0) + 0.25 * zscore_extremity).clamp(0.0, 1.0);

        debug!(symbol = %self.symbol, direction = %candidate, confidence, rsi, zscore, "terminal signal synthesised");

        Signal {
            symbol: self.symbol.clone(),
            direction: candidate,
            confidence,
            reason: format!("terminal_extreme(rsi={rsi:.1},zscore={zscore:.2})"),
            regime: self.regime_detector.current_regime(&self.symbol),
            adx: 0.0,
            volatility_zone: VolatilityZone::Normal,
            tp_distance: 0.0,
            sl_distance: 0.0,
            confluence_score: confidence * 100.0,
            timestamp_ms: now_ms,
            indicators_snapshot: IndicatorSnapshot { rsi: Some(rsi), ..IndicatorSnapshot::default() },
        }
    }

    fn wait(&self, reason: String, now_ms: i64) -> Signal {
        Signal {
            symbol: self.symbol.clone(),
            direction: Direction::Wait,
            confidence: 0.0,
            reason,
            regime: self.regime_detector.current_regime(&self.symbol),
            adx: 0.0,
            volatility_zone: VolatilityZone::Normal,
            tp_distance: 0.0,
            sl_distance: 0.0,
            confluence_score: 0.0,
            timestamp_ms: now_ms,
            indicators_snapshot: IndicatorSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeDetector;

    #[test]
    fn insufficient_ticks_waits() {
        let mut strategy = TerminalStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        strategy.add_tick(100.0, 0);
        assert_eq!(strategy.analyze().direction, Direction::Wait);
    }

    #[test]
    fn clear_history_resets_tick_count() {
        let mut strategy = TerminalStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        for i in 0..40 {
            strategy.add_tick(100.0, i as i64 * 1000);
        }
        assert_eq!(strategy.tick_count(), 40);
        strategy.clear_history();
        assert_eq!(strategy.tick_count(), 0);
    }

    #[test]
    fn steady_flat_series_waits_without_extremes() {
        let mut strategy = TerminalStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        for i in 0..100 {
            strategy.add_tick(100.0, i as i64 * 1000);
        }
        let signal = strategy.analyze();
        assert_eq!(signal.direction, Direction::Wait);
    }
}
