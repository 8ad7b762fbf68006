// =============================================================================
// Accumulator strategy
// =============================================================================
//
// Favors slow, low-volatility growth: a narrow Bollinger width (low
// percentile) with a small but consistent EMA slope, the entry shape suited
// to Deriv's accumulator contract type (which pays out continuously while
// price stays inside a band and is knocked out on a breakout). Confidence is
// highest exactly when volatility is calmest, the inverse of the main
// Strategy Engine's preference for a confirmed breakout.

use std::sync::Arc;

use tracing::debug;

use crate::constants::{EMA_FAST_PERIOD, EMA_SLOW_PERIOD, MIN_TICKS_FOR_ANALYSIS, REGIME_BBW_LOOKBACK};
use crate::indicators::bollinger;
use crate::indicators::cache::EmaCache;
use crate::regime::RegimeDetector;
use crate::strategy::{IndicatorSnapshot, Signal, VolatilityZone};
use crate::tick_buffer::{Tick, TickBuffer};
use crate::types::Direction;

const BBW_CALM_PERCENTILE_MAX: f64 = 35.0;
const MIN_SLOPE: f64 = 0.0005;
const MAX_SLOPE: f64 = 0.01;

pub struct AccumulatorStrategy {
    symbol: String,
    ticks: TickBuffer,
    ema_fast: EmaCache,
    ema_slow: EmaCache,
    regime_detector: Arc<RegimeDetector>,
}

impl AccumulatorStrategy {
    pub fn new(symbol: impl Into<String>, regime_detector: Arc<RegimeDetector>) -> Self {
        Self {
            symbol: symbol.into(),
            ticks: TickBuffer::default(),
            ema_fast: EmaCache::new(EMA_FAST_PERIOD),
            ema_slow: EmaCache::new(EMA_SLOW_PERIOD),
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
        self.ema_fast = EmaCache::new(EMA_FAST_PERIOD);
        self.ema_slow = EmaCache::new(EMA_SLOW_PERIOD);
    }

    pub fn analyze(&mut self) -> Signal {
        let closes = self.ticks.closes(&self.symbol);
        let now_ms = self.ticks.last_timestamp(&self.symbol).unwrap_or(0);

        if closes.len() < MIN_TICKS_FOR_ANALYSIS {
            return self.wait(format!("insufficient ticks: {} < {}", closes.len(), MIN_TICKS_FOR_ANALYSIS), now_ms);
        }

        let bbw_percentile = bollinger::bbw_percentile(&closes, 20, 2.0, REGIME_BBW_LOOKBACK);
        let Some(bbw_percentile) = bbw_percentile else {
            return self.wait("bollinger width percentile not ready".to_string(), now_ms);
        };
        if bbw_percentile > BBW_CALM_PERCENTILE_MAX {
            return self.wait(format!("volatility too wide for accumulation: bbw_pct={bbw_percentile:.1}"), now_ms);
        }

        let ema_fast = self.ema_fast.update(&closes);
        let ema_slow = self.ema_slow.update(&closes);
        let (Some(fast), Some(slow)) = (ema_fast, ema_slow) else {
            return self.wait("EMA caches not ready".to_string(), now_ms);
        };
        if slow == 0.0 {
            return self.wait("slow EMA is zero".to_string(), now_ms);
        }
        let slope = (fast - slow) / slow;

        let candidate = if slope >= MIN_SLOPE && slope <= MAX_SLOPE {
            Direction::Call
        } else if slope <= -MIN_SLOPE && slope >= -MAX_SLOPE {
            Direction::Put
        } else {
            return self.wait(format!("slope {slope:.4} outside accumulation band"), now_ms);
        };

        // Confidence peaks when the band is calmest and the slope is smallest
        // in magnitude within its admissible range: steady growth, not a
        // breakout in the making.
        let calmness = 1.0 - (bbw_percentile / BBW_CALM_PERCENTILE_MAX).clamp(0.0, 1.0);
        let steadiness = 1.0 - ((slope.abs() - MIN_SLOPE) / (MAX_SLOPE - MIN_SLOPE)).clamp(0.0, 1.0);
        let confidence = (0.5 + 0.25 * calmness + 0.25 * steadiness).clamp(0.0, 1.0);

        debug!(symbol = %self.symbol, direction = %candidate, confidence, bbw_percentile, slope, "accumulator signal synthesised");

        Signal {
            symbol: self.symbol.clone(),
            direction: candidate,
            confidence,
            reason: format!("calm_band(bbw_pct={bbw_percentile:.1},slope={slope:.4})"),
            regime: self.regime_detector.current_regime(&self.symbol),
            adx: 0.0,
            volatility_zone: VolatilityZone::from_percentile(Some(bbw_percentile)),
            tp_distance: 0.0,
            sl_distance: 0.0,
            confluence_score: calmness * 100.0,
            timestamp_ms: now_ms,
            indicators_snapshot: IndicatorSnapshot::default(),
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
        let mut strategy = AccumulatorStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        strategy.add_tick(100.0, 0);
        assert_eq!(strategy.analyze().direction, Direction::Wait);
    }

    #[test]
    fn clear_history_resets_tick_count() {
        let mut strategy = AccumulatorStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        for i in 0..40 {
            strategy.add_tick(100.0 + i as f64 * 0.01, i as i64 * 1000);
        }
        assert_eq!(strategy.tick_count(), 40);
        strategy.clear_history();
        assert_eq!(strategy.tick_count(), 0);
    }

    #[test]
    fn flat_low_volatility_series_does_not_panic() {
        let mut strategy = AccumulatorStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        let mut price = 100.0;
        for i in 0..200 {
            price += 0.001;
            strategy.add_tick(price, i as i64 * 1000);
        }
        let signal = strategy.analyze();
        assert!(signal.confidence >= 0.0 && signal.confidence <= 1.0);
    }
}
