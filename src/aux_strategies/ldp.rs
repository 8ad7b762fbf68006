// =============================================================================
// LDP strategy — Liquidity / Direction / Pattern
// =============================================================================
//
// Favors order-flow persistence (tick-direction imbalance over a short
// window) confirmed by a simple consecutive-move pattern, with the regime
// detector's ADX/DI state providing a directional bias gate. No EMA/MACD/HMA
// factor vote; this is a narrower, faster-to-converge alternative to the
// main Strategy Engine for symbols where order-flow persistence is the more
// reliable signal than multi-factor confluence.

use std::sync::Arc;

use tracing::debug;

use crate::constants::{ADX_ALIGNMENT_MIN, MIN_TICKS_FOR_ANALYSIS, TICK_IMBALANCE_WINDOW};
use crate::regime::RegimeDetector;
use crate::strategy::{IndicatorSnapshot, Signal, VolatilityZone};
use crate::tick_buffer::{Tick, TickBuffer};
use crate::types::Direction;

const PATTERN_CONFIRM_BARS: usize = 3;
const IMBALANCE_ENTRY_THRESHOLD: f64 = 0.62;

pub struct LdpStrategy {
    symbol: String,
    ticks: TickBuffer,
    regime_detector: Arc<RegimeDetector>,
}

impl LdpStrategy {
    pub fn new(symbol: impl Into<String>, regime_detector: Arc<RegimeDetector>) -> Self {
        Self { symbol: symbol.into(), ticks: TickBuffer::default(), regime_detector }
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
    }

    pub fn analyze(&mut self) -> Signal {
        let closes = self.ticks.closes(&self.symbol);
        let now_ms = self.ticks.last_timestamp(&self.symbol).unwrap_or(0);

        if closes.len() < MIN_TICKS_FOR_ANALYSIS {
            return self.wait(format!("insufficient ticks: {} < {}", closes.len(), MIN_TICKS_FOR_ANALYSIS), now_ms);
        }

        let imbalance = tick_imbalance(&closes, TICK_IMBALANCE_WINDOW);
        let candidate = if imbalance >= IMBALANCE_ENTRY_THRESHOLD {
            Direction::Call
        } else if imbalance <= 1.0 - IMBALANCE_ENTRY_THRESHOLD {
            Direction::Put
        } else {
            return self.wait(format!("order-flow imbalance {imbalance:.2} inconclusive"), now_ms);
        };

        if !pattern_confirms(&closes, candidate, PATTERN_CONFIRM_BARS) {
            return self.wait(format!("pattern does not confirm {candidate}"), now_ms);
        }

        let candles = self.ticks.synthetic_candles(&self.symbol, 5);
        let adx_value = crate::indicators::adx::calculate_adx(&candles, 14).unwrap_or(0.0);
        let di = crate::indicators::adx::calculate_di(&candles, 14);
        if let Some((plus_di, minus_di)) = di {
            let against = match candidate {
                Direction::Call => minus_di - plus_di,
                Direction::Put => plus_di - minus_di,
                Direction::Wait => 0.0,
            };
            if adx_value >= ADX_ALIGNMENT_MIN && against > 0.0 {
                return self.wait(format!("ADX/DI contradicts {candidate}"), now_ms);
            }
        }

        let regime_state = self.regime_detector.current_regime(&self.symbol);
        let confidence = (imbalance.max(1.0 - imbalance) * 0.85).clamp(0.0, 1.0);

        debug!(symbol = %self.symbol, direction = %candidate, confidence, "ldp signal synthesised");

        Signal {
            symbol: self.symbol.clone(),
            direction: candidate,
            confidence,
            reason: format!("order_flow_imbalance({imbalance:.2})"),
            regime: regime_state,
            adx: adx_value,
            volatility_zone: VolatilityZone::Normal,
            tp_distance: 0.0,
            sl_distance: 0.0,
            confluence_score: imbalance * 100.0,
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

/// Fraction of up-ticks within the trailing `window`.
fn tick_imbalance(closes: &[f64], window: usize) -> f64 {
    if closes.len() < window + 1 {
        return 0.5;
    }
    let tail = &closes[closes.len() - window - 1..];
    let ups = tail.windows(2).filter(|w| w[1] > w[0]).count();
    ups as f64 / window as f64
}

/// Whether the last `bars` moves are all in `candidate`'s direction.
fn pattern_confirms(closes: &[f64], candidate: Direction, bars: usize) -> bool {
    if closes.len() < bars + 1 {
        return false;
    }
    let tail = &closes[closes.len() - bars - 1..];
    tail.windows(2).all(|w| match candidate {
        Direction::Call => w[1] > w[0],
        Direction::Put => w[1] < w[0],
        Direction::Wait => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::RegimeDetector;

    fn feed_uptrend(strategy: &mut LdpStrategy, n: usize) {
        let mut price = 100.0;
        for i in 0..n {
            price += 0.3;
            strategy.add_tick(price, i as i64 * 1000);
        }
    }

    #[test]
    fn insufficient_ticks_waits() {
        let mut strategy = LdpStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        strategy.add_tick(100.0, 0);
        assert_eq!(strategy.analyze().direction, Direction::Wait);
    }

    #[test]
    fn clear_history_resets_tick_count() {
        let mut strategy = LdpStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        feed_uptrend(&mut strategy, 40);
        assert_eq!(strategy.tick_count(), 40);
        strategy.clear_history();
        assert_eq!(strategy.tick_count(), 0);
    }

    #[test]
    fn sustained_uptrend_votes_call_or_waits_bounded() {
        let mut strategy = LdpStrategy::new("R_100", Arc::new(RegimeDetector::new()));
        feed_uptrend(&mut strategy, 60);
        let signal = strategy.analyze();
        assert!(signal.direction == Direction::Call || signal.direction == Direction::Wait);
        assert!(signal.confidence >= 0.0 && signal.confidence <= 1.0);
    }

    #[test]
    fn pattern_confirms_detects_consistent_moves() {
        let closes = [100.0, 100.5, 101.0, 101.5];
        assert!(pattern_confirms(&closes, Direction::Call, 3));
        assert!(!pattern_confirms(&closes, Direction::Put, 3));
    }
}
