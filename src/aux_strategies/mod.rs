// =============================================================================
// Auxiliary strategies
// =============================================================================
//
// Alternate signal producers, selectable per symbol instead of the main
// Strategy Engine. Each shares the same `add_tick`/`analyze`/`clear_history`
// input contract via `SignalProducer` and reuses the shared indicator cache
// types and `RegimeDetector` rather than recomputing anything from scratch.
// They are deliberately narrower than `Strategy`: each leans on a small
// factor subset suited to its own contract type instead of running the full
// multi-horizon vote.

pub mod accumulator;
pub mod ldp;
pub mod terminal;

pub use accumulator::AccumulatorStrategy;
pub use ldp::LdpStrategy;
pub use terminal::TerminalStrategy;

use std::sync::Arc;

use crate::regime::RegimeDetector;
use crate::strategy::Signal;

/// Shared input contract across the main Strategy Engine and every
/// auxiliary strategy, so the pair scanner / trade manager can swap
/// implementations per symbol without branching on a concrete type.
pub trait SignalProducer {
    fn symbol(&self) -> &str;
    fn tick_count(&self) -> usize;
    fn add_tick(&mut self, price: f64, timestamp_ms: i64);
    fn clear_history(&mut self);
    fn analyze(&mut self) -> Signal;

    /// Most recent RSI reading, when the producer tracks one. Used only for
    /// the trade manager's post-trade RSI-bucket bookkeeping; producers that
    /// don't compute RSI default to `None`.
    fn last_rsi(&self) -> Option<f64> {
        None
    }
}

impl SignalProducer for crate::strategy::Strategy {
    fn symbol(&self) -> &str {
        crate::strategy::Strategy::symbol(self)
    }

    fn tick_count(&self) -> usize {
        crate::strategy::Strategy::tick_count(self)
    }

    fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        crate::strategy::Strategy::add_tick(self, price, timestamp_ms)
    }

    fn clear_history(&mut self) {
        crate::strategy::Strategy::clear_history(self)
    }

    fn analyze(&mut self) -> Signal {
        crate::strategy::Strategy::analyze(self)
    }

    fn last_rsi(&self) -> Option<f64> {
        crate::strategy::Strategy::last_rsi(self)
    }
}

impl SignalProducer for LdpStrategy {
    fn symbol(&self) -> &str {
        LdpStrategy::symbol(self)
    }
    fn tick_count(&self) -> usize {
        LdpStrategy::tick_count(self)
    }
    fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        LdpStrategy::add_tick(self, price, timestamp_ms)
    }
    fn clear_history(&mut self) {
        LdpStrategy::clear_history(self)
    }
    fn analyze(&mut self) -> Signal {
        LdpStrategy::analyze(self)
    }
}

impl SignalProducer for AccumulatorStrategy {
    fn symbol(&self) -> &str {
        AccumulatorStrategy::symbol(self)
    }
    fn tick_count(&self) -> usize {
        AccumulatorStrategy::tick_count(self)
    }
    fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        AccumulatorStrategy::add_tick(self, price, timestamp_ms)
    }
    fn clear_history(&mut self) {
        AccumulatorStrategy::clear_history(self)
    }
    fn analyze(&mut self) -> Signal {
        AccumulatorStrategy::analyze(self)
    }
}

impl SignalProducer for TerminalStrategy {
    fn symbol(&self) -> &str {
        TerminalStrategy::symbol(self)
    }
    fn tick_count(&self) -> usize {
        TerminalStrategy::tick_count(self)
    }
    fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        TerminalStrategy::add_tick(self, price, timestamp_ms)
    }
    fn clear_history(&mut self) {
        TerminalStrategy::clear_history(self)
    }
    fn analyze(&mut self) -> Signal {
        TerminalStrategy::analyze(self)
    }
}

/// Which signal producer a trading session is configured to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// The main multi-horizon Strategy Engine (the default).
    Primary,
    Ldp,
    Accumulator,
    Terminal,
}

impl Default for StrategyKind {
    fn default() -> Self {
        Self::Primary
    }
}

impl StrategyKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "ldp" => Self::Ldp,
            "accumulator" => Self::Accumulator,
            "terminal" => Self::Terminal,
            _ => Self::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Ldp => "ldp",
            Self::Accumulator => "accumulator",
            Self::Terminal => "terminal",
        }
    }

    /// Build a fresh producer of this kind for `symbol`.
    pub fn build(self, symbol: impl Into<String>, regime_detector: Arc<RegimeDetector>) -> Box<dyn SignalProducer + Send> {
        let symbol = symbol.into();
        match self {
            Self::Primary => Box::new(crate::strategy::Strategy::new(symbol, regime_detector)),
            Self::Ldp => Box::new(LdpStrategy::new(symbol, regime_detector)),
            Self::Accumulator => Box::new(AccumulatorStrategy::new(symbol, regime_detector)),
            Self::Terminal => Box::new(TerminalStrategy::new(symbol, regime_detector)),
        }
    }
}

#[cfg(test)]
mod kind_tests {
    use super::*;

    #[test]
    fn parse_round_trips_through_as_str() {
        for kind in [StrategyKind::Primary, StrategyKind::Ldp, StrategyKind::Accumulator, StrategyKind::Terminal] {
            assert_eq!(StrategyKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_string_defaults_to_primary() {
        assert_eq!(StrategyKind::parse("nonsense"), StrategyKind::Primary);
    }

    #[test]
    fn build_produces_a_producer_that_waits_on_cold_start() {
        let detector = Arc::new(RegimeDetector::new());
        for kind in [StrategyKind::Primary, StrategyKind::Ldp, StrategyKind::Accumulator, StrategyKind::Terminal] {
            let mut producer = kind.build("R_100", detector.clone());
            assert_eq!(producer.symbol(), "R_100");
            assert_eq!(producer.tick_count(), 0);
        }
    }
}
