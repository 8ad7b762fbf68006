// =============================================================================
// Pair Scanner — one Strategy instance per symbol, ranked
// =============================================================================
//
// Preloads each symbol's tick history from Transport, subscribes to the live
// tick stream with a per-symbol routing task, then periodically re-evaluates
// every ready symbol and ranks the results for the operator surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::regime::RegimeDetector;
use crate::strategy::{Signal, Strategy};
use crate::transport::DerivTransport;
use crate::types::Direction;

const SCAN_INTERVAL_SECS: u64 = 15;
const PRUNE_AT_TICK_COUNT: u64 = 10_000;
const STALE_RESULT_SECS: u64 = 300;
const PRELOAD_HISTORY_MARGIN: u32 = 20;

#[derive(Debug, Clone)]
pub struct ScannerRecommendation {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub confluence_score: f64,
    pub adx: f64,
    pub rank_score: f64,
}

#[derive(Debug, Clone)]
pub struct SymbolDiagnostics {
    pub tick_count: usize,
    pub last_signal: Option<Signal>,
    pub last_analyzed_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ScannerStatus {
    pub running: bool,
    pub symbol_count: usize,
    pub last_scan_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ScannerSnapshot {
    pub status: ScannerStatus,
    pub recommendations: Vec<ScannerRecommendation>,
    pub diagnostics: HashMap<String, SymbolDiagnostics>,
}

struct SymbolEntry {
    strategy: Mutex<Strategy>,
    last_result: Mutex<Option<(Signal, Instant)>>,
    ticks_since_prune: AtomicU64,
}

pub struct PairScanner {
    transport: Arc<DerivTransport>,
    entries: RwLock<HashMap<String, Arc<SymbolEntry>>>,
    running: AtomicBool,
    last_scan_ms: Mutex<i64>,
}

impl PairScanner {
    pub fn new(transport: Arc<DerivTransport>, regime_detector: Arc<RegimeDetector>, symbols: Vec<String>) -> Self {
        let mut entries = HashMap::new();
        for symbol in symbols {
            let strategy = Strategy::new(symbol.clone(), regime_detector.clone());
            entries.insert(
                symbol,
                Arc::new(SymbolEntry {
                    strategy: Mutex::new(strategy),
                    last_result: Mutex::new(None),
                    ticks_since_prune: AtomicU64::new(0),
                }),
            );
        }
        Self {
            transport,
            entries: RwLock::new(entries),
            running: AtomicBool::new(false),
            last_scan_ms: Mutex::new(0),
        }
    }

    /// Preload history for every configured symbol, subscribe to live ticks,
    /// and start the periodic re-evaluation loop. Runs until `self.stop()`.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let symbols: Vec<String> = self.entries.read().keys().cloned().collect();
        for symbol in symbols {
            self.preload_and_subscribe(symbol).await?;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.scan_loop().await;
        });

        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn preload_and_subscribe(self: &Arc<Self>, symbol: String) -> anyhow::Result<()> {
        let required = crate::constants::MIN_TICKS_FOR_ANALYSIS as u32 + PRELOAD_HISTORY_MARGIN;
        match self.transport.ticks_history(&symbol, required).await {
            Ok(history) => {
                if let Some(entries) = self.entries.read().get(&symbol) {
                    let mut strategy = entries.strategy.lock();
                    for (i, price) in history.iter().enumerate() {
                        strategy.add_tick(*price, i as i64);
                    }
                }
            }
            Err(err) => warn!(symbol, error = %err, "failed to preload tick history"),
        }

        let mut rx = self.transport.subscribe_ticks(&symbol).await?;
        let this = self.clone();
        let routed_symbol = symbol.clone();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                let Some(entry) = this.entries.read().get(&routed_symbol).cloned() else { break };
                entry.strategy.lock().add_tick(msg.quote, msg.epoch);
                let total = entry.ticks_since_prune.fetch_add(1, Ordering::Relaxed) + 1;
                if total >= PRUNE_AT_TICK_COUNT {
                    entry.strategy.lock().clear_history();
                    entry.ticks_since_prune.store(0, Ordering::Relaxed);
                    debug!(symbol = %routed_symbol, "pruned indicator state after tick cap");
                }
            }
        });

        Ok(())
    }

    async fn scan_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(SCAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.scan_once();
        }
    }

    fn scan_once(&self) {
        let entries = self.entries.read();
        for (symbol, entry) in entries.iter() {
            let ready = entry.strategy.lock().tick_count() >= crate::constants::MIN_TICKS_FOR_ANALYSIS;
            if !ready {
                continue;
            }
            let signal = entry.strategy.lock().analyze();
            debug!(symbol, direction = %signal.direction, confidence = signal.confidence, "scanner re-evaluated symbol");
            *entry.last_result.lock() = Some((signal, Instant::now()));
        }
        *self.last_scan_ms.lock() = chrono::Utc::now().timestamp_millis();
        info!(symbols = entries.len(), "pair scanner cycle complete");
    }

    /// Rank score per the configured formula; higher is better.
    fn rank_score(signal: &Signal) -> f64 {
        let signal_present = if signal.direction.is_actionable() { 1.0 } else { 0.0 };
        let adx_bonus = if signal.adx > 25.0 {
            15.0
        } else if signal.adx > 20.0 {
            10.0
        } else {
            0.0
        };
        let extreme_penalty = if signal.volatility_zone.is_extreme() { 10.0 } else { 0.0 };

        50.0 * signal_present + 30.0 * signal.confidence + 20.0 * (signal.confluence_score / 100.0) + adx_bonus
            - extreme_penalty
    }

    pub fn get_snapshot(&self, top_n: usize) -> ScannerSnapshot {
        let entries = self.entries.read();
        let mut recommendations = Vec::new();
        let mut diagnostics = HashMap::new();
        let now = Instant::now();

        for (symbol, entry) in entries.iter() {
            let tick_count = entry.strategy.lock().tick_count();
            let mut last_result = entry.last_result.lock();

            if let Some((signal, recorded_at)) = last_result.as_ref() {
                if now.duration_since(*recorded_at).as_secs() > STALE_RESULT_SECS {
                    *last_result = None;
                } else if signal.direction.is_actionable() {
                    recommendations.push(ScannerRecommendation {
                        symbol: symbol.clone(),
                        direction: signal.direction,
                        confidence: signal.confidence,
                        confluence_score: signal.confluence_score,
                        adx: signal.adx,
                        rank_score: Self::rank_score(signal),
                    });
                }
            }

            diagnostics.insert(
                symbol.clone(),
                SymbolDiagnostics {
                    tick_count,
                    last_signal: last_result.as_ref().map(|(s, _)| s.clone()),
                    last_analyzed_ms: *self.last_scan_ms.lock(),
                },
            );
        }

        recommendations.sort_by(|a, b| b.rank_score.partial_cmp(&a.rank_score).unwrap_or(std::cmp::Ordering::Equal));
        recommendations.truncate(top_n);

        ScannerSnapshot {
            status: ScannerStatus {
                running: self.running.load(Ordering::SeqCst),
                symbol_count: entries.len(),
                last_scan_ms: *self.last_scan_ms.lock(),
            },
            recommendations,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::VolatilityZone;
    use crate::types::Regime;

    fn signal(direction: Direction, confidence: f64, adx: f64, confluence: f64) -> Signal {
        Signal {
            symbol: "R_100".to_string(),
            direction,
            confidence,
            reason: String::new(),
            regime: Regime::Trending,
            adx,
            volatility_zone: VolatilityZone::Normal,
            tp_distance: 0.0,
            sl_distance: 0.0,
            confluence_score: confluence,
            timestamp_ms: 0,
            indicators_snapshot: crate::strategy::IndicatorSnapshot::default(),
        }
    }

    #[test]
    fn rank_score_rewards_strong_adx_and_confidence() {
        let strong = signal(Direction::Call, 0.9, 30.0, 80.0);
        let weak = signal(Direction::Call, 0.4, 10.0, 30.0);
        assert!(PairScanner::rank_score(&strong) > PairScanner::rank_score(&weak));
    }

    #[test]
    fn rank_score_penalizes_extreme_volatility() {
        let mut s = signal(Direction::Call, 0.8, 25.0, 70.0);
        let normal_score = PairScanner::rank_score(&s);
        s.volatility_zone = VolatilityZone::ExtremeHigh;
        let extreme_score = PairScanner::rank_score(&s);
        assert!(extreme_score < normal_score);
    }

    #[test]
    fn wait_signal_has_zero_presence_component() {
        let s = signal(Direction::Wait, 0.0, 0.0, 0.0);
        assert_eq!(PairScanner::rank_score(&s), 0.0);
    }
}
