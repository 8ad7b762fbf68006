// =============================================================================
// Strategy Engine
// =============================================================================
//
// Per-symbol tick buffer plus a staged pipeline: indicators -> regime ->
// signal synthesis -> multi-horizon prediction vote -> hard blocks -> soft
// confidence adjustments -> Signal. Mirrors the staged-pipeline-with-early-
// return style used across the rest of the engine: every hard block returns
// early with `Direction::Wait` and a reason, nothing downstream runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::constants::{
    ADX_ALIGNMENT_MIN, ADX_CONFLICT_MAGNITUDE, ADX_PERIOD, CONFLUENCE_FLOOR, EMA_FAST_PERIOD,
    EMA_SLOW_PERIOD, HMA_PERIOD, MACD_FAST_PERIOD, MACD_SIGNAL_PERIOD, MACD_SLOW_PERIOD,
    MIN_CONFIDENCE_THRESHOLD, MIN_TICKS_FOR_ANALYSIS, MULTI_HORIZON_AGREE_ALL_BOOST,
    MULTI_HORIZON_MIN_CONFIDENCE, MULTI_HORIZON_NEUTRAL_FLOOR, PREDICTION_SCORE_THRESHOLD,
    RSI_ENTRY_BAND_HIGH, RSI_ENTRY_BAND_LOW, RSI_OVERBOUGHT, RSI_OVERSOLD, RSI_PERIOD,
    SAME_SIDE_COOLDOWN_SECS, STOCHASTIC_PERIOD, STOCHASTIC_SMOOTHING, TICK_BUCKET_SIZE,
    TICK_IMBALANCE_WINDOW, ZSCORE_PERIOD,
};
use crate::indicators::cache::{EmaCache, HmaCache, MacdCache, RsiCache, ZScoreCache};
use crate::indicators::{adx, atr, bollinger, hma, stochastic};
use crate::regime::RegimeDetector;
use crate::tick_buffer::{Tick, TickBuffer};
use crate::types::{Direction, Regime};

/// Classification of current price-range expansion, derived from the
/// Bollinger width percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolatilityZone {
    ExtremeHigh,
    High,
    Normal,
    Low,
    ExtremeLow,
}

impl VolatilityZone {
    pub fn from_percentile(pct: Option<f64>) -> Self {
        match pct {
            Some(p) if p >= 90.0 => Self::ExtremeHigh,
            Some(p) if p >= 70.0 => Self::High,
            Some(p) if p <= 10.0 => Self::ExtremeLow,
            Some(p) if p <= 30.0 => Self::Low,
            _ => Self::Normal,
        }
    }

    pub fn is_extreme(self) -> bool {
        matches!(self, Self::ExtremeHigh | Self::ExtremeLow)
    }

    pub fn multiplier(self) -> f64 {
        match self {
            Self::ExtremeHigh => 0.7,
            Self::High => 0.85,
            Self::Normal => 1.0,
            Self::Low => 0.7,
            Self::ExtremeLow => 0.5,
        }
    }
}

/// A horizon-wise UP/DOWN/NEUTRAL call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HorizonCall {
    Up,
    Down,
    Neutral,
}

/// Final output of a strategy evaluation.
#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64,
    pub reason: String,
    pub regime: Regime,
    pub adx: f64,
    pub volatility_zone: VolatilityZone,
    /// Advisory telemetry only — binary options settle at fixed expiry, not
    /// by SL/TP exit.
    pub tp_distance: f64,
    pub sl_distance: f64,
    pub confluence_score: f64,
    pub timestamp_ms: i64,
    pub indicators_snapshot: IndicatorSnapshot,
}

/// Raw indicator readings behind a signal, carried alongside the derived
/// score/confidence fields so a caller (dashboard, journal, backtester) can
/// see what the pipeline actually saw without recomputing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub stochastic_k: Option<f64>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub plus_di: Option<f64>,
    pub minus_di: Option<f64>,
    pub bollinger_width: Option<f64>,
}

/// Per-symbol factor weight profile for the prediction vote. Every weight is
/// floored at [`crate::constants::MIN_FACTOR_WEIGHT_FLOOR`] and the whole set
/// is renormalised to sum to 1.
#[derive(Debug, Clone, Copy)]
struct FactorWeights {
    momentum: f64,
    ema_slope: f64,
    sequence: f64,
    zscore: f64,
    hma: f64,
    tick_imbalance: f64,
}

impl FactorWeights {
    fn baseline() -> Self {
        Self { momentum: 1.0, ema_slope: 1.0, sequence: 1.0, zscore: 1.0, hma: 1.0, tick_imbalance: 1.0 }
            .normalized()
    }

    fn trending() -> Self {
        Self { momentum: 2.0, ema_slope: 2.0, sequence: 2.0, zscore: 0.5, hma: 0.5, tick_imbalance: 0.5 }
            .normalized()
    }

    fn ranging() -> Self {
        Self { momentum: 0.5, ema_slope: 0.5, sequence: 0.5, zscore: 2.0, hma: 2.0, tick_imbalance: 2.0 }
            .normalized()
    }

    fn for_regime(regime: Regime) -> Self {
        match regime {
            Regime::Trending => Self::trending(),
            Regime::Ranging => Self::ranging(),
            Regime::Transitional => Self::baseline(),
        }
    }

    fn normalized(self) -> Self {
        let floor = crate::constants::MIN_FACTOR_WEIGHT_FLOOR;
        let raw = [self.momentum, self.ema_slope, self.sequence, self.zscore, self.hma, self.tick_imbalance];
        let sum: f64 = raw.iter().sum();
        let floored: Vec<f64> = raw.iter().map(|w| (w / sum).max(floor)).collect();
        let floored_sum: f64 = floored.iter().sum();
        Self {
            momentum: floored[0] / floored_sum,
            ema_slope: floored[1] / floored_sum,
            sequence: floored[2] / floored_sum,
            zscore: floored[3] / floored_sum,
            hma: floored[4] / floored_sum,
            tick_imbalance: floored[5] / floored_sum,
        }
    }
}

/// Per-symbol strategy state: a tick buffer plus the incremental indicator
/// caches that ride on top of it. Shares `add_tick`/`analyze`/`clear_history`
/// with the auxiliary strategies so the pair scanner can swap implementations
/// per symbol.
pub struct Strategy {
    symbol: String,
    ticks: TickBuffer,
    ema_fast: EmaCache,
    ema_slow: EmaCache,
    rsi: RsiCache,
    macd: MacdCache,
    hma_cache: HmaCache,
    zscore: ZScoreCache,
    regime_detector: Arc<RegimeDetector>,
    last_emission: HashMap<Direction, Instant>,
}

impl Strategy {
    pub fn new(symbol: impl Into<String>, regime_detector: Arc<RegimeDetector>) -> Self {
        Self {
            symbol: symbol.into(),
            ticks: TickBuffer::default(),
            ema_fast: EmaCache::new(EMA_FAST_PERIOD),
            ema_slow: EmaCache::new(EMA_SLOW_PERIOD),
            rsi: RsiCache::new(RSI_PERIOD),
            macd: MacdCache::new(MACD_FAST_PERIOD, MACD_SLOW_PERIOD, MACD_SIGNAL_PERIOD),
            hma_cache: HmaCache::new(HMA_PERIOD),
            zscore: ZScoreCache::new(ZSCORE_PERIOD),
            regime_detector,
            last_emission: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.len(&self.symbol)
    }

    /// Most recently cached RSI value, if enough ticks have been seen.
    pub fn last_rsi(&self) -> Option<f64> {
        self.rsi.current()
    }

    pub fn add_tick(&mut self, price: f64, timestamp_ms: i64) {
        self.ticks.push(&self.symbol, Tick { price, timestamp: timestamp_ms });
    }

    pub fn clear_history(&mut self) {
        self.ticks.clear(&self.symbol);
        self.ema_fast = EmaCache::new(EMA_FAST_PERIOD);
        self.ema_slow = EmaCache::new(EMA_SLOW_PERIOD);
        self.rsi = RsiCache::new(RSI_PERIOD);
        self.macd = MacdCache::new(MACD_FAST_PERIOD, MACD_SLOW_PERIOD, MACD_SIGNAL_PERIOD);
        self.hma_cache = HmaCache::new(HMA_PERIOD);
        self.zscore = ZScoreCache::new(ZSCORE_PERIOD);
        self.last_emission.clear();
    }

    /// Run the full staged pipeline, returning a `Wait` signal with a reason
    /// when any stage can't proceed or a hard block fires.
    pub fn analyze(&mut self) -> Signal {
        let closes = self.ticks.closes(&self.symbol);
        let now_ms = self.ticks.last_timestamp(&self.symbol).unwrap_or(0);

        if closes.len() < MIN_TICKS_FOR_ANALYSIS {
            return self.wait(format!("insufficient ticks: {} < {}", closes.len(), MIN_TICKS_FOR_ANALYSIS), now_ms);
        }

        let candles = self.ticks.synthetic_candles(&self.symbol, TICK_BUCKET_SIZE);
        if candles.len() < 2 * ADX_PERIOD + 1 {
            return self.wait("insufficient synthetic candles for ADX".to_string(), now_ms);
        }

        let ema_fast = self.ema_fast.update(&closes);
        let ema_slow = self.ema_slow.update(&closes);
        let rsi = self.rsi.update(&closes);
        let macd = self.macd.update(&closes);
        let hma_val = self.hma_cache.update(&closes);
        let zscore = self.zscore.update(&closes);
        let stoch = stochastic::calculate_stochastic(
            &candles.iter().map(|c| c.high).collect::<Vec<_>>(),
            &candles.iter().map(|c| c.low).collect::<Vec<_>>(),
            &closes,
            STOCHASTIC_PERIOD,
            STOCHASTIC_SMOOTHING,
        );
        let adx_value = adx::calculate_adx(&candles, ADX_PERIOD);
        let di = adx::calculate_di(&candles, ADX_PERIOD);
        let bb = bollinger::calculate_bollinger(&closes, 20, 2.0);
        let bbw_percentile = bollinger::bbw_percentile(&closes, 20, 2.0, crate::constants::REGIME_BBW_LOOKBACK);
        let atr_value = atr::calculate_atr(&candles, 14).unwrap_or(0.0);

        let (Some(adx_value), Some((plus_di, minus_di))) = (adx_value, di) else {
            return self.wait("ADX/DI not ready".to_string(), now_ms);
        };

        let regime_state = self.regime_detector.update(&self.symbol, &candles, &closes, ADX_PERIOD);
        let regime = regime_state.as_ref().map(|s| s.regime).unwrap_or_default();

        // ---- Signal synthesis: independent BUY/SELL score -----------------
        let current_price = *closes.last().unwrap();
        let mut buy_score = 0.0_f64;
        let mut sell_score = 0.0_f64;
        let mut reasons: Vec<String> = Vec::new();

        if let Some(rsi) = rsi {
            if rsi < RSI_OVERSOLD {
                buy_score += 0.35;
                reasons.push(format!("rsi_oversold({:.1})", rsi));
            } else if rsi > RSI_OVERBOUGHT {
                sell_score += 0.35;
                reasons.push(format!("rsi_overbought({:.1})", rsi));
            }
            if rsi >= RSI_ENTRY_BAND_LOW.0 && rsi <= RSI_ENTRY_BAND_LOW.1 {
                buy_score += 0.05;
            }
            if rsi >= RSI_ENTRY_BAND_HIGH.0 && rsi <= RSI_ENTRY_BAND_HIGH.1 {
                sell_score += 0.05;
            }
        }

        if let (Some(fast), Some(slow)) = (ema_fast, ema_slow) {
            if fast > slow {
                buy_score += 0.20;
                reasons.push("ema_bullish".to_string());
                if current_price > fast {
                    buy_score += 0.05;
                }
            } else if fast < slow {
                sell_score += 0.20;
                reasons.push("ema_bearish".to_string());
                if current_price < fast {
                    sell_score += 0.05;
                }
            }
        }

        if let Some(macd) = macd {
            if macd.histogram > 0.0 {
                buy_score += 0.15;
                reasons.push("macd_positive".to_string());
            } else if macd.histogram < 0.0 {
                sell_score += 0.15;
                reasons.push("macd_negative".to_string());
            }
        }

        if let Some((k, _d)) = stoch {
            if k < 20.0 {
                buy_score += 0.10;
                reasons.push(format!("stoch_oversold({:.1})", k));
            } else if k > 80.0 {
                sell_score += 0.10;
                reasons.push(format!("stoch_overbought({:.1})", k));
            }
        }

        let tick_up_ratio = up_tick_ratio(&closes, TICK_IMBALANCE_WINDOW);
        if tick_up_ratio > 0.55 {
            buy_score += 0.05;
        } else if tick_up_ratio < 0.45 {
            sell_score += 0.05;
        }

        if adx_value >= ADX_ALIGNMENT_MIN {
            if plus_di > minus_di {
                buy_score += 0.15;
                reasons.push(format!("adx_aligned_up({:.1})", adx_value));
            } else if minus_di > plus_di {
                sell_score += 0.15;
                reasons.push(format!("adx_aligned_down({:.1})", adx_value));
            }
        }

        if let Some(rsi) = rsi {
            if rsi < 40.0 {
                let boost = ((40.0 - rsi) / 40.0 * 0.10).clamp(0.05, 0.10);
                buy_score += boost;
            }
            if rsi > 60.0 {
                let boost = ((rsi - 60.0) / 40.0 * 0.10).clamp(0.05, 0.10);
                sell_score += boost;
            }
        }

        let candidate = if buy_score >= MIN_CONFIDENCE_THRESHOLD && buy_score > sell_score {
            Direction::Call
        } else if sell_score >= MIN_CONFIDENCE_THRESHOLD && sell_score > buy_score {
            Direction::Put
        } else {
            return self.wait(format!("no candidate: buy={:.2} sell={:.2}", buy_score, sell_score), now_ms);
        };
        let candidate_score = if candidate == Direction::Call { buy_score } else { sell_score };

        // ---- Hard block 1: same-side cooldown -----------------------------
        if let Some(last) = self.last_emission.get(&candidate) {
            if last.elapsed().as_secs() < SAME_SIDE_COOLDOWN_SECS {
                return self.wait(format!("{candidate} cooldown active"), now_ms);
            }
        }

        // ---- Multi-horizon prediction vote ---------------------------------
        let weights = FactorWeights::for_regime(regime);
        let prediction = vote_horizons(&closes, weights, hma_val);

        // ---- Hard block 2 & 3: prediction disagreement / low confidence ---
        let predicted_direction = match prediction.0 {
            HorizonCall::Up => Some(Direction::Call),
            HorizonCall::Down => Some(Direction::Put),
            HorizonCall::Neutral => None,
        };
        if predicted_direction != Some(candidate) {
            return self.wait(format!("multi-horizon disagrees with {candidate}"), now_ms);
        }
        if prediction.1 < MULTI_HORIZON_MIN_CONFIDENCE {
            return self.wait(format!("multi-horizon confidence {:.2} below floor", prediction.1), now_ms);
        }

        // ---- Hard block 4: ADX directional conflict ------------------------
        let di_conflict = match candidate {
            Direction::Call => minus_di - plus_di,
            Direction::Put => plus_di - minus_di,
            Direction::Wait => 0.0,
        };
        if di_conflict >= ADX_CONFLICT_MAGNITUDE {
            return self.wait(format!("ADX conflict {:.1} against {candidate}", di_conflict), now_ms);
        }

        // ---- Hard block 5: confluence floor ---------------------------------
        let confluence = confluence_score(
            candidate,
            adx_value,
            plus_di,
            minus_di,
            ema_fast,
            ema_slow,
            &closes,
            rsi,
            bb.as_ref(),
            current_price,
        );
        if confluence < CONFLUENCE_FLOOR {
            return self.wait(format!("confluence {:.1} below floor {:.1}", confluence, CONFLUENCE_FLOOR), now_ms);
        }

        // ---- Soft adjustments -------------------------------------------------
        let volatility_zone = VolatilityZone::from_percentile(bbw_percentile);
        let adx_strength_mult = (0.75 + 0.25 * (adx_value / 40.0).clamp(0.0, 1.0)).clamp(0.75, 1.0);
        let confluence_mult = if confluence >= 85.0 {
            1.15
        } else if confluence >= 60.0 {
            1.0
        } else {
            0.85
        };
        let regime_alignment_mult = regime_alignment_multiplier(regime, candidate, plus_di, minus_di);

        let final_confidence = (candidate_score
            * volatility_zone.multiplier()
            * adx_strength_mult
            * confluence_mult
            * regime_alignment_mult)
            .clamp(0.0, 1.0);

        self.last_emission.insert(candidate, Instant::now());

        let indicators_snapshot = IndicatorSnapshot {
            rsi,
            ema_fast,
            ema_slow,
            macd_histogram: macd.map(|m| m.histogram),
            stochastic_k: stoch.map(|(k, _d)| k),
            atr: Some(atr_value),
            adx: Some(adx_value),
            plus_di: Some(plus_di),
            minus_di: Some(minus_di),
            bollinger_width: bb.as_ref().map(|b| b.width),
        };

        debug!(
            symbol = %self.symbol,
            direction = %candidate,
            confidence = final_confidence,
            regime = ?regime,
            confluence,
            "signal synthesised"
        );

        Signal {
            symbol: self.symbol.clone(),
            direction: candidate,
            confidence: final_confidence,
            reason: reasons.join(","),
            regime,
            adx: adx_value,
            volatility_zone,
            tp_distance: atr_value * 2.5,
            sl_distance: atr_value * 1.5,
            confluence_score: confluence,
            timestamp_ms: now_ms,
            indicators_snapshot,
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

fn up_tick_ratio(closes: &[f64], window: usize) -> f64 {
    if closes.len() < window + 1 {
        return 0.5;
    }
    let tail = &closes[closes.len() - window - 1..];
    let ups = tail.windows(2).filter(|w| w[1] > w[0]).count();
    ups as f64 / window as f64
}

fn regime_alignment_multiplier(regime: Regime, candidate: Direction, plus_di: f64, minus_di: f64) -> f64 {
    match regime {
        Regime::Trending => {
            let aligned = (candidate == Direction::Call && plus_di >= minus_di)
                || (candidate == Direction::Put && minus_di >= plus_di);
            if aligned { 1.30 } else { 0.85 }
        }
        Regime::Ranging => {
            // Mean-reversion is "aligned" here: betting against DI dominance.
            let aligned = (candidate == Direction::Call && plus_di < minus_di)
                || (candidate == Direction::Put && plus_di >= minus_di);
            if aligned { 1.50 } else { 0.90 }
        }
        Regime::Transitional => 1.0,
    }
}

/// Aggregate confluence score (0-100) across seven sub-checks, each
/// contributing up to `100 / CONFLUENCE_SUB_CHECK_COUNT` when it agrees with
/// `candidate`.
#[allow(clippy::too_many_arguments)]
fn confluence_score(
    candidate: Direction,
    adx_value: f64,
    plus_di: f64,
    minus_di: f64,
    ema_fast: Option<f64>,
    ema_slow: Option<f64>,
    closes: &[f64],
    rsi: Option<f64>,
    bb: Option<&crate::indicators::bollinger::BollingerResult>,
    current_price: f64,
) -> f64 {
    let per_check = 100.0 / crate::constants::CONFLUENCE_SUB_CHECK_COUNT as f64;
    let mut score = 0.0;

    // 1. ADX trend-strength check.
    if adx_value >= ADX_ALIGNMENT_MIN {
        let di_aligned = (candidate == Direction::Call && plus_di > minus_di)
            || (candidate == Direction::Put && minus_di > plus_di);
        if di_aligned {
            score += per_check;
        }
    } else {
        // Weak trend is at least not a contradiction in ranging conditions.
        score += per_check * 0.5;
    }

    // 2. EMA slope check.
    if let (Some(fast), Some(slow)) = (ema_fast, ema_slow) {
        let aligned = (candidate == Direction::Call && fast > slow) || (candidate == Direction::Put && fast < slow);
        if aligned {
            score += per_check;
        }
    }

    // 3. Volume proxy: tick arrival density (always satisfied once enough
    // history exists; there is no real trade volume on a tick feed).
    if closes.len() >= MIN_TICKS_FOR_ANALYSIS {
        score += per_check;
    }

    // 4. Price-action: directional consistency of the last 10 ticks.
    if closes.len() >= 11 {
        let tail = &closes[closes.len() - 11..];
        let ups = tail.windows(2).filter(|w| w[1] > w[0]).count();
        let ratio = ups as f64 / 10.0;
        let aligned = (candidate == Direction::Call && ratio > 0.5) || (candidate == Direction::Put && ratio < 0.5);
        if aligned {
            score += per_check;
        }
    }

    // 5. Multi-timeframe proxy: same EMA alignment check at a longer lookback.
    if closes.len() >= EMA_SLOW_PERIOD * 2 {
        let longer_slow = crate::indicators::ema::calculate_ema(closes, EMA_SLOW_PERIOD * 2);
        if let (Some(slow2), Some(fast)) = (longer_slow.last().copied(), ema_fast) {
            let aligned =
                (candidate == Direction::Call && fast > slow2) || (candidate == Direction::Put && fast < slow2);
            if aligned {
                score += per_check;
            }
        }
    }

    // 6. RSI momentum direction.
    if let Some(rsi) = rsi {
        let aligned = (candidate == Direction::Call && rsi < 50.0) || (candidate == Direction::Put && rsi > 50.0);
        if aligned {
            score += per_check;
        }
    }

    // 7. Bollinger band position: price riding the lower band favours a
    // CALL reversal/breakout, the upper band favours PUT, by the same logic
    // as the RSI momentum check above.
    if let Some(bb) = bb {
        if bb.width > 0.0 {
            let position = (current_price - bb.lower) / (bb.upper - bb.lower);
            let aligned =
                (candidate == Direction::Call && position <= 0.5) || (candidate == Direction::Put && position >= 0.5);
            if aligned {
                score += per_check;
            }
        }
    }

    score.clamp(0.0, 100.0)
}

/// Vote across the configured horizons and return `(call, confidence)`.
fn vote_horizons(closes: &[f64], weights: FactorWeights, hma_latest: Option<f64>) -> (HorizonCall, f64) {
    let mut calls = Vec::with_capacity(crate::constants::HORIZONS.len());
    for &horizon in &crate::constants::HORIZONS {
        calls.push(score_horizon(closes, horizon, weights, hma_latest));
    }

    let up_count = calls.iter().filter(|(c, _)| *c == HorizonCall::Up).count();
    let down_count = calls.iter().filter(|(c, _)| *c == HorizonCall::Down).count();

    let avg_confidence = |dir: HorizonCall| -> f64 {
        let matching: Vec<f64> = calls.iter().filter(|(c, _)| *c == dir).map(|(_, conf)| *conf).collect();
        if matching.is_empty() {
            0.0
        } else {
            matching.iter().sum::<f64>() / matching.len() as f64
        }
    };

    if up_count == 3 {
        (HorizonCall::Up, (avg_confidence(HorizonCall::Up) * (1.0 + MULTI_HORIZON_AGREE_ALL_BOOST)).min(1.0))
    } else if down_count == 3 {
        (HorizonCall::Down, (avg_confidence(HorizonCall::Down) * (1.0 + MULTI_HORIZON_AGREE_ALL_BOOST)).min(1.0))
    } else if up_count == 2 {
        (HorizonCall::Up, avg_confidence(HorizonCall::Up))
    } else if down_count == 2 {
        (HorizonCall::Down, avg_confidence(HorizonCall::Down))
    } else {
        (HorizonCall::Neutral, MULTI_HORIZON_NEUTRAL_FLOOR)
    }
}

fn score_horizon(closes: &[f64], horizon: usize, weights: FactorWeights, hma_latest: Option<f64>) -> (HorizonCall, f64) {
    let momentum_window = (horizon * 4).max(2);
    let momentum = crate::indicators::roc::current_roc(closes, momentum_window.min(closes.len().saturating_sub(1)).max(1))
        .map(|roc| (roc / 2.0).tanh())
        .unwrap_or(0.0);

    let ema_slope = {
        let fast = crate::indicators::ema::calculate_ema(closes, EMA_FAST_PERIOD);
        let slow = crate::indicators::ema::calculate_ema(closes, EMA_SLOW_PERIOD);
        match (fast.last(), slow.last()) {
            (Some(f), Some(s)) if *s != 0.0 => ((f - s) / s).tanh(),
            _ => 0.0,
        }
    };

    let sequence_window = (horizon + 2).min(closes.len().saturating_sub(1)).max(1);
    let sequence = {
        let tail_len = (sequence_window + 1).min(closes.len());
        let tail = &closes[closes.len() - tail_len..];
        let ups = tail.windows(2).filter(|w| w[1] > w[0]).count();
        let downs = tail.windows(2).filter(|w| w[1] < w[0]).count();
        let total = (ups + downs).max(1);
        (ups as f64 - downs as f64) / total as f64
    };

    let zscore = crate::indicators::zscore::calculate_zscore(closes, ZSCORE_PERIOD)
        .map(|z| (z / 3.0).clamp(-1.0, 1.0))
        .unwrap_or(0.0);

    let hma_slope = {
        let window = (HMA_PERIOD * 4).min(closes.len());
        let tail = &closes[closes.len() - window..];
        let series = hma::calculate_hma(tail, HMA_PERIOD);
        match (series.len() >= 2, hma_latest) {
            (true, _) => {
                let prev = series[series.len() - 2];
                let last = *series.last().unwrap();
                if prev != 0.0 { ((last - prev) / prev).tanh() } else { 0.0 }
            }
            _ => 0.0,
        }
    };

    let tick_imbalance = (up_tick_ratio(closes, TICK_IMBALANCE_WINDOW) - 0.5) * 2.0;

    let score = weights.momentum * momentum
        + weights.ema_slope * ema_slope
        + weights.sequence * sequence
        + weights.zscore * zscore
        + weights.hma * hma_slope
        + weights.tick_imbalance * tick_imbalance;

    let call = if score > PREDICTION_SCORE_THRESHOLD {
        HorizonCall::Up
    } else if score < -PREDICTION_SCORE_THRESHOLD {
        HorizonCall::Down
    } else {
        HorizonCall::Neutral
    };

    (call, score.abs().clamp(0.0, 1.0))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn feed_uptrend(strategy: &mut Strategy, n: usize) {
        let mut price = 100.0;
        for i in 0..n {
            price += 0.3 + (i as f64 * 0.1).sin().abs() * 0.1;
            strategy.add_tick(price, i as i64 * 1000);
        }
    }

    #[test]
    fn insufficient_ticks_waits() {
        let mut strategy = Strategy::new("R_100", Arc::new(RegimeDetector::new()));
        strategy.add_tick(100.0, 0);
        let signal = strategy.analyze();
        assert_eq!(signal.direction, Direction::Wait);
    }

    #[test]
    fn clear_history_resets_tick_count() {
        let mut strategy = Strategy::new("R_100", Arc::new(RegimeDetector::new()));
        feed_uptrend(&mut strategy, 50);
        assert_eq!(strategy.tick_count(), 50);
        strategy.clear_history();
        assert_eq!(strategy.tick_count(), 0);
    }

    #[test]
    fn sustained_uptrend_does_not_panic_and_stays_bounded() {
        let mut strategy = Strategy::new("R_100", Arc::new(RegimeDetector::new()));
        feed_uptrend(&mut strategy, 400);
        let signal = strategy.analyze();
        assert!(signal.confidence >= 0.0 && signal.confidence <= 1.0);
    }

    #[test]
    fn factor_weights_always_sum_to_one() {
        for w in [FactorWeights::baseline(), FactorWeights::trending(), FactorWeights::ranging()] {
            let sum = w.momentum + w.ema_slope + w.sequence + w.zscore + w.hma + w.tick_imbalance;
            assert!((sum - 1.0).abs() < 1e-9, "sum={sum}");
            assert!(w.momentum >= crate::constants::MIN_FACTOR_WEIGHT_FLOOR);
        }
    }

    #[test]
    fn volatility_zone_multipliers_match_spec_table() {
        assert_eq!(VolatilityZone::ExtremeHigh.multiplier(), 0.7);
        assert_eq!(VolatilityZone::High.multiplier(), 0.85);
        assert_eq!(VolatilityZone::Normal.multiplier(), 1.0);
        assert_eq!(VolatilityZone::Low.multiplier(), 0.7);
        assert_eq!(VolatilityZone::ExtremeLow.multiplier(), 0.5);
    }
}
