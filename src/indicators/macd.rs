// =============================================================================
// Moving Average Convergence/Divergence (MACD)
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow)
// Signal line = EMA(signal_period) of the MACD line
// Histogram = MACD line - signal line
//
// Standard parameters: fast=12, slow=26, signal=9.

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the latest MACD(12,26,9) value from a closes series.
///
/// Returns `None` when there isn't enough data for the slow EMA plus the
/// signal-line EMA on top of it.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdValue> {
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return None;
    }
    if closes.len() < slow + signal_period {
        return None;
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    // Align: ema_fast starts at index fast-1, ema_slow starts at index slow-1.
    // The MACD series starts where both exist, i.e. at slow-1.
    let offset = slow - fast;
    if ema_fast.len() <= offset {
        return None;
    }
    let macd_line: Vec<f64> = ema_fast[offset..]
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_line = calculate_ema(&macd_line, signal_period);
    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;
    let histogram = macd - signal;

    if !macd.is_finite() || !signal.is_finite() {
        return None;
    }

    Some(MacdValue { macd, signal, histogram })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_none() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }

    #[test]
    fn invalid_periods_return_none() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 0, 26, 9).is_none());
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
    }

    #[test]
    fn trending_series_has_positive_macd() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let macd = calculate_macd(&closes, 12, 26, 9).expect("should compute");
        assert!(macd.macd > 0.0, "rising trend should give positive MACD");
    }

    #[test]
    fn flat_series_macd_near_zero() {
        let closes = vec![50.0; 100];
        let macd = calculate_macd(&closes, 12, 26, 9).expect("should compute");
        assert!(macd.macd.abs() < 1e-9);
        assert!(macd.histogram.abs() < 1e-9);
    }
}
