// =============================================================================
// Stochastic Oscillator — %K / %D
// =============================================================================
//
// %K = 100 * (close - lowest_low) / (highest_high - lowest_low) over `period`
// %D = SMA(%K, smoothing)
//
// Standard parameters: period=14, smoothing=3.

/// Compute the latest %K/%D pair from high/low/close series.
///
/// All three slices must be the same length. Returns `None` when there's
/// insufficient data or the high-low range is degenerate (flat market).
pub fn calculate_stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    smoothing: usize,
) -> Option<(f64, f64)> {
    if period == 0 || smoothing == 0 {
        return None;
    }
    if highs.len() != lows.len() || lows.len() != closes.len() {
        return None;
    }
    if closes.len() < period + smoothing - 1 {
        return None;
    }

    let mut k_values = Vec::with_capacity(smoothing);
    for i in (closes.len() - smoothing)..closes.len() {
        let start = i + 1 - period;
        let window_high = highs[start..=i].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let window_low = lows[start..=i].iter().cloned().fold(f64::INFINITY, f64::min);
        let range = window_high - window_low;
        if range.abs() < f64::EPSILON {
            k_values.push(50.0); // degenerate range: treat as mid-point
            continue;
        }
        let k = 100.0 * (closes[i] - window_low) / range;
        k_values.push(k);
    }

    let k = *k_values.last()?;
    let d = k_values.iter().sum::<f64>() / k_values.len() as f64;

    if !k.is_finite() || !d.is_finite() {
        return None;
    }

    Some((k, d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_none() {
        let v = vec![1.0, 2.0, 3.0];
        assert!(calculate_stochastic(&v, &v, &v, 14, 3).is_none());
    }

    #[test]
    fn mismatched_lengths_return_none() {
        let highs = vec![1.0; 20];
        let lows = vec![1.0; 19];
        let closes = vec![1.0; 20];
        assert!(calculate_stochastic(&highs, &lows, &closes, 14, 3).is_none());
    }

    #[test]
    fn close_at_high_gives_k_near_100() {
        let n = 20;
        let lows: Vec<f64> = (0..n).map(|_| 90.0).collect();
        let highs: Vec<f64> = (0..n).map(|_| 110.0).collect();
        let closes: Vec<f64> = (0..n).map(|_| 110.0).collect();
        let (k, d) = calculate_stochastic(&highs, &lows, &closes, 14, 3).unwrap();
        assert!((k - 100.0).abs() < 1e-9);
        assert!((d - 100.0).abs() < 1e-9);
    }

    #[test]
    fn flat_range_treats_k_as_midpoint() {
        let n = 20;
        let flat = vec![100.0; n];
        let (k, _d) = calculate_stochastic(&flat, &flat, &flat, 14, 3).unwrap();
        assert!((k - 50.0).abs() < 1e-9);
    }
}
