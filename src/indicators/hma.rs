// =============================================================================
// Hull Moving Average (HMA)
// =============================================================================
//
// HMA(n) = WMA(2*WMA(n/2) - WMA(n), sqrt(n))
//
// Reduces lag relative to a plain moving average while keeping smoothness.

fn wma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let denom = (period * (period + 1) / 2) as f64;
    let mut out = Vec::with_capacity(values.len() - period + 1);
    for window in values.windows(period) {
        let weighted: f64 = window
            .iter()
            .enumerate()
            .map(|(i, v)| v * (i + 1) as f64)
            .sum();
        out.push(weighted / denom);
    }
    out
}

/// Compute the Hull Moving Average series for `period` (commonly 16).
///
/// Returns an empty vec when there isn't enough data for the full
/// WMA(sqrt(n)) smoothing stage.
pub fn calculate_hma(closes: &[f64], period: usize) -> Vec<f64> {
    if period < 2 {
        return Vec::new();
    }
    let half = (period / 2).max(1);
    let sqrt_period = (period as f64).sqrt().round() as usize;
    if sqrt_period == 0 {
        return Vec::new();
    }

    let wma_full = wma(closes, period);
    let wma_half = wma(closes, half);
    if wma_full.is_empty() || wma_half.is_empty() {
        return Vec::new();
    }

    // Align: wma_half starts earlier (shorter period) than wma_full.
    let offset = period - half;
    if wma_half.len() <= offset {
        return Vec::new();
    }
    let raw: Vec<f64> = wma_half[offset..]
        .iter()
        .zip(wma_full.iter())
        .map(|(h, f)| 2.0 * h - f)
        .collect();

    wma(&raw, sqrt_period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_empty() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        assert!(calculate_hma(&closes, 16).is_empty());
    }

    #[test]
    fn hma_tracks_a_rising_trend() {
        let closes: Vec<f64> = (1..=200).map(|x| x as f64).collect();
        let hma = calculate_hma(&closes, 16);
        assert!(!hma.is_empty());
        // HMA of a straight line should track the line closely near the end.
        let last = *hma.last().unwrap();
        assert!((last - 200.0).abs() < 5.0, "last={last}");
    }

    #[test]
    fn period_below_two_returns_empty() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_hma(&closes, 1).is_empty());
        assert!(calculate_hma(&closes, 0).is_empty());
    }
}
