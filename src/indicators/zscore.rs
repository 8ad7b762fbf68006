// =============================================================================
// Rolling Z-score
// =============================================================================
//
// z = (x - mean) / stddev, computed over a trailing `period` window. Used to
// flag statistically extreme price deviations (mean-reversion signal input).

/// Compute the z-score of the last value in `values` against the trailing
/// `period` window (inclusive of the last value itself).
///
/// Returns `None` on insufficient data or a degenerate (zero-variance)
/// window.
pub fn calculate_zscore(values: &[f64], period: usize) -> Option<f64> {
    if period < 2 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    if std_dev < f64::EPSILON {
        return None;
    }

    let last = *values.last()?;
    let z = (last - mean) / std_dev;
    if !z.is_finite() {
        return None;
    }
    Some(z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_none() {
        assert!(calculate_zscore(&[1.0, 2.0], 30).is_none());
    }

    #[test]
    fn flat_series_returns_none() {
        let v = vec![10.0; 30];
        assert!(calculate_zscore(&v, 30).is_none());
    }

    #[test]
    fn outlier_has_large_zscore() {
        let mut v = vec![100.0; 29];
        v.push(200.0);
        let z = calculate_zscore(&v, 30).expect("should compute");
        assert!(z > 3.0, "z={z}");
    }

    #[test]
    fn value_at_mean_has_zero_zscore() {
        let mut v: Vec<f64> = (0..29).map(|i| 100.0 + (i as f64 % 2.0)).collect();
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        v.push(mean);
        let z = calculate_zscore(&v, 30).unwrap();
        assert!(z.abs() < 0.5, "z={z}");
    }
}
