//! Population standard deviation helpers.
//!
//! Divides by N, not N-1. Shared by Bollinger Bands and the Sharpe ratio.

/// Population standard deviation of `values` about a precomputed `mean`.
pub fn population_stddev_about(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Mean and population standard deviation; `None` for an empty slice.
pub fn mean_and_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((mean, population_stddev_about(values, mean)))
}
