//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for average gain/loss:
//! - First average: simple mean of the first n gains/losses
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); RSI = 100 when avg_loss == 0.
//! Needs n+1 prices; the first n positions are undefined.

use super::Series;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(prices: &[f64], period: usize) -> Series {
    if period == 0 || prices.len() < period + 1 {
        return vec![None; prices.len()];
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;

    let mut values: Series = vec![None; period];
    values.reserve(prices.len() - period);
    values.push(Some(rsi_from_averages(avg_gain, avg_loss)));

    let n = period as f64;
    for &change in &changes[period..] {
        avg_gain = (avg_gain * (n - 1.0) + gain(change)) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss(change)) / n;
        values.push(Some(rsi_from_averages(avg_gain, avg_loss)));
    }

    values
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn rsi_empty() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_needs_period_plus_one() {
        let prices: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&prices, 14);
        assert_eq!(series.len(), 14);
        assert!(series.iter().all(|v| v.is_none()));
    }

    #[test]
    fn rsi_warmup_period() {
        let prices: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&prices, 14);

        assert_eq!(series.len(), 15);
        for (i, value) in series.iter().enumerate().take(14) {
            assert!(value.is_none(), "position {} should be undefined", i);
        }
        assert!(series[14].is_some());
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&prices, 14);
        assert_eq!(series[14], Some(100.0));
    }

    #[test]
    fn rsi_flat_prices_is_100() {
        let series = calculate_rsi(&[50.0; 20], 14);
        for value in series.iter().flatten() {
            assert_eq!(*value, 100.0);
        }
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&prices, 14);
        assert_relative_eq!(series[14].unwrap(), 0.0);
    }

    #[test]
    fn rsi_wilder_smoothing_step() {
        // period 2: changes +1, -1, +2
        let series = calculate_rsi(&[10.0, 11.0, 10.0, 12.0], 2);
        assert!(series[0].is_none());
        assert!(series[1].is_none());
        // seed: gain 0.5, loss 0.5 → RSI 50
        assert_relative_eq!(series[2].unwrap(), 50.0);
        // next: gain (0.5 + 2)/2 = 1.25, loss (0.5 + 0)/2 = 0.25 → RS 5
        assert_relative_eq!(series[3].unwrap(), 100.0 - 100.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn rsi_known_calculation() {
        let prices = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let rsi = calculate_rsi(&prices, 14)[14].unwrap();
        assert!(rsi > 50.0 && rsi < 100.0, "RSI should be in bullish territory");
    }

    proptest! {
        #[test]
        fn rsi_in_range(prices in proptest::collection::vec(1.0f64..1_000.0, 0..100)) {
            for value in calculate_rsi(&prices, DEFAULT_PERIOD).iter().flatten() {
                prop_assert!((0.0..=100.0).contains(value), "RSI {} out of range", value);
            }
        }

        #[test]
        fn rsi_is_100_only_without_losses(
            steps in proptest::collection::vec(0.0f64..5.0, 15..40),
        ) {
            let mut price = 100.0;
            let mut prices = vec![price];
            for step in steps {
                price += step;
                prices.push(price);
            }
            for value in calculate_rsi(&prices, DEFAULT_PERIOD).iter().flatten() {
                prop_assert_eq!(*value, 100.0);
            }
        }
    }
}
