//! Supertrend.
//!
//! Basic bands sit `multiplier × ATR(atr_length)` above and below the
//! median price. The final upper band only moves down (and the lower band
//! only up) unless the previous close broke through it. Direction turns up
//! when the close crosses above the prior final upper band and down when it
//! crosses below the prior final lower band; otherwise it carries over.
//!
//! Output: direction (+1 / -1), and the final bands with the inactive side
//! `NaN` (the upper band is hidden while the trend is up). Everything is
//! `NaN` until the ATR is warm.

use crate::domain::indicator::alligator::median_prices;
use crate::domain::indicator::atr::calculate_atr;

pub const DEFAULT_ATR_LENGTH: usize = 10;
pub const DEFAULT_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendSeries {
    pub direction: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn calculate_supertrend(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    atr_length: usize,
    multiplier: f64,
) -> SupertrendSeries {
    let n = close.len();
    let atr = calculate_atr(high, low, close, atr_length);
    let median = median_prices(high, low);

    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    let mut direction = vec![f64::NAN; n];

    for i in 0..n {
        if atr[i].is_nan() {
            continue;
        }
        let basic_upper = median[i] + multiplier * atr[i];
        let basic_lower = median[i] - multiplier * atr[i];

        let started = i > 0 && !direction[i - 1].is_nan();
        if !started {
            upper[i] = basic_upper;
            lower[i] = basic_lower;
            direction[i] = -1.0;
            continue;
        }

        let (prev_upper, prev_lower, prev_close) = (upper[i - 1], lower[i - 1], close[i - 1]);
        upper[i] = if basic_upper < prev_upper || prev_close > prev_upper {
            basic_upper
        } else {
            prev_upper
        };
        lower[i] = if basic_lower > prev_lower || prev_close < prev_lower {
            basic_lower
        } else {
            prev_lower
        };

        direction[i] = if close[i] > prev_upper {
            1.0
        } else if close[i] < prev_lower {
            -1.0
        } else {
            direction[i - 1]
        };
    }

    let upper_out = upper
        .iter()
        .zip(&direction)
        .map(|(&u, &d)| if d == 1.0 { f64::NAN } else { u })
        .collect();
    let lower_out = lower
        .iter()
        .zip(&direction)
        .map(|(&l, &d)| if d == -1.0 { f64::NAN } else { l })
        .collect();

    SupertrendSeries {
        direction,
        upper: upper_out,
        lower: lower_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let high = closes.iter().map(|c| c + 1.0).collect();
        let low = closes.iter().map(|c| c - 1.0).collect();
        (high, low, closes.to_vec())
    }

    #[test]
    fn warmup_is_nan() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let (h, l, c) = series(&closes);
        let st = calculate_supertrend(&h, &l, &c, 10, 3.0);
        assert!(st.direction[8].is_nan());
        assert!(!st.direction[9].is_nan());
    }

    #[test]
    fn strong_uptrend_turns_up_and_hides_upper_band() {
        let mut closes: Vec<f64> = vec![100.0; 12];
        closes.extend((1..20).map(|i| 100.0 + 8.0 * i as f64));
        let (h, l, c) = series(&closes);
        let st = calculate_supertrend(&h, &l, &c, 10, 3.0);
        let last = closes.len() - 1;
        assert_eq!(st.direction[last], 1.0);
        assert!(st.upper[last].is_nan());
        assert!(st.lower[last] < closes[last]);
    }

    #[test]
    fn lower_band_never_falls_in_uptrend() {
        let mut closes: Vec<f64> = vec![100.0; 12];
        closes.extend((1..30).map(|i| 100.0 + 8.0 * i as f64));
        let (h, l, c) = series(&closes);
        let st = calculate_supertrend(&h, &l, &c, 10, 3.0);
        let up: Vec<usize> = (1..closes.len())
            .filter(|&i| st.direction[i] == 1.0 && st.direction[i - 1] == 1.0)
            .collect();
        assert!(!up.is_empty());
        for i in up {
            assert!(st.lower[i] >= st.lower[i - 1]);
        }
    }

    #[test]
    fn crash_turns_down_and_hides_lower_band() {
        let mut closes: Vec<f64> = vec![200.0; 12];
        closes.extend((1..20).map(|i| 200.0 - 8.0 * i as f64));
        let (h, l, c) = series(&closes);
        let st = calculate_supertrend(&h, &l, &c, 10, 3.0);
        let last = closes.len() - 1;
        assert_eq!(st.direction[last], -1.0);
        assert!(st.lower[last].is_nan());
        assert!(st.upper[last] > closes[last]);
    }

    #[test]
    fn direction_is_plus_or_minus_one() {
        let closes: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.4).sin() * 10.0).collect();
        let (h, l, c) = series(&closes);
        let st = calculate_supertrend(&h, &l, &c, 10, 3.0);
        for d in st.direction.iter().filter(|d| !d.is_nan()) {
            assert!(*d == 1.0 || *d == -1.0);
        }
    }
}
