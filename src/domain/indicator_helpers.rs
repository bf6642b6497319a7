//! Shared numeric primitives for indicator calculations.
//!
//! All functions take one instrument's series and return a series of the
//! same length. `NaN` marks "no value": warm-up bars and propagated nulls.

/// Rolling arithmetic mean; `NaN` until `window` values are available or
/// while the window contains a null.
pub fn rolling_mean(xs: &[f64], window: usize) -> Vec<f64> {
    rolling_sum(xs, window)
        .into_iter()
        .map(|s| s / window as f64)
        .collect()
}

pub fn rolling_sum(xs: &[f64], window: usize) -> Vec<f64> {
    rolling(xs, window, |w| w.iter().sum())
}

/// Rolling sample standard deviation (n - 1 denominator).
pub fn rolling_std(xs: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; xs.len()];
    }
    rolling(xs, window, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (w.len() - 1) as f64;
        var.sqrt()
    })
}

pub fn rolling_max(xs: &[f64], window: usize) -> Vec<f64> {
    rolling(xs, window, |w| w.iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

pub fn rolling_min(xs: &[f64], window: usize) -> Vec<f64> {
    rolling(xs, window, |w| w.iter().copied().fold(f64::INFINITY, f64::min))
}

fn rolling<F>(xs: &[f64], window: usize, f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    if window == 0 {
        return vec![f64::NAN; xs.len()];
    }
    (0..xs.len())
        .map(|i| {
            if i + 1 < window {
                return f64::NAN;
            }
            let w = &xs[i + 1 - window..=i];
            if w.iter().any(|x| x.is_nan()) {
                f64::NAN
            } else {
                f(w)
            }
        })
        .collect()
}

/// Smoothing factor for a span: 2 / (span + 1).
pub fn span_alpha(span: f64) -> f64 {
    2.0 / (span + 1.0)
}

/// Smoothing factor for a center of mass: 1 / (1 + com).
pub fn com_alpha(com: f64) -> f64 {
    1.0 / (1.0 + com)
}

/// Adjusted exponentially weighted mean.
///
/// Each output is sum((1-a)^i * x[t-i]) / sum((1-a)^i) over the non-null
/// observations so far. Nulls still age the weights. Outputs stay `NaN`
/// until `min_periods` non-null observations have been seen.
pub fn ewm_mean(xs: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut num = 0.0;
    let mut den = 0.0;
    let mut seen = 0usize;

    xs.iter()
        .map(|&x| {
            num *= decay;
            den *= decay;
            if !x.is_nan() {
                num += x;
                den += 1.0;
                seen += 1;
            }
            if seen >= min_periods.max(1) && den > 0.0 {
                num / den
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Move every value `periods` bars later; the first `periods` become `NaN`.
pub fn shift(xs: &[f64], periods: usize) -> Vec<f64> {
    (0..xs.len())
        .map(|i| if i < periods { f64::NAN } else { xs[i - periods] })
        .collect()
}

/// x[t] - x[t - periods].
pub fn diff(xs: &[f64], periods: usize) -> Vec<f64> {
    (0..xs.len())
        .map(|i| if i < periods { f64::NAN } else { xs[i] - xs[i - periods] })
        .collect()
}

/// True range per bar; the first bar uses high - low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let hl = (high[i] - low[i]).abs();
            if i == 0 {
                return hl;
            }
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_series(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            if e.is_nan() {
                assert!(a.is_nan(), "index {i}: expected NaN, got {a}");
            } else {
                assert_relative_eq!(*a, *e, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rolling_mean_warmup() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_series(&out, &[f64::NAN, f64::NAN, 2.0, 3.0]);
    }

    #[test]
    fn rolling_mean_propagates_nulls() {
        let out = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0, 5.0], 2);
        assert_series(&out, &[f64::NAN, f64::NAN, f64::NAN, 3.5, 4.5]);
    }

    #[test]
    fn rolling_mean_zero_window() {
        assert!(rolling_mean(&[1.0, 2.0], 0).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn rolling_std_sample() {
        // sample std of [2, 4, 4, 4, 5, 5, 7, 9] = 2.138...
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let out = rolling_std(&xs, 8);
        assert_relative_eq!(out[7], 2.138_089_935_299_395, epsilon = 1e-12);
        assert!(out[6].is_nan());
    }

    #[test]
    fn rolling_extremes() {
        let xs = [3.0, 1.0, 4.0, 1.0, 5.0];
        assert_series(&rolling_max(&xs, 2), &[f64::NAN, 3.0, 4.0, 4.0, 5.0]);
        assert_series(&rolling_min(&xs, 3), &[f64::NAN, f64::NAN, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn ewm_mean_adjusted_weights() {
        // span 3 → alpha 0.5; second value = (2 + 0.5*1) / 1.5
        let out = ewm_mean(&[1.0, 2.0, 3.0], span_alpha(3.0), 0);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 2.5 / 1.5, epsilon = 1e-12);
        assert_relative_eq!(out[2], (3.0 + 1.0 + 0.25) / 1.75, epsilon = 1e-12);
    }

    #[test]
    fn ewm_mean_min_periods_and_leading_nulls() {
        let out = ewm_mean(&[f64::NAN, 4.0, 4.0, 4.0], 0.5, 2);
        assert_series(&out, &[f64::NAN, f64::NAN, 4.0, 4.0]);
    }

    #[test]
    fn ewm_mean_constant_series() {
        let out = ewm_mean(&[7.0; 10], com_alpha(13.0), 0);
        assert!(out.iter().all(|x| (x - 7.0).abs() < 1e-12));
    }

    #[test]
    fn shift_and_diff() {
        let xs = [1.0, 3.0, 6.0];
        assert_series(&shift(&xs, 1), &[f64::NAN, 1.0, 3.0]);
        assert_series(&diff(&xs, 1), &[f64::NAN, 2.0, 3.0]);
        assert!(shift(&xs, 5).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn true_range_uses_previous_close() {
        let tr = true_range(&[110.0, 130.0], &[100.0, 120.0], &[105.0, 125.0]);
        assert_series(&tr, &[10.0, 25.0]);
    }
}
