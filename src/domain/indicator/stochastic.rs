//! Stochastic oscillator and stochastic momentum index.
//!
//! %K = 100 × (C - LL(n)) / (HH(n) - LL(n)), %D = SMA(m) of %K.
//! Reading: %K and %D below 20 with %K > %D is oversold, above 80 with
//! %K < %D is overbought.
//!
//! SMI measures the close against the midpoint of the n-bar range:
//! SMI = 100 × EMA(EMA(C - mid)) / (EMA(EMA(HH - LL)) / 2), and its signal
//! line is an EMA of SMI. Readings beyond ±40 are extreme.

use crate::domain::indicator::moving_average::{calculate_ema, calculate_sma};
use crate::domain::indicator_helpers::{rolling_max, rolling_min};

#[derive(Debug, Clone, PartialEq)]
pub struct StochasticSeries {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmiSeries {
    pub smi: Vec<f64>,
    pub signal: Vec<f64>,
}

pub fn calculate_stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    smoothing: usize,
) -> StochasticSeries {
    let hh = rolling_max(high, period);
    let ll = rolling_min(low, period);

    let k: Vec<f64> = (0..close.len())
        .map(|i| {
            let range = hh[i] - ll[i];
            if range == 0.0 {
                f64::NAN
            } else {
                (close[i] - ll[i]) * 100.0 / range
            }
        })
        .collect();
    let d = calculate_sma(&k, smoothing);

    StochasticSeries { k, d }
}

pub fn calculate_smi(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    k_smoothing: usize,
    k_double_smoothing: usize,
    d_period: usize,
) -> SmiSeries {
    let hh = rolling_max(high, k_period);
    let ll = rolling_min(low, k_period);

    let distance: Vec<f64> = (0..close.len())
        .map(|i| close[i] - (hh[i] + ll[i]) / 2.0)
        .collect();
    let range: Vec<f64> = hh.iter().zip(&ll).map(|(h, l)| h - l).collect();

    let distance_smooth = calculate_ema(&calculate_ema(&distance, k_smoothing), k_double_smoothing);
    let range_smooth = calculate_ema(&calculate_ema(&range, k_smoothing), k_double_smoothing);

    let smi: Vec<f64> = distance_smooth
        .iter()
        .zip(&range_smooth)
        .map(|(d, r)| {
            let half = r / 2.0;
            if half == 0.0 { f64::NAN } else { 100.0 * d / half }
        })
        .collect();
    let signal = calculate_ema(&smi, d_period);

    SmiSeries { smi, signal }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stochastic_close_at_high_is_100() {
        let high = [10.0, 11.0, 12.0, 13.0];
        let low = [8.0, 9.0, 10.0, 11.0];
        let close = [10.0, 11.0, 12.0, 13.0];
        let st = calculate_stochastic(&high, &low, &close, 3, 2);
        assert!(st.k[1].is_nan());
        assert!((st.k[2] - 100.0).abs() < f64::EPSILON);
        assert!((st.k[3] - 100.0).abs() < f64::EPSILON);
        assert!((st.d[3] - 100.0).abs() < f64::EPSILON);
        assert!(st.d[2].is_nan());
    }

    #[test]
    fn stochastic_midrange() {
        let high = [20.0, 20.0];
        let low = [10.0, 10.0];
        let close = [15.0, 15.0];
        let st = calculate_stochastic(&high, &low, &close, 2, 1);
        assert!((st.k[1] - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stochastic_flat_range_is_undefined() {
        let st = calculate_stochastic(&[5.0; 3], &[5.0; 3], &[5.0; 3], 2, 1);
        assert!(st.k[2].is_nan());
    }

    #[test]
    fn smi_uptrend_is_positive() {
        let close: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let smi = calculate_smi(&high, &low, &close, 10, 3, 3, 10);
        assert!(smi.smi[8].is_nan());
        assert!(smi.smi[39] > 0.0);
        assert!(smi.smi[39] <= 100.0);
        assert!(!smi.signal[39].is_nan());
    }

    #[test]
    fn smi_downtrend_is_negative() {
        let close: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let smi = calculate_smi(&high, &low, &close, 10, 3, 3, 10);
        assert!(smi.smi[39] < 0.0);
    }
}
