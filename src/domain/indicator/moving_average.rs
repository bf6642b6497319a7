//! Moving averages: simple, exponential, smoothed.
//!
//! SMA warmup: the first (n-1) bars are `NaN`.
//! EMA is the adjusted span-weighted mean, defined from the first bar.
//! SMMA is an EMA with span 2n-1, conventionally fed the median price.

use crate::domain::indicator_helpers::{ewm_mean, rolling_mean, span_alpha};

pub fn calculate_sma(values: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(values, period)
}

pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    calculate_ema_min_periods(values, period, 0)
}

/// EMA that stays `NaN` until `min_periods` observations have been seen.
pub fn calculate_ema_min_periods(values: &[f64], period: usize, min_periods: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    ewm_mean(values, span_alpha(period as f64), min_periods)
}

pub fn calculate_smma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    calculate_ema(values, 2 * period - 1)
}
