//! Donchian channel and highest-high / lowest-low.
//!
//! Upper = highest high over n bars, Lower = lowest low over m bars,
//! Middle = (Upper + Lower) / 2. The channel is shifted one bar so each row
//! compares against the range that closed before it.

use crate::domain::indicator_helpers::{rolling_max, rolling_min, shift};

pub const DEFAULT_PERIOD: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct DonchianChannel {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn calculate_highest(values: &[f64], period: usize) -> Vec<f64> {
    rolling_max(values, period)
}

pub fn calculate_lowest(values: &[f64], period: usize) -> Vec<f64> {
    rolling_min(values, period)
}

pub fn calculate_donchian(high: &[f64], low: &[f64], high_period: usize, low_period: usize) -> DonchianChannel {
    let upper = rolling_max(high, high_period);
    let lower = rolling_min(low, low_period);
    let middle: Vec<f64> = upper.iter().zip(&lower).map(|(u, l)| (u + l) / 2.0).collect();

    DonchianChannel {
        upper: shift(&upper, 1),
        middle: shift(&middle, 1),
        lower: shift(&lower, 1),
    }
}
