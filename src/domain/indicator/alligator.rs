//! Williams alligator and awesome oscillator, both built on the median price.
//!
//! Lips = SMMA(5) shifted 3, Teeth = SMMA(8) shifted 5, Jaw = SMMA(13) shifted 8.
//! AO = SMA(5) - SMA(34).

use crate::domain::indicator::moving_average::{calculate_sma, calculate_smma};
use crate::domain::indicator_helpers::shift;

#[derive(Debug, Clone, PartialEq)]
pub struct AlligatorLines {
    pub lips: Vec<f64>,
    pub teeth: Vec<f64>,
    pub jaw: Vec<f64>,
}

pub fn median_prices(high: &[f64], low: &[f64]) -> Vec<f64> {
    high.iter().zip(low).map(|(h, l)| (h + l) / 2.0).collect()
}

pub fn calculate_alligator(median: &[f64]) -> AlligatorLines {
    AlligatorLines {
        lips: shift(&calculate_smma(median, 5), 3),
        teeth: shift(&calculate_smma(median, 8), 5),
        jaw: shift(&calculate_smma(median, 13), 8),
    }
}

pub fn calculate_awesome_oscillator(median: &[f64]) -> Vec<f64> {
    let fast = calculate_sma(median, 5);
    let slow = calculate_sma(median, 34);
    fast.iter().zip(&slow).map(|(f, s)| f - s).collect()
}
