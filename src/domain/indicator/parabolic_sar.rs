//! Parabolic SAR (stop and reverse).
//!
//! A stateful recurrence, run independently per instrument:
//! - start long with af = min_af, extreme points = first bar's high/low, and
//!   the stop seeded from the close;
//! - each bar from the third onward moves the stop toward the extreme point
//!   by af × (extreme - prior stop);
//! - price crossing the stop flips the direction, resets af and puts the
//!   stop at the old extreme;
//! - otherwise a new extreme raises af by min_af (capped at max_af) and the
//!   stop is clamped so it never passes the prior two bars' lows (long) or
//!   highs (short).
//!
//! The stop lands in `bull` or `bear` depending on direction; the inactive
//! side is `NaN`. The first two bars have no stop.

pub const DEFAULT_MIN_AF: f64 = 0.02;
pub const DEFAULT_MAX_AF: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct ParabolicSar {
    pub bull: Vec<f64>,
    pub bear: Vec<f64>,
}

pub fn calculate_parabolic_sar(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    min_af: f64,
    max_af: f64,
) -> ParabolicSar {
    let n = close.len();
    let mut bull_out = vec![f64::NAN; n];
    let mut bear_out = vec![f64::NAN; n];
    if n == 0 {
        return ParabolicSar {
            bull: bull_out,
            bear: bear_out,
        };
    }

    let mut psar = close.to_vec();
    let mut bull = true;
    let mut af = min_af;
    let mut hp = high[0];
    let mut lp = low[0];

    for i in 2..n {
        let prior = psar[i - 1];
        psar[i] = if bull {
            prior + af * (hp - prior)
        } else {
            prior + af * (lp - prior)
        };

        let mut reverse = false;
        if bull && low[i] < psar[i] {
            bull = false;
            reverse = true;
            psar[i] = hp;
            lp = low[i];
            af = min_af;
        } else if !bull && high[i] > psar[i] {
            bull = true;
            reverse = true;
            psar[i] = lp;
            hp = high[i];
            af = min_af;
        }

        if !reverse {
            if bull {
                if high[i] > hp {
                    hp = high[i];
                    af = (af + min_af).min(max_af);
                }
                psar[i] = psar[i].min(low[i - 1]).min(low[i - 2]);
            } else {
                if low[i] < lp {
                    lp = low[i];
                    af = (af + min_af).min(max_af);
                }
                psar[i] = psar[i].max(high[i - 1]).max(high[i - 2]);
            }
        }

        if bull {
            bull_out[i] = psar[i];
        } else {
            bear_out[i] = psar[i];
        }
    }

    ParabolicSar {
        bull: bull_out,
        bear: bear_out,
    }
}
