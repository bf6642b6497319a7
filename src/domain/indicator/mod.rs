//! Technical indicators and the engine that replays them.
//!
//! Each indicator kind lives in its own module as a pure function over one
//! instrument's series. This module provides:
//! - `IndicatorSpec`: a tagged description of one indicator call, carrying
//!   every argument needed to recompute it
//! - `apply`: the dispatcher that runs a spec against a table, group by group
//! - `IndicatorEngine`: the registry that remembers specs in registration
//!   order and re-runs them after new rows arrive

pub mod alligator;
pub mod atr;
pub mod bollinger;
pub mod donchian;
pub mod macd;
pub mod moving_average;
pub mod parabolic_sar;
pub mod roc;
pub mod rsi;
pub mod stddev;
pub mod stochastic;
pub mod supertrend;

use std::fmt;
use tracing::{debug, info};

use crate::domain::error::CandlebotError;
use crate::domain::strategy::{self, StrategyKind};
use crate::domain::table::{GroupView, TimeSeriesTable};

pub use rsi::RsiSmoothing;

/// One indicator invocation with its arguments.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum IndicatorSpec {
    ChangeInPrice {
        output: String,
    },
    Sma {
        period: usize,
        field: String,
        output: String,
    },
    Ema {
        period: usize,
        field: String,
        output: String,
    },
    /// Smoothed moving average of the median price.
    Smma {
        period: usize,
        output: String,
    },
    Rsi {
        period: usize,
        smoothing: RsiSmoothing,
        output: String,
    },
    RateOfChange {
        period: usize,
        output: String,
    },
    StandardDeviation {
        period: usize,
        field: String,
        output: String,
    },
    RollingSum {
        period: usize,
        field: String,
        output: String,
    },
    HighestHigh {
        period: usize,
        output: String,
    },
    LowestLow {
        period: usize,
        output: String,
    },
    AverageTrueRange {
        period: usize,
        output: String,
    },
    /// Writes `macd`, `signal_line`, `macd_histogram`.
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    /// Writes `band_upper`, `band_middle`, `band_lower`, `band_width`, `band_diff`.
    Bollinger {
        period: usize,
        multiplier: f64,
    },
    /// Writes `donchian_upper`, `donchian_middle`, `donchian_lower`.
    Donchian {
        high_period: usize,
        low_period: usize,
    },
    /// Writes `lips`, `teeth`, `jaw`.
    Alligator,
    AwesomeOscillator {
        output: String,
    },
    /// Writes `stoch_k`, `stoch_d`.
    Stochastic {
        period: usize,
        smoothing: usize,
    },
    /// Writes `smi`, `smi_signal`.
    StochasticMomentum {
        k_period: usize,
        k_smoothing: usize,
        k_double_smoothing: usize,
        d_period: usize,
    },
    /// Writes `psar_bull`, `psar_bear`.
    ParabolicSar {
        min_af: f64,
        max_af: f64,
    },
    /// Writes `supertrend`, `final_upperband`, `final_lowerband`.
    Supertrend {
        atr_length: usize,
        multiplier: f64,
    },
    /// A strategy recipe; writes the signal columns.
    Strategy {
        recipe: StrategyKind,
    },
}

impl IndicatorSpec {
    /// Columns this spec writes. Two specs with the same outputs are the
    /// same registry entry.
    pub fn outputs(&self) -> Vec<String> {
        let fixed: &[&str] = match self {
            IndicatorSpec::ChangeInPrice { output }
            | IndicatorSpec::Sma { output, .. }
            | IndicatorSpec::Ema { output, .. }
            | IndicatorSpec::Smma { output, .. }
            | IndicatorSpec::Rsi { output, .. }
            | IndicatorSpec::RateOfChange { output, .. }
            | IndicatorSpec::StandardDeviation { output, .. }
            | IndicatorSpec::RollingSum { output, .. }
            | IndicatorSpec::HighestHigh { output, .. }
            | IndicatorSpec::LowestLow { output, .. }
            | IndicatorSpec::AverageTrueRange { output, .. }
            | IndicatorSpec::AwesomeOscillator { output } => return vec![output.clone()],
            IndicatorSpec::Macd { .. } => &["macd", "signal_line", "macd_histogram"],
            IndicatorSpec::Bollinger { .. } => &[
                "band_upper",
                "band_middle",
                "band_lower",
                "band_width",
                "band_diff",
            ],
            IndicatorSpec::Donchian { .. } => &["donchian_upper", "donchian_middle", "donchian_lower"],
            IndicatorSpec::Alligator => &["lips", "teeth", "jaw"],
            IndicatorSpec::Stochastic { .. } => &["stoch_k", "stoch_d"],
            IndicatorSpec::StochasticMomentum { .. } => &["smi", "smi_signal"],
            IndicatorSpec::ParabolicSar { .. } => &["psar_bull", "psar_bear"],
            IndicatorSpec::Supertrend { .. } => &["supertrend", "final_upperband", "final_lowerband"],
            IndicatorSpec::Strategy { .. } => &strategy::SIGNAL_COLUMNS,
        };
        fixed.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorSpec::ChangeInPrice { output } => write!(f, "CHANGE_IN_PRICE -> {output}"),
            IndicatorSpec::Sma {
                period,
                field,
                output,
            } => write!(f, "SMA({period},{field}) -> {output}"),
            IndicatorSpec::Ema {
                period,
                field,
                output,
            } => write!(f, "EMA({period},{field}) -> {output}"),
            IndicatorSpec::Smma { period, output } => write!(f, "SMMA({period}) -> {output}"),
            IndicatorSpec::Rsi {
                period,
                smoothing,
                output,
            } => write!(f, "RSI({period},{smoothing}) -> {output}"),
            IndicatorSpec::RateOfChange { period, output } => write!(f, "ROC({period}) -> {output}"),
            IndicatorSpec::StandardDeviation {
                period,
                field,
                output,
            } => write!(f, "STDDEV({period},{field}) -> {output}"),
            IndicatorSpec::RollingSum {
                period,
                field,
                output,
            } => write!(f, "SUM({period},{field}) -> {output}"),
            IndicatorSpec::HighestHigh { period, output } => write!(f, "HIGHEST({period}) -> {output}"),
            IndicatorSpec::LowestLow { period, output } => write!(f, "LOWEST({period}) -> {output}"),
            IndicatorSpec::AverageTrueRange { period, output } => write!(f, "ATR({period}) -> {output}"),
            IndicatorSpec::Macd { fast, slow, signal } => write!(f, "MACD({fast},{slow},{signal})"),
            IndicatorSpec::Bollinger { period, multiplier } => {
                write!(f, "BOLLINGER({period},{multiplier})")
            }
            IndicatorSpec::Donchian {
                high_period,
                low_period,
            } => write!(f, "DONCHIAN({high_period},{low_period})"),
            IndicatorSpec::Alligator => write!(f, "ALLIGATOR"),
            IndicatorSpec::AwesomeOscillator { output } => write!(f, "AO -> {output}"),
            IndicatorSpec::Stochastic { period, smoothing } => {
                write!(f, "STOCHASTIC({period},{smoothing})")
            }
            IndicatorSpec::StochasticMomentum {
                k_period,
                k_smoothing,
                k_double_smoothing,
                d_period,
            } => write!(f, "SMI({k_period},{k_smoothing},{k_double_smoothing},{d_period})"),
            IndicatorSpec::ParabolicSar { min_af, max_af } => write!(f, "PSAR({min_af},{max_af})"),
            IndicatorSpec::Supertrend {
                atr_length,
                multiplier,
            } => write!(f, "SUPERTREND({atr_length},{multiplier})"),
            IndicatorSpec::Strategy { recipe } => write!(f, "STRATEGY({recipe})"),
        }
    }
}

/// Compute `spec` over every instrument and write its columns into `table`.
pub fn apply(table: &mut TimeSeriesTable, spec: &IndicatorSpec) -> Result<(), CandlebotError> {
    match spec {
        IndicatorSpec::ChangeInPrice { output } => write_column(table, output, |g| {
            Ok(roc::calculate_change_in_price(g.numeric("close")?))
        }),
        IndicatorSpec::Sma {
            period,
            field,
            output,
        } => write_column(table, output, |g| {
            Ok(moving_average::calculate_sma(g.numeric(field)?, *period))
        }),
        IndicatorSpec::Ema {
            period,
            field,
            output,
        } => write_column(table, output, |g| {
            Ok(moving_average::calculate_ema(g.numeric(field)?, *period))
        }),
        IndicatorSpec::Smma { period, output } => write_column(table, output, |g| {
            let median = alligator::median_prices(g.numeric("high")?, g.numeric("low")?);
            Ok(moving_average::calculate_smma(&median, *period))
        }),
        IndicatorSpec::Rsi {
            period,
            smoothing,
            output,
        } => write_column(table, output, |g| {
            Ok(rsi::calculate_rsi(g.numeric("close")?, *period, *smoothing))
        }),
        IndicatorSpec::RateOfChange { period, output } => write_column(table, output, |g| {
            Ok(roc::calculate_roc(g.numeric("close")?, *period))
        }),
        IndicatorSpec::StandardDeviation {
            period,
            field,
            output,
        } => write_column(table, output, |g| {
            Ok(stddev::calculate_stddev(g.numeric(field)?, *period))
        }),
        IndicatorSpec::RollingSum {
            period,
            field,
            output,
        } => write_column(table, output, |g| {
            Ok(stddev::calculate_rolling_sum(g.numeric(field)?, *period))
        }),
        IndicatorSpec::HighestHigh { period, output } => write_column(table, output, |g| {
            Ok(donchian::calculate_highest(g.numeric("high")?, *period))
        }),
        IndicatorSpec::LowestLow { period, output } => write_column(table, output, |g| {
            Ok(donchian::calculate_lowest(g.numeric("low")?, *period))
        }),
        IndicatorSpec::AverageTrueRange { period, output } => write_column(table, output, |g| {
            Ok(atr::calculate_atr(
                g.numeric("high")?,
                g.numeric("low")?,
                g.numeric("close")?,
                *period,
            ))
        }),
        IndicatorSpec::Macd { fast, slow, signal } => {
            write_columns(table, ["macd", "signal_line", "macd_histogram"], |g| {
                let m = macd::calculate_macd(g.numeric("close")?, *fast, *slow, *signal);
                Ok([m.line, m.signal, m.histogram])
            })
        }
        IndicatorSpec::Bollinger { period, multiplier } => write_columns(
            table,
            ["band_upper", "band_middle", "band_lower", "band_width", "band_diff"],
            |g| {
                let b = bollinger::calculate_bollinger(g.numeric("close")?, *period, *multiplier);
                Ok([b.upper, b.middle, b.lower, b.width, b.diff])
            },
        ),
        IndicatorSpec::Donchian {
            high_period,
            low_period,
        } => write_columns(
            table,
            ["donchian_upper", "donchian_middle", "donchian_lower"],
            |g| {
                let ch = donchian::calculate_donchian(
                    g.numeric("high")?,
                    g.numeric("low")?,
                    *high_period,
                    *low_period,
                );
                Ok([ch.upper, ch.middle, ch.lower])
            },
        ),
        IndicatorSpec::Alligator => write_columns(table, ["lips", "teeth", "jaw"], |g| {
            let median = alligator::median_prices(g.numeric("high")?, g.numeric("low")?);
            let lines = alligator::calculate_alligator(&median);
            Ok([lines.lips, lines.teeth, lines.jaw])
        }),
        IndicatorSpec::AwesomeOscillator { output } => write_column(table, output, |g| {
            let median = alligator::median_prices(g.numeric("high")?, g.numeric("low")?);
            Ok(alligator::calculate_awesome_oscillator(&median))
        }),
        IndicatorSpec::Stochastic { period, smoothing } => {
            write_columns(table, ["stoch_k", "stoch_d"], |g| {
                let st = stochastic::calculate_stochastic(
                    g.numeric("high")?,
                    g.numeric("low")?,
                    g.numeric("close")?,
                    *period,
                    *smoothing,
                );
                Ok([st.k, st.d])
            })
        }
        IndicatorSpec::StochasticMomentum {
            k_period,
            k_smoothing,
            k_double_smoothing,
            d_period,
        } => write_columns(table, ["smi", "smi_signal"], |g| {
            let smi = stochastic::calculate_smi(
                g.numeric("high")?,
                g.numeric("low")?,
                g.numeric("close")?,
                *k_period,
                *k_smoothing,
                *k_double_smoothing,
                *d_period,
            );
            Ok([smi.smi, smi.signal])
        }),
        IndicatorSpec::ParabolicSar { min_af, max_af } => {
            write_columns(table, ["psar_bull", "psar_bear"], |g| {
                let sar = parabolic_sar::calculate_parabolic_sar(
                    g.numeric("high")?,
                    g.numeric("low")?,
                    g.numeric("close")?,
                    *min_af,
                    *max_af,
                );
                Ok([sar.bull, sar.bear])
            })
        }
        IndicatorSpec::Supertrend {
            atr_length,
            multiplier,
        } => write_columns(
            table,
            ["supertrend", "final_upperband", "final_lowerband"],
            |g| {
                let st = supertrend::calculate_supertrend(
                    g.numeric("high")?,
                    g.numeric("low")?,
                    g.numeric("close")?,
                    *atr_length,
                    *multiplier,
                );
                Ok([st.direction, st.upper, st.lower])
            },
        ),
        IndicatorSpec::Strategy { recipe } => strategy::apply_strategy(table, *recipe),
    }
}

fn write_column<F>(table: &mut TimeSeriesTable, output: &str, mut f: F) -> Result<(), CandlebotError>
where
    F: FnMut(&GroupView<'_>) -> Result<Vec<f64>, CandlebotError>,
{
    let values = table.map_groups(|g| f(&g))?;
    table.set_numeric(output, values)
}

fn write_columns<const N: usize, F>(
    table: &mut TimeSeriesTable,
    outputs: [&str; N],
    mut f: F,
) -> Result<(), CandlebotError>
where
    F: FnMut(&GroupView<'_>) -> Result<[Vec<f64>; N], CandlebotError>,
{
    let rows: Vec<[f64; N]> = table.map_groups(|g| {
        let columns = f(&g)?;
        let len = g.len();
        if let Some(pos) = columns.iter().position(|c| c.len() != len) {
            return Err(CandlebotError::Schema {
                row: g.rows().start,
                field: outputs[pos].to_string(),
                reason: format!("indicator produced {} values for {len} rows", columns[pos].len()),
            });
        }
        Ok((0..len)
            .map(|i| std::array::from_fn(|c| columns[c][i]))
            .collect())
    })?;

    for (c, name) in outputs.iter().enumerate() {
        table.set_numeric(name, rows.iter().map(|r| r[c]).collect())?;
    }
    Ok(())
}

/// Registry of applied indicators, replayed in registration order by
/// [`IndicatorEngine::refresh`].
///
/// A composite must be registered after the indicators it reads.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    specs: Vec<IndicatorSpec>,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute `spec` now and remember it. A spec writing the same columns
    /// as an earlier one replaces it in place.
    pub fn register(&mut self, table: &mut TimeSeriesTable, spec: IndicatorSpec) -> Result<(), CandlebotError> {
        apply(table, &spec)?;
        debug!(indicator = %spec, "registered indicator");

        let outputs = spec.outputs();
        match self.specs.iter().position(|s| s.outputs() == outputs) {
            Some(i) => self.specs[i] = spec,
            None => self.specs.push(spec),
        }
        Ok(())
    }

    /// Re-run every registered spec against the (possibly extended) table.
    pub fn refresh(&self, table: &mut TimeSeriesTable) -> Result<(), CandlebotError> {
        for spec in &self.specs {
            apply(table, spec)?;
        }
        info!(indicators = self.specs.len(), rows = table.len(), "refreshed indicators");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Human-readable description of each registered spec.
    pub fn describe(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::CandleRecord;

    fn table(n: usize) -> TimeSeriesTable {
        let mut records = Vec::new();
        for (inst, base) in [("1", 100.0), ("2", 500.0)] {
            for i in 0..n {
                let close = base + i as f64;
                records.push(CandleRecord::new(
                    inst,
                    &day(i).to_string(),
                    close - 0.5,
                    close + 1.0,
                    close - 1.0,
                    close,
                ));
            }
        }
        TimeSeriesTable::build(&records).unwrap()
    }

    fn day(i: usize) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64)
    }

    fn sma(period: usize, output: &str) -> IndicatorSpec {
        IndicatorSpec::Sma {
            period,
            field: "close".into(),
            output: output.into(),
        }
    }

    #[test]
    fn display_formats() {
        assert_eq!(sma(20, "sma_20").to_string(), "SMA(20,close) -> sma_20");
        let macd = IndicatorSpec::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
        let boll = IndicatorSpec::Bollinger {
            period: 20,
            multiplier: 2.0,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn outputs_for_composites() {
        let sar = IndicatorSpec::ParabolicSar {
            min_af: 0.02,
            max_af: 0.2,
        };
        assert_eq!(sar.outputs(), vec!["psar_bull".to_string(), "psar_bear".to_string()]);
        assert_eq!(sma(5, "fast").outputs(), vec!["fast".to_string()]);
    }

    #[test]
    fn windows_do_not_cross_instruments() {
        let mut t = table(4);
        apply(&mut t, &sma(3, "sma_3")).unwrap();
        let v = t.numeric("sma_3").unwrap();
        // rows 4..8 are instrument "2"; its first two values must be warmup
        assert!(v[4].is_nan());
        assert!(v[5].is_nan());
        assert!((v[6] - 501.0).abs() < 1e-12);
        assert!((v[2] - 101.0).abs() < 1e-12);
    }

    #[test]
    fn composite_writes_all_columns() {
        let mut t = table(30);
        apply(
            &mut t,
            &IndicatorSpec::Macd {
                fast: 3,
                slow: 6,
                signal: 3,
            },
        )
        .unwrap();
        t.require_columns(&["macd", "signal_line", "macd_histogram"]).unwrap();
    }

    #[test]
    fn missing_field_is_reported() {
        let mut t = table(3);
        let spec = IndicatorSpec::Ema {
            period: 3,
            field: "rsi".into(),
            output: "rsi_ema".into(),
        };
        assert!(matches!(
            apply(&mut t, &spec),
            Err(CandlebotError::MissingColumn { .. })
        ));
        assert!(!t.has_column("rsi_ema"));
    }

    #[test]
    fn register_replaces_same_output() {
        let mut t = table(5);
        let mut engine = IndicatorEngine::new();
        engine.register(&mut t, sma(2, "ma")).unwrap();
        engine.register(&mut t, sma(3, "ma")).unwrap();
        engine.register(&mut t, sma(3, "other")).unwrap();
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.describe()[0], "SMA(3,close) -> ma");
    }

    #[test]
    fn failed_register_is_not_recorded() {
        let mut t = table(3);
        let mut engine = IndicatorEngine::new();
        let spec = IndicatorSpec::Sma {
            period: 2,
            field: "nope".into(),
            output: "x".into(),
        };
        assert!(engine.register(&mut t, spec).is_err());
        assert!(engine.is_empty());
    }

    #[test]
    fn refresh_extends_into_appended_rows() {
        let mut t = table(5);
        let mut engine = IndicatorEngine::new();
        engine.register(&mut t, sma(2, "ma")).unwrap();
        t.append(&[CandleRecord::new("1", &day(5).to_string(), 104.5, 106.0, 104.0, 105.0)])
            .unwrap();
        assert!(t.numeric("ma").unwrap()[5].is_nan());

        engine.refresh(&mut t).unwrap();
        assert!((t.numeric("ma").unwrap()[5] - 104.5).abs() < 1e-12);
    }

    #[test]
    fn refresh_is_idempotent() {
        let mut t = table(40);
        let mut engine = IndicatorEngine::new();
        engine.register(&mut t, IndicatorSpec::Alligator).unwrap();
        engine
            .register(
                &mut t,
                IndicatorSpec::Supertrend {
                    atr_length: 10,
                    multiplier: 3.0,
                },
            )
            .unwrap();
        engine.refresh(&mut t).unwrap();
        let once = t.clone();
        engine.refresh(&mut t).unwrap();
        for name in once.column_names() {
            let a = once.numeric(name).unwrap();
            let b = t.numeric(name).unwrap();
            assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
    }
}
