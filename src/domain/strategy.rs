//! Built-in strategy recipes.
//!
//! A recipe is a fixed set of indicators plus a per-bar rule that writes the
//! `signal`, `stop_signal`, `take_profit` and `stop_loss` columns. Recipes
//! are registered with the indicator engine like any other composite, so a
//! refresh recomputes their signals after their inputs.

use std::fmt;

use crate::domain::error::CandlebotError;
use crate::domain::indicator::{IndicatorEngine, IndicatorSpec};
use crate::domain::signal::{
    SIGNAL_COLUMN, STOP_LOSS_COLUMN, STOP_SIGNAL_COLUMN, SignalKind, StopSignal, TAKE_PROFIT_COLUMN,
};
use crate::domain::table::{GroupView, TimeSeriesTable};

pub const SIGNAL_COLUMNS: [&str; 4] = [
    SIGNAL_COLUMN,
    STOP_SIGNAL_COLUMN,
    TAKE_PROFIT_COLUMN,
    STOP_LOSS_COLUMN,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum StrategyKind {
    SupertrendPsar,
    EmaCrossover,
    MacdEma,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::SupertrendPsar,
        StrategyKind::EmaCrossover,
        StrategyKind::MacdEma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::SupertrendPsar => "supertrend_psar",
            StrategyKind::EmaCrossover => "ema_crossover",
            StrategyKind::MacdEma => "macd_ema",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::SupertrendPsar => {
                "enter when supertrend and parabolic SAR newly agree; stop at the active band"
            }
            StrategyKind::EmaCrossover => {
                "EMA(9)/EMA(21) cross in the direction of the EMA(200) zone; stop on zone change"
            }
            StrategyKind::MacdEma => {
                "MACD/signal cross in the direction of the EMA(200) zone; stop on the opposite cross"
            }
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CandlebotError> {
        let wanted = name.trim().to_ascii_lowercase();
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| CandlebotError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    /// Indicators the recipe reads, in dependency order, followed by the
    /// recipe itself.
    pub fn indicator_specs(&self) -> Vec<IndicatorSpec> {
        let ema = |period: usize, output: &str| IndicatorSpec::Ema {
            period,
            field: "close".into(),
            output: output.into(),
        };
        let atr = IndicatorSpec::AverageTrueRange {
            period: 14,
            output: "atr".into(),
        };

        let mut specs = match self {
            StrategyKind::SupertrendPsar => vec![
                IndicatorSpec::Supertrend {
                    atr_length: 10,
                    multiplier: 3.0,
                },
                IndicatorSpec::ParabolicSar {
                    min_af: 0.02,
                    max_af: 0.2,
                },
            ],
            StrategyKind::EmaCrossover => vec![
                ema(9, "ema_fast"),
                ema(21, "ema_slow"),
                ema(200, "ema_200"),
                atr,
            ],
            StrategyKind::MacdEma => vec![
                IndicatorSpec::Macd {
                    fast: 12,
                    slow: 26,
                    signal: 9,
                },
                ema(200, "ema_200"),
                atr,
            ],
        };
        specs.push(IndicatorSpec::Strategy { recipe: *self });
        specs
    }

    fn required_columns(&self) -> &'static [&'static str] {
        match self {
            StrategyKind::SupertrendPsar => &[
                "supertrend",
                "final_upperband",
                "final_lowerband",
                "psar_bull",
                "psar_bear",
            ],
            StrategyKind::EmaCrossover => &["ema_fast", "ema_slow", "ema_200"],
            StrategyKind::MacdEma => &["macd", "signal_line", "ema_200"],
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Register a recipe and everything it depends on.
pub fn install(
    engine: &mut IndicatorEngine,
    table: &mut TimeSeriesTable,
    kind: StrategyKind,
) -> Result<(), CandlebotError> {
    for spec in kind.indicator_specs() {
        engine.register(table, spec)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct RecipeRow {
    signal: SignalKind,
    stop: Option<StopSignal>,
    take_profit: f64,
    stop_loss: f64,
}

impl RecipeRow {
    fn empty() -> Self {
        RecipeRow {
            signal: SignalKind::None,
            stop: None,
            take_profit: f64::NAN,
            stop_loss: f64::NAN,
        }
    }
}

/// Compute a recipe's signal columns. Fails with a missing-column error when
/// its indicators have not been computed yet.
pub fn apply_strategy(table: &mut TimeSeriesTable, kind: StrategyKind) -> Result<(), CandlebotError> {
    table.require_columns(kind.required_columns())?;

    let rows = table.map_groups(|g| match kind {
        StrategyKind::SupertrendPsar => supertrend_psar(&g),
        StrategyKind::EmaCrossover => ema_crossover(&g),
        StrategyKind::MacdEma => macd_ema(&g),
    })?;

    table.set_label(
        SIGNAL_COLUMN,
        rows.iter().map(|r| Some(r.signal.as_str().to_string())).collect(),
    )?;
    table.set_label(
        STOP_SIGNAL_COLUMN,
        rows.iter()
            .map(|r| Some(r.stop.map_or(SignalKind::None.as_str(), |s| s.as_str()).to_string()))
            .collect(),
    )?;
    table.set_numeric(TAKE_PROFIT_COLUMN, rows.iter().map(|r| r.take_profit).collect())?;
    table.set_numeric(STOP_LOSS_COLUMN, rows.iter().map(|r| r.stop_loss).collect())?;
    Ok(())
}

fn supertrend_psar(g: &GroupView<'_>) -> Result<Vec<RecipeRow>, CandlebotError> {
    let trend = g.numeric("supertrend")?;
    let upper = g.numeric("final_upperband")?;
    let lower = g.numeric("final_lowerband")?;
    let bull = g.numeric("psar_bull")?;
    let bear = g.numeric("psar_bear")?;
    let high = g.numeric("high")?;
    let low = g.numeric("low")?;
    let close = g.numeric("close")?;

    let psar_trend: Vec<f64> = (0..g.len())
        .map(|i| {
            let up = if bull[i].is_nan() { 0.0 } else { 1.0 };
            let down = if bear[i].is_nan() { 0.0 } else { -1.0 };
            up + down
        })
        .collect();
    let agreed: Vec<f64> = (0..g.len())
        .map(|i| if psar_trend[i] == trend[i] { trend[i] } else { 0.0 })
        .collect();

    Ok((0..g.len())
        .map(|i| {
            let mut row = RecipeRow::empty();
            if agreed[i] == 1.0 {
                row.stop_loss = lower[i];
                row.take_profit = close[i] + (low[i] - lower[i]).abs();
            } else if agreed[i] == -1.0 {
                row.stop_loss = upper[i];
                row.take_profit = close[i] - (high[i] - upper[i]).abs();
            }
            if i == 0 {
                return row;
            }
            if agreed[i] != 0.0 && agreed[i - 1] == 0.0 {
                row.signal = if agreed[i] > 0.0 { SignalKind::Buy } else { SignalKind::Sell };
            }
            row.stop = match (psar_trend[i - 1], psar_trend[i]) {
                (p, c) if p == 1.0 && c == -1.0 => Some(StopSignal::Long),
                (p, c) if p == -1.0 && c == 1.0 => Some(StopSignal::Short),
                _ => None,
            };
            row
        })
        .collect())
}

/// +1 when the whole bar is above the long-term average, -1 when below.
fn zones(g: &GroupView<'_>, average: &str) -> Result<Vec<f64>, CandlebotError> {
    let avg = g.numeric(average)?;
    let high = g.numeric("high")?;
    let low = g.numeric("low")?;
    Ok((0..g.len())
        .map(|i| {
            if avg[i] < low[i] {
                1.0
            } else if avg[i] > high[i] {
                -1.0
            } else {
                0.0
            }
        })
        .collect())
}

/// +1 on the bar `fast` moves above `slow`, -1 on the bar it moves back.
fn crosses(g: &GroupView<'_>, fast: &str, slow: &str) -> Result<Vec<f64>, CandlebotError> {
    let fast = g.numeric(fast)?;
    let slow = g.numeric(slow)?;
    let above: Vec<f64> = fast
        .iter()
        .zip(slow)
        .map(|(f, s)| if f > s { 1.0 } else { 0.0 })
        .collect();
    Ok((0..above.len())
        .map(|i| if i == 0 { 0.0 } else { above[i] - above[i - 1] })
        .collect())
}

fn zoned_cross_signal(zone: f64, cross: f64) -> SignalKind {
    if zone == 1.0 && cross == 1.0 {
        SignalKind::Buy
    } else if zone == -1.0 && cross == -1.0 {
        SignalKind::Sell
    } else {
        SignalKind::None
    }
}

fn ema_crossover(g: &GroupView<'_>) -> Result<Vec<RecipeRow>, CandlebotError> {
    let zone = zones(g, "ema_200")?;
    let cross = crosses(g, "ema_fast", "ema_slow")?;

    Ok((0..g.len())
        .map(|i| {
            let mut row = RecipeRow::empty();
            row.signal = zoned_cross_signal(zone[i], cross[i]);
            if i > 0 && zone[i] != zone[i - 1] {
                row.stop = Some(StopSignal::All);
            }
            row
        })
        .collect())
}

fn macd_ema(g: &GroupView<'_>) -> Result<Vec<RecipeRow>, CandlebotError> {
    let zone = zones(g, "ema_200")?;
    let cross = crosses(g, "macd", "signal_line")?;

    Ok((0..g.len())
        .map(|i| {
            let mut row = RecipeRow::empty();
            row.signal = zoned_cross_signal(zone[i], cross[i]);
            row.stop = if cross[i] == -1.0 {
                Some(StopSignal::Long)
            } else if cross[i] == 1.0 {
                Some(StopSignal::Short)
            } else {
                None
            };
            row
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::CandleRecord;

    fn flat_table(n: usize) -> TimeSeriesTable {
        let records: Vec<CandleRecord> = (0..n)
            .map(|i| {
                let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64);
                CandleRecord::new("1", &day.to_string(), 100.0, 101.0, 99.0, 100.0)
            })
            .collect();
        TimeSeriesTable::build(&records).unwrap()
    }

    #[test]
    fn from_name_round_trips() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_name(kind.name()).unwrap(), kind);
        }
        assert_eq!(
            StrategyKind::from_name(" MACD_EMA ").unwrap(),
            StrategyKind::MacdEma
        );
    }

    #[test]
    fn unknown_name_is_config_error() {
        let err = StrategyKind::from_name("moon").unwrap_err();
        assert!(matches!(err, CandlebotError::UnknownStrategy { .. }));
        assert!(err.is_config_error());
    }

    #[test]
    fn recipe_is_registered_last() {
        for kind in StrategyKind::ALL {
            let specs = kind.indicator_specs();
            assert_eq!(specs.last(), Some(&IndicatorSpec::Strategy { recipe: kind }));
        }
    }

    #[test]
    fn recipe_without_inputs_reports_missing_columns() {
        let mut t = flat_table(5);
        match apply_strategy(&mut t, StrategyKind::MacdEma) {
            Err(CandlebotError::MissingColumn { columns }) => {
                assert_eq!(columns, vec!["macd", "signal_line", "ema_200"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn install_writes_signal_columns() {
        let mut t = flat_table(40);
        let mut engine = IndicatorEngine::new();
        install(&mut engine, &mut t, StrategyKind::SupertrendPsar).unwrap();
        t.require_columns(&SIGNAL_COLUMNS).unwrap();
        assert_eq!(engine.len(), 3);
        assert!(
            t.label(SIGNAL_COLUMN)
                .unwrap()
                .iter()
                .all(|s| matches!(s.as_deref(), Some("buy" | "sell" | "-")))
        );
        // supertrend is not warm yet, so nothing can agree with it
        assert!(t.label(SIGNAL_COLUMN).unwrap()[..9].iter().all(|s| s.as_deref() == Some("-")));
    }

    #[test]
    fn zoned_cross_rules() {
        assert_eq!(zoned_cross_signal(1.0, 1.0), SignalKind::Buy);
        assert_eq!(zoned_cross_signal(-1.0, -1.0), SignalKind::Sell);
        assert_eq!(zoned_cross_signal(1.0, -1.0), SignalKind::None);
        assert_eq!(zoned_cross_signal(0.0, 1.0), SignalKind::None);
    }

    #[test]
    fn ema_crossover_buys_on_cross_above_trend() {
        let mut t = TimeSeriesTable::build(&[
            CandleRecord::new("1", "2024-01-01", 100.0, 101.0, 99.0, 100.0),
            CandleRecord::new("1", "2024-01-02", 100.0, 101.0, 99.0, 100.0),
            CandleRecord::new("1", "2024-01-03", 100.0, 101.0, 99.0, 100.0),
        ])
        .unwrap();
        t.set_numeric("ema_200", vec![90.0, 90.0, 90.0]).unwrap();
        t.set_numeric("ema_fast", vec![1.0, 1.0, 3.0]).unwrap();
        t.set_numeric("ema_slow", vec![2.0, 2.0, 2.0]).unwrap();
        apply_strategy(&mut t, StrategyKind::EmaCrossover).unwrap();
        let signal = t.label(SIGNAL_COLUMN).unwrap();
        assert_eq!(signal[2].as_deref(), Some("buy"));
        assert_eq!(signal[1].as_deref(), Some("-"));
    }

    #[test]
    fn macd_ema_stops_longs_on_cross_down() {
        let mut t = flat_table(3);
        t.set_numeric("ema_200", vec![110.0; 3]).unwrap();
        t.set_numeric("macd", vec![2.0, 2.0, 0.5]).unwrap();
        t.set_numeric("signal_line", vec![1.0, 1.0, 1.0]).unwrap();
        apply_strategy(&mut t, StrategyKind::MacdEma).unwrap();
        assert_eq!(t.label(SIGNAL_COLUMN).unwrap()[2].as_deref(), Some("sell"));
        assert_eq!(
            t.label(STOP_SIGNAL_COLUMN).unwrap()[2].as_deref(),
            Some("buy_stop")
        );
    }

    #[test]
    fn supertrend_psar_enters_on_new_agreement() {
        let mut t = flat_table(4);
        let nan = f64::NAN;
        t.set_numeric("supertrend", vec![-1.0, -1.0, 1.0, 1.0]).unwrap();
        t.set_numeric("final_upperband", vec![105.0, 105.0, nan, nan]).unwrap();
        t.set_numeric("final_lowerband", vec![nan, nan, 95.0, 96.0]).unwrap();
        t.set_numeric("psar_bull", vec![nan, nan, 98.0, 98.5]).unwrap();
        t.set_numeric("psar_bear", vec![nan, nan, nan, nan]).unwrap();
        apply_strategy(&mut t, StrategyKind::SupertrendPsar).unwrap();

        let signal = t.label(SIGNAL_COLUMN).unwrap();
        assert_eq!(signal[2].as_deref(), Some("buy"));
        // agreement continues, no fresh entry
        assert_eq!(signal[3].as_deref(), Some("-"));

        let sl = t.numeric(STOP_LOSS_COLUMN).unwrap();
        let tp = t.numeric(TAKE_PROFIT_COLUMN).unwrap();
        assert!((sl[2] - 95.0).abs() < f64::EPSILON);
        // close 100 + |99 - 95|
        assert!((tp[2] - 104.0).abs() < f64::EPSILON);
        assert!(sl[0].is_nan());
    }
}
