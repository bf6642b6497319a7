//! Backtest engine.
//!
//! Each instrument is replayed bar by bar. The signal, stop-signal and level
//! columns written on bar `t` are acted on at bar `t + 1`: entries fill at
//! that bar's open. Per bar, in order:
//! 1. decide whether the pending entry is taken or missed
//! 2. close positions whose take-profit or stop-loss lies inside the bar
//! 3. close positions matched by a pending stop signal, at the open
//! 4. open the pending entry and check its levels against the same bar
//! 5. close positions opposed by this bar's own signal, at the close
//!
//! Positions live in an arena and are flagged closed rather than removed.

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::candle::Candle;
use super::error::CandlebotError;
use super::position::{ClosedTrade, Direction, ExitReason, Position, PositionState};
use super::signal::{
    SIGNAL_COLUMN, STOP_LOSS_COLUMN, STOP_SIGNAL_COLUMN, SignalKind, StopSignal, TAKE_PROFIT_COLUMN,
};
use super::table::{GroupView, TimeSeriesTable};

pub const SECTION: &str = "backtest";
pub const ATR_COLUMN: &str = "atr";
pub const DEFAULT_WARMUP_BARS: usize = 14;

/// Take-profit and stop-loss distances, in ATR multiples, as `earn:loss`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RiskRatio {
    pub earn: f64,
    pub loss: f64,
}

impl Default for RiskRatio {
    fn default() -> Self {
        RiskRatio { earn: 1.0, loss: 1.0 }
    }
}

impl FromStr for RiskRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("expected two positive numbers as N:M, got `{s}`");
        let (earn, loss) = s.split_once(':').ok_or_else(malformed)?;
        let part = |p: &str| p.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0);
        match (part(earn), part(loss)) {
            (Some(earn), Some(loss)) => Ok(RiskRatio { earn, loss }),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for RiskRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.earn, self.loss)
    }
}

/// What to do when one bar touches both a position's take-profit and its
/// stop-loss.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SameBarPolicy {
    /// Credit the win and the loss together.
    #[default]
    CreditBoth,
    StopLossFirst,
    TakeProfitFirst,
}

impl SameBarPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameBarPolicy::CreditBoth => "both",
            SameBarPolicy::StopLossFirst => "stop_loss_first",
            SameBarPolicy::TakeProfitFirst => "take_profit_first",
        }
    }
}

impl FromStr for SameBarPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "credit_both" => Ok(SameBarPolicy::CreditBoth),
            "stop_loss_first" => Ok(SameBarPolicy::StopLossFirst),
            "take_profit_first" => Ok(SameBarPolicy::TakeProfitFirst),
            other => Err(format!(
                "expected both, stop_loss_first or take_profit_first, got `{other}`"
            )),
        }
    }
}

impl fmt::Display for SameBarPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestConfig {
    pub trading_budget: f64,
    pub leverage: u32,
    pub multiple_trade: bool,
    pub risk_ratio: RiskRatio,
    /// Share of the budget committed per trade, 1..=100.
    pub position_pct: u32,
    pub warmup_bars: usize,
    pub same_bar_policy: SameBarPolicy,
    pub print_result: bool,
}

impl BacktestConfig {
    /// Validated config with single-trade mode, the full budget per trade and
    /// the default warm-up.
    pub fn new(trading_budget: f64, leverage: u32, risk_ratio: &str) -> Result<Self, CandlebotError> {
        if !(trading_budget.is_finite() && trading_budget > 0.0) {
            return Err(CandlebotError::invalid(
                SECTION,
                "trading_budget",
                format!("must be a positive number, got {trading_budget}"),
            ));
        }
        if leverage < 1 {
            return Err(CandlebotError::invalid(SECTION, "leverage", "must be at least 1"));
        }
        let risk_ratio = risk_ratio
            .parse()
            .map_err(|reason: String| CandlebotError::invalid(SECTION, "risk_ratio", reason))?;

        Ok(BacktestConfig {
            trading_budget,
            leverage,
            multiple_trade: false,
            risk_ratio,
            position_pct: 100,
            warmup_bars: DEFAULT_WARMUP_BARS,
            same_bar_policy: SameBarPolicy::default(),
            print_result: false,
        })
    }

    pub fn with_position_pct(mut self, pct: u32) -> Result<Self, CandlebotError> {
        if !(1..=100).contains(&pct) {
            return Err(CandlebotError::invalid(
                SECTION,
                "position_pct",
                format!("must be between 1 and 100, got {pct}"),
            ));
        }
        self.position_pct = pct;
        Ok(self)
    }

    pub fn with_multiple_trade(mut self, multiple_trade: bool) -> Self {
        self.multiple_trade = multiple_trade;
        self
    }

    pub fn with_warmup_bars(mut self, warmup_bars: usize) -> Self {
        self.warmup_bars = warmup_bars;
        self
    }

    pub fn with_same_bar_policy(mut self, policy: SameBarPolicy) -> Self {
        self.same_bar_policy = policy;
        self
    }

    pub fn with_print_result(mut self, print_result: bool) -> Self {
        self.print_result = print_result;
        self
    }

    /// Notional for one trade out of `budget`.
    fn trade_notional(&self, budget: f64) -> f64 {
        budget * f64::from(self.position_pct) / 100.0 * f64::from(self.leverage)
    }
}

/// Counters and trades for one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentResult {
    pub instrument: String,
    pub opened: usize,
    pub missed: usize,
    /// Entries taken while another position was already open.
    pub multi: usize,
    /// Most positions open at once.
    pub highest: usize,
    pub wins: usize,
    pub losses: usize,
    pub open_close_same_bar: usize,
    pub win_loss_same_bar: usize,
    pub remain: usize,
    pub earned: f64,
    /// Sum of losing P&L; zero or negative.
    pub lost: f64,
    /// Net P&L at a constant per-trade budget.
    pub profit_loss: f64,
    /// (final running budget - initial budget) / leverage
    pub equity: f64,
    pub trades: Vec<ClosedTrade>,
    /// Running budget after each close.
    pub equity_curve: Vec<(NaiveDateTime, f64)>,
}

impl InstrumentResult {
    /// wins / opened; `None` when nothing was opened.
    pub fn win_rate(&self) -> Option<f64> {
        (self.opened > 0).then(|| self.wins as f64 / self.opened as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub instruments: Vec<InstrumentResult>,
}

/// Replay every instrument in `table`. Requires a `signal` label column;
/// `stop_signal`, `take_profit`, `stop_loss` and `atr` are used when present.
pub fn run_backtest(
    table: &TimeSeriesTable,
    config: &BacktestConfig,
) -> Result<BacktestResult, CandlebotError> {
    table.require_columns(&[SIGNAL_COLUMN])?;
    info!(
        rows = table.len(),
        instruments = table.instrument_count(),
        budget = config.trading_budget,
        leverage = config.leverage,
        multiple_trade = config.multiple_trade,
        risk_ratio = %config.risk_ratio,
        "starting backtest"
    );

    let instruments = table
        .groups()
        .map(|g| replay_instrument(&g, config))
        .collect::<Result<Vec<_>, _>>()?;

    let opened: usize = instruments.iter().map(|r| r.opened).sum();
    let profit_loss: f64 = instruments.iter().map(|r| r.profit_loss).sum();
    info!(opened, profit_loss, "backtest finished");

    Ok(BacktestResult {
        config: config.clone(),
        instruments,
    })
}

/// Signal-side inputs for one instrument, as written (not yet shifted).
struct BarInputs {
    signal: Vec<SignalKind>,
    stop: Vec<Option<StopSignal>>,
    take_profit: Vec<f64>,
    stop_loss: Vec<f64>,
    atr: Vec<f64>,
}

impl BarInputs {
    fn load(g: &GroupView<'_>) -> Result<Self, CandlebotError> {
        let signal = g
            .label(SIGNAL_COLUMN)?
            .iter()
            .map(|s| SignalKind::from_label(s.as_deref()))
            .collect();
        let stop = match optional(g.label(STOP_SIGNAL_COLUMN))? {
            Some(labels) => labels
                .iter()
                .map(|s| StopSignal::from_label(s.as_deref()))
                .collect(),
            None => vec![None; g.len()],
        };
        let numeric_or_nan = |name: &str| -> Result<Vec<f64>, CandlebotError> {
            Ok(optional(g.numeric(name))?
                .map_or_else(|| vec![f64::NAN; g.len()], <[f64]>::to_vec))
        };

        Ok(BarInputs {
            signal,
            stop,
            take_profit: numeric_or_nan(TAKE_PROFIT_COLUMN)?,
            stop_loss: numeric_or_nan(STOP_LOSS_COLUMN)?,
            atr: numeric_or_nan(ATR_COLUMN)?,
        })
    }
}

fn optional<T>(column: Result<T, CandlebotError>) -> Result<Option<T>, CandlebotError> {
    match column {
        Ok(v) => Ok(Some(v)),
        Err(CandlebotError::MissingColumn { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Levels carried by the pending entry; `NaN` when absent.
#[derive(Debug, Clone, Copy)]
struct PendingLevels {
    take_profit: f64,
    stop_loss: f64,
    atr: f64,
}

impl PendingLevels {
    const NONE: PendingLevels = PendingLevels {
        take_profit: f64::NAN,
        stop_loss: f64::NAN,
        atr: f64::NAN,
    };

    /// Missing levels fall back to ATR multiples around the entry price.
    fn resolve(&self, direction: Direction, entry: f64, ratio: RiskRatio) -> (f64, f64) {
        let sign = direction.sign();
        let tp = if self.take_profit.is_nan() {
            entry + sign * self.atr * ratio.earn
        } else {
            self.take_profit
        };
        let sl = if self.stop_loss.is_nan() {
            entry - sign * self.atr * ratio.loss
        } else {
            self.stop_loss
        };
        (tp, sl)
    }
}

fn replay_instrument(
    g: &GroupView<'_>,
    config: &BacktestConfig,
) -> Result<InstrumentResult, CandlebotError> {
    let inputs = BarInputs::load(g)?;
    let candles = g.candles();
    let mut sim = Simulation::new(g.instrument(), config);

    for t in config.warmup_bars..candles.len() {
        let (entry, stop, levels) = match t.checked_sub(1) {
            Some(p) => (
                inputs.signal[p],
                inputs.stop[p],
                PendingLevels {
                    take_profit: inputs.take_profit[p],
                    stop_loss: inputs.stop_loss[p],
                    atr: inputs.atr[p],
                },
            ),
            None => (SignalKind::None, None, PendingLevels::NONE),
        };
        sim.step(&candles[t], entry, stop, levels, inputs.signal[t]);
    }

    let result = sim.finish();
    debug!(
        instrument = %result.instrument,
        opened = result.opened,
        wins = result.wins,
        losses = result.losses,
        missed = result.missed,
        "instrument replayed"
    );
    Ok(result)
}

struct Simulation<'a> {
    config: &'a BacktestConfig,
    budget: f64,
    positions: Vec<Position>,
    result: InstrumentResult,
}

impl<'a> Simulation<'a> {
    fn new(instrument: &str, config: &'a BacktestConfig) -> Self {
        Simulation {
            config,
            budget: config.trading_budget,
            positions: Vec::new(),
            result: InstrumentResult {
                instrument: instrument.to_string(),
                ..InstrumentResult::default()
            },
        }
    }

    fn open_indices(&self) -> Vec<usize> {
        self.positions
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_open())
            .map(|(i, _)| i)
            .collect()
    }

    fn step(
        &mut self,
        bar: &Candle,
        entry: SignalKind,
        stop: Option<StopSignal>,
        levels: PendingLevels,
        own_signal: SignalKind,
    ) {
        let existing = self.open_indices();
        let mut direction = Direction::from_signal(entry);
        if direction.is_some() && !self.config.multiple_trade && !existing.is_empty() {
            direction = None;
            self.result.missed += 1;
        }
        self.result.highest = self.result.highest.max(existing.len());

        for &i in &existing {
            self.check_levels(i, bar);
        }

        if let Some(stop) = stop {
            for &i in &existing {
                let p = &self.positions[i];
                if p.is_open() && p.direction.closed_by(stop) {
                    self.close(i, bar, bar.open, ExitReason::StopSignal);
                }
            }
        }

        if let Some(direction) = direction {
            if let Some(i) = self.enter(bar, direction, levels) {
                self.check_levels(i, bar);
            }
        }

        for i in self.open_indices() {
            if self.positions[i].direction.is_opposed_by(own_signal) {
                self.close(i, bar, bar.close, ExitReason::ExitSignal);
            }
        }
    }

    fn enter(&mut self, bar: &Candle, direction: Direction, levels: PendingLevels) -> Option<usize> {
        if bar.open.is_nan() || bar.open <= 0.0 {
            warn!(
                instrument = %bar.instrument,
                timestamp = %bar.timestamp,
                open = bar.open,
                "skipping entry on non-positive open"
            );
            return None;
        }
        let size = self.config.trade_notional(self.config.trading_budget);
        let (take_profit, stop_loss) = levels.resolve(direction, bar.open, self.config.risk_ratio);

        self.positions.push(Position {
            direction,
            entry_time: bar.timestamp,
            entry_price: bar.open,
            size,
            units_fixed: size / bar.open,
            units_compound: self.config.trade_notional(self.budget) / bar.open,
            take_profit,
            stop_loss,
            state: PositionState::Open,
        });
        self.result.opened += 1;

        let open_now = self.open_indices().len();
        if open_now > 1 {
            self.result.multi += 1;
        }
        self.result.highest = self.result.highest.max(open_now);
        Some(self.positions.len() - 1)
    }

    fn check_levels(&mut self, i: usize, bar: &Candle) {
        let p = &self.positions[i];
        if !p.is_open() {
            return;
        }
        let (tp, sl) = (p.take_profit, p.stop_loss);
        match (p.take_profit_hit(bar), p.stop_loss_hit(bar)) {
            (false, false) => {}
            (true, false) => self.close(i, bar, tp, ExitReason::TakeProfit),
            (false, true) => self.close(i, bar, sl, ExitReason::StopLoss),
            (true, true) => {
                self.result.win_loss_same_bar += 1;
                match self.config.same_bar_policy {
                    SameBarPolicy::CreditBoth => self.close_both(i, bar),
                    SameBarPolicy::StopLossFirst => self.close(i, bar, sl, ExitReason::StopLoss),
                    SameBarPolicy::TakeProfitFirst => {
                        self.close(i, bar, tp, ExitReason::TakeProfit)
                    }
                }
            }
        }
    }

    fn close(&mut self, i: usize, bar: &Candle, price: f64, reason: ExitReason) {
        let p = &mut self.positions[i];
        p.state = PositionState::Closed;
        let pnl = p.pnl(price);
        self.budget += p.compound_pnl(price);

        match reason {
            ExitReason::TakeProfit => self.result.wins += 1,
            ExitReason::StopLoss => self.result.losses += 1,
            _ if pnl > 0.0 => self.result.wins += 1,
            _ => self.result.losses += 1,
        }
        self.credit(pnl);
        self.record(i, bar, price, pnl, reason);
    }

    fn close_both(&mut self, i: usize, bar: &Candle) {
        let p = &mut self.positions[i];
        p.state = PositionState::Closed;
        let (tp, sl) = (p.take_profit, p.stop_loss);
        let (tp_pnl, sl_pnl) = (p.pnl(tp), p.pnl(sl));
        self.budget += p.compound_pnl(tp) + p.compound_pnl(sl);
        let effective_exit = tp + sl - p.entry_price;

        self.result.wins += 1;
        self.result.losses += 1;
        self.credit(tp_pnl);
        self.credit(sl_pnl);
        self.record(i, bar, effective_exit, tp_pnl + sl_pnl, ExitReason::BothLevels);
    }

    fn credit(&mut self, pnl: f64) {
        if pnl > 0.0 {
            self.result.earned += pnl;
        } else {
            self.result.lost += pnl;
        }
        self.result.profit_loss += pnl;
    }

    fn record(&mut self, i: usize, bar: &Candle, exit_price: f64, pnl: f64, reason: ExitReason) {
        let p = &self.positions[i];
        if p.entry_time == bar.timestamp {
            self.result.open_close_same_bar += 1;
        }
        debug!(
            instrument = %bar.instrument,
            entry = %p.entry_time,
            exit = %bar.timestamp,
            ?reason,
            pnl,
            "position closed"
        );
        self.result.trades.push(ClosedTrade {
            instrument: bar.instrument.clone(),
            direction: p.direction,
            entry_time: p.entry_time,
            exit_time: bar.timestamp,
            entry_price: p.entry_price,
            exit_price,
            size: p.size,
            pnl,
            reason,
        });
        self.result.equity_curve.push((bar.timestamp, self.budget));
    }

    fn finish(mut self) -> InstrumentResult {
        self.result.remain = self.open_indices().len();
        self.result.equity =
            (self.budget - self.config.trading_budget) / f64::from(self.config.leverage);
        self.result
    }
}
