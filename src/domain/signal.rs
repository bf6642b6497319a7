//! Last-row signal scanning.
//!
//! Two modes, both reading only the most recent row of each instrument:
//! - strategy-embedded: a recipe has already written `signal` (and usually
//!   `stop_signal`) label columns; the scan just classifies them
//! - declarative: threshold and comparison rules over indicator columns,
//!   combined so that a direction is emitted only when every rule agrees

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;
use tracing::info;

use super::error::CandlebotError;
use super::table::{RowView, TimeSeriesTable};

pub const SIGNAL_COLUMN: &str = "signal";
pub const STOP_SIGNAL_COLUMN: &str = "stop_signal";
pub const TAKE_PROFIT_COLUMN: &str = "take_profit";
pub const STOP_LOSS_COLUMN: &str = "stop_loss";

/// Label written for "no signal".
pub const NO_SIGNAL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Buy,
    Sell,
    None,
}

impl SignalKind {
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("buy") => SignalKind::Buy,
            Some("sell") => SignalKind::Sell,
            _ => SignalKind::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "buy",
            SignalKind::Sell => "sell",
            SignalKind::None => NO_SIGNAL,
        }
    }
}

/// Which open positions a stop signal closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// `stop`: every position.
    All,
    /// `buy_stop`: long positions.
    Long,
    /// `sell_stop`: short positions.
    Short,
}

impl StopSignal {
    /// Only `stop`, `buy_stop` and `sell_stop` close anything; every other
    /// label, null included, is `None`.
    pub fn from_label(label: Option<&str>) -> Option<Self> {
        match label?.trim().to_ascii_lowercase().as_str() {
            "stop" => Some(StopSignal::All),
            "buy_stop" => Some(StopSignal::Long),
            "sell_stop" => Some(StopSignal::Short),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StopSignal::All => "stop",
            StopSignal::Long => "buy_stop",
            StopSignal::Short => "sell_stop",
        }
    }
}

/// One instrument's latest row, as handed to execution or notification.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalEntry {
    pub instrument: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub close: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub stop_signal: Option<String>,
}

impl SignalEntry {
    fn from_row(row: &RowView<'_>) -> Self {
        let candle = row.candle();
        SignalEntry {
            instrument: candle.instrument,
            timestamp: candle.timestamp,
            open: candle.open,
            close: candle.close,
            take_profit: row.numeric(TAKE_PROFIT_COLUMN),
            stop_loss: row.numeric(STOP_LOSS_COLUMN),
            stop_signal: row.label(STOP_SIGNAL_COLUMN).map(str::to_string),
        }
    }
}

/// Result of a scan. Empty sets are the normal case.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalSet {
    pub buys: Vec<SignalEntry>,
    pub sells: Vec<SignalEntry>,
    pub close: Vec<SignalEntry>,
}

impl SignalSet {
    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty() && self.close.is_empty()
    }
}

/// Classify each instrument's latest `signal` / `stop_signal` labels.
pub fn evaluate_strategy_signals(table: &TimeSeriesTable) -> Result<SignalSet, CandlebotError> {
    table.require_columns(&[SIGNAL_COLUMN])?;
    table.label(SIGNAL_COLUMN)?;
    let has_stop = table.has_column(STOP_SIGNAL_COLUMN);
    if has_stop {
        table.label(STOP_SIGNAL_COLUMN)?;
    }

    let mut set = SignalSet::default();
    for row in table.latest_row_per_instrument() {
        match SignalKind::from_label(row.label(SIGNAL_COLUMN)) {
            SignalKind::Buy => set.buys.push(SignalEntry::from_row(&row)),
            SignalKind::Sell => set.sells.push(SignalEntry::from_row(&row)),
            SignalKind::None => {}
        }
        if has_stop && StopSignal::from_label(row.label(STOP_SIGNAL_COLUMN)).is_some() {
            set.close.push(SignalEntry::from_row(&row));
        }
    }

    info!(
        buys = set.buys.len(),
        sells = set.sells.len(),
        close = set.close.len(),
        "evaluated strategy signals"
    );
    Ok(set)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    /// A null on either side never satisfies a comparison.
    pub fn holds(&self, left: f64, right: f64) -> bool {
        if left.is_nan() || right.is_nan() {
            return false;
        }
        match self {
            Comparator::Gt => left > right,
            Comparator::Ge => left >= right,
            Comparator::Lt => left < right,
            Comparator::Le => left <= right,
            Comparator::Eq => left == right,
            Comparator::Ne => left != right,
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            other => Err(format!("unknown comparison operator `{other}`")),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        };
        write!(f, "{s}")
    }
}

/// `indicator OP threshold`, optionally guarded by `indicator OP_MAX max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub indicator: String,
    pub buy: (Comparator, f64),
    pub sell: (Comparator, f64),
    pub buy_max: Option<(Comparator, f64)>,
    pub sell_max: Option<(Comparator, f64)>,
}

impl ThresholdRule {
    pub fn new(indicator: &str, buy: (Comparator, f64), sell: (Comparator, f64)) -> Self {
        ThresholdRule {
            indicator: indicator.to_string(),
            buy,
            sell,
            buy_max: None,
            sell_max: None,
        }
    }

    pub fn with_buy_max(mut self, op: Comparator, max: f64) -> Self {
        self.buy_max = Some((op, max));
        self
    }

    pub fn with_sell_max(mut self, op: Comparator, max: f64) -> Self {
        self.sell_max = Some((op, max));
        self
    }

    fn vote(&self, row: &RowView<'_>) -> SignalKind {
        let Some(value) = row.numeric(&self.indicator) else {
            return SignalKind::None;
        };
        let guarded = |cond: (Comparator, f64), max: Option<(Comparator, f64)>| {
            cond.0.holds(value, cond.1) && max.is_none_or(|(op, m)| op.holds(value, m))
        };
        if guarded(self.buy, self.buy_max) {
            SignalKind::Buy
        } else if guarded(self.sell, self.sell_max) {
            SignalKind::Sell
        } else {
            SignalKind::None
        }
    }
}

/// `left OP right` between two indicator columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRule {
    pub left: String,
    pub right: String,
    pub buy_op: Comparator,
    pub sell_op: Comparator,
}

impl ComparisonRule {
    pub fn new(left: &str, right: &str, buy_op: Comparator, sell_op: Comparator) -> Self {
        ComparisonRule {
            left: left.to_string(),
            right: right.to_string(),
            buy_op,
            sell_op,
        }
    }

    fn vote(&self, row: &RowView<'_>) -> SignalKind {
        let (Some(a), Some(b)) = (row.numeric(&self.left), row.numeric(&self.right)) else {
            return SignalKind::None;
        };
        if self.buy_op.holds(a, b) {
            SignalKind::Buy
        } else if self.sell_op.holds(a, b) {
            SignalKind::Sell
        } else {
            SignalKind::None
        }
    }
}

/// Declarative rule set. A direction is emitted for an instrument only when
/// every rule votes for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalRules {
    thresholds: Vec<ThresholdRule>,
    comparisons: Vec<ComparisonRule>,
}

impl SignalRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the threshold rule for `rule.indicator`.
    pub fn threshold(mut self, rule: ThresholdRule) -> Self {
        self.thresholds.retain(|r| r.indicator != rule.indicator);
        self.thresholds.push(rule);
        self
    }

    pub fn comparison(mut self, rule: ComparisonRule) -> Self {
        self.comparisons
            .retain(|r| !(r.left == rule.left && r.right == rule.right));
        self.comparisons.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty() && self.comparisons.is_empty()
    }

    fn referenced_columns(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .thresholds
            .iter()
            .map(|r| r.indicator.as_str())
            .chain(self.comparisons.iter().flat_map(|r| [r.left.as_str(), r.right.as_str()]));
        for name in all {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn evaluate(&self, table: &TimeSeriesTable) -> Result<SignalSet, CandlebotError> {
        let columns = self.referenced_columns();
        table.require_columns(&columns)?;
        for name in &columns {
            table.numeric(name)?;
        }

        let mut set = SignalSet::default();
        if self.is_empty() {
            return Ok(set);
        }

        for row in table.latest_row_per_instrument() {
            let votes: Vec<SignalKind> = self
                .thresholds
                .iter()
                .map(|r| r.vote(&row))
                .chain(self.comparisons.iter().map(|r| r.vote(&row)))
                .collect();
            if votes.iter().all(|v| *v == SignalKind::Buy) {
                set.buys.push(SignalEntry::from_row(&row));
            } else if votes.iter().all(|v| *v == SignalKind::Sell) {
                set.sells.push(SignalEntry::from_row(&row));
            }
        }

        info!(
            rules = self.thresholds.len() + self.comparisons.len(),
            buys = set.buys.len(),
            sells = set.sells.len(),
            "evaluated rule signals"
        );
        Ok(set)
    }
}
