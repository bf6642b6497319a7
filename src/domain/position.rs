//! Backtest positions and closed trades.

use chrono::NaiveDateTime;

use super::candle::Candle;
use super::signal::{SignalKind, StopSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_signal(kind: SignalKind) -> Option<Self> {
        match kind {
            SignalKind::Buy => Some(Direction::Long),
            SignalKind::Sell => Some(Direction::Short),
            SignalKind::None => None,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn closed_by(&self, stop: StopSignal) -> bool {
        matches!(
            (self, stop),
            (_, StopSignal::All) | (Direction::Long, StopSignal::Long) | (Direction::Short, StopSignal::Short)
        )
    }

    /// Whether a raw entry signal points the other way.
    pub fn is_opposed_by(&self, kind: SignalKind) -> bool {
        Direction::from_signal(kind).is_some_and(|d| d != *self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    /// Take-profit and stop-loss inside the same bar, both credited.
    BothLevels,
    StopSignal,
    ExitSignal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Open,
    Closed,
}

/// An entry accepted by the backtest. Levels are `NaN` when unset.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    /// Notional committed: budget share × leverage.
    pub size: f64,
    /// Units bought with the initial budget.
    pub units_fixed: f64,
    /// Units bought with the running budget.
    pub units_compound: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub state: PositionState,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Signed price move from entry to `exit`, in the position's favour.
    pub fn move_to(&self, exit: f64) -> f64 {
        self.direction.sign() * (exit - self.entry_price)
    }

    /// P&L at `exit` for the fixed-budget size: move × size / entry.
    pub fn pnl(&self, exit: f64) -> f64 {
        self.move_to(exit) * self.units_fixed
    }

    pub fn compound_pnl(&self, exit: f64) -> f64 {
        self.move_to(exit) * self.units_compound
    }

    pub fn take_profit_hit(&self, bar: &Candle) -> bool {
        bar.touches(self.take_profit)
    }

    pub fn stop_loss_hit(&self, bar: &Candle) -> bool {
        bar.touches(self.stop_loss)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClosedTrade {
    pub instrument: String,
    pub direction: Direction,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    /// For [`ExitReason::BothLevels`] the price that reproduces the net move.
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub reason: ExitReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample(direction: Direction) -> Position {
        Position {
            direction,
            entry_time: ts(3),
            entry_price: 100.0,
            size: 1000.0,
            units_fixed: 10.0,
            units_compound: 12.0,
            take_profit: 110.0,
            stop_loss: 95.0,
            state: PositionState::Open,
        }
    }

    fn bar(low: f64, high: f64) -> Candle {
        Candle {
            instrument: "1".into(),
            timestamp: ts(4),
            open: low,
            high,
            low,
            close: high,
        }
    }

    #[test]
    fn pnl_long_and_short() {
        let long = sample(Direction::Long);
        assert!((long.pnl(110.0) - 100.0).abs() < f64::EPSILON);
        assert!((long.compound_pnl(110.0) - 120.0).abs() < f64::EPSILON);
        let short = sample(Direction::Short);
        assert!((short.pnl(110.0) + 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn level_touch_is_inclusive() {
        let pos = sample(Direction::Long);
        assert!(pos.take_profit_hit(&bar(105.0, 110.0)));
        assert!(!pos.take_profit_hit(&bar(105.0, 109.9)));
        assert!(pos.stop_loss_hit(&bar(95.0, 99.0)));
    }

    #[test]
    fn unset_levels_never_hit() {
        let mut pos = sample(Direction::Long);
        pos.take_profit = f64::NAN;
        pos.stop_loss = f64::NAN;
        assert!(!pos.take_profit_hit(&bar(0.0, 1e9)));
        assert!(!pos.stop_loss_hit(&bar(0.0, 1e9)));
    }

    #[test]
    fn stop_signal_matching() {
        assert!(Direction::Long.closed_by(StopSignal::Long));
        assert!(Direction::Long.closed_by(StopSignal::All));
        assert!(!Direction::Long.closed_by(StopSignal::Short));
        assert!(Direction::Short.closed_by(StopSignal::Short));
    }

    #[test]
    fn opposite_signal() {
        assert!(Direction::Long.is_opposed_by(SignalKind::Sell));
        assert!(!Direction::Long.is_opposed_by(SignalKind::Buy));
        assert!(!Direction::Short.is_opposed_by(SignalKind::None));
    }
}
