//! Aggregate backtest statistics and the printed report.

use std::fmt::Write;

use super::backtest::{BacktestResult, InstrumentResult};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BacktestSummary {
    pub instruments: usize,
    pub opened: usize,
    pub missed: usize,
    pub wins: usize,
    pub losses: usize,
    pub remain: usize,
    pub earned: f64,
    pub lost: f64,
    pub profit_loss: f64,
    pub equity: f64,
    /// `None` when no position was opened anywhere.
    pub win_rate: Option<f64>,
    /// Largest peak-to-trough fall of any instrument's running budget, as a
    /// fraction of the peak.
    pub max_drawdown: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl BacktestSummary {
    pub fn compute(results: &[InstrumentResult], initial_budget: f64) -> Self {
        let opened: usize = results.iter().map(|r| r.opened).sum();
        let wins: usize = results.iter().map(|r| r.wins).sum();

        let trades = results.iter().flat_map(|r| &r.trades);
        let largest_win = trades.clone().map(|t| t.pnl).fold(0.0_f64, f64::max);
        let largest_loss = trades.map(|t| t.pnl).fold(0.0_f64, f64::min);

        let max_drawdown = results
            .iter()
            .map(|r| compute_drawdown(initial_budget, &r.equity_curve))
            .fold(0.0_f64, f64::max);

        BacktestSummary {
            instruments: results.len(),
            opened,
            missed: results.iter().map(|r| r.missed).sum(),
            wins,
            losses: results.iter().map(|r| r.losses).sum(),
            remain: results.iter().map(|r| r.remain).sum(),
            earned: results.iter().map(|r| r.earned).sum(),
            lost: results.iter().map(|r| r.lost).sum(),
            profit_loss: results.iter().map(|r| r.profit_loss).sum(),
            equity: results.iter().map(|r| r.equity).sum(),
            win_rate: (opened > 0).then(|| wins as f64 / opened as f64),
            max_drawdown,
            largest_win,
            largest_loss,
        }
    }
}

impl BacktestResult {
    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary::compute(&self.instruments, self.config.trading_budget)
    }
}

fn compute_drawdown<T>(start: f64, curve: &[(T, f64)]) -> f64 {
    let mut peak = start;
    let mut max_dd = 0.0_f64;
    for &(_, budget) in curve {
        if budget > peak {
            peak = budget;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - budget) / peak);
        }
    }
    max_dd
}

/// Render an undefined rate as `undefined`, otherwise as a percentage.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}%", r * 100.0),
        None => "undefined".to_string(),
    }
}

/// Fixed-width report: run parameters, one row per instrument, totals.
pub fn render_report(result: &BacktestResult, strategy: &str) -> String {
    let cfg = &result.config;
    let rule = "=".repeat(118);
    let thin = "-".repeat(118);
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Backtest Result");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Strategy:       {strategy}");
    let _ = writeln!(out, "Trading budget: {}", cfg.trading_budget);
    let _ = writeln!(out, "Leverage:       x{}", cfg.leverage);
    let _ = writeln!(out, "Risk ratio:     {}", cfg.risk_ratio);
    let _ = writeln!(out, "Position size:  {}%", cfg.position_pct);
    let _ = writeln!(out, "Multiple trade: {}", cfg.multiple_trade);
    let _ = writeln!(out, "Same bar:       {}", cfg.same_bar_policy);
    let _ = writeln!(out, "{thin}");
    let _ = writeln!(
        out,
        "{:<12} {:>5} {:>5} {:>5} {:>7} {:>5} {:>5} {:>10} {:>8} {:>6} {:>9} {:>10} {:>10} {:>11} {:>10}",
        "instrument",
        "open",
        "miss",
        "multi",
        "highest",
        "win",
        "loss",
        "open/close",
        "win/loss",
        "remain",
        "win_rate",
        "earn",
        "lost",
        "profit/loss",
        "equity"
    );
    for r in &result.instruments {
        let _ = writeln!(
            out,
            "{:<12} {:>5} {:>5} {:>5} {:>7} {:>5} {:>5} {:>10} {:>8} {:>6} {:>9} {:>10.2} {:>10.2} {:>11.2} {:>10.2}",
            r.instrument,
            r.opened,
            r.missed,
            r.multi,
            r.highest,
            r.wins,
            r.losses,
            r.open_close_same_bar,
            r.win_loss_same_bar,
            r.remain,
            format_rate(r.win_rate()),
            r.earned,
            r.lost,
            r.profit_loss,
            r.equity
        );
    }

    let s = result.summary();
    let _ = writeln!(out, "{thin}");
    let _ = writeln!(
        out,
        "Opened: {}  Missed: {}  Wins: {}  Losses: {}  Remain: {}  Win rate: {}",
        s.opened,
        s.missed,
        s.wins,
        s.losses,
        s.remain,
        format_rate(s.win_rate)
    );
    let _ = writeln!(out, "Total earn: {:.2}", s.profit_loss);
    let _ = writeln!(out, "Total equity: {:.2}", s.equity);
    let _ = writeln!(out, "Max drawdown: {:.2}%", s.max_drawdown * 100.0);
    out
}
