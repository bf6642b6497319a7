//! Configuration loading and validation.
//!
//! Every key is checked before a backtest starts, so a bad file fails with a
//! config error naming the section and key instead of a half-run simulation.

use std::path::PathBuf;

use crate::domain::backtest::{BacktestConfig, DEFAULT_WARMUP_BARS, SECTION as BACKTEST};
use crate::domain::error::CandlebotError;
use crate::domain::strategy::StrategyKind;
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const DATA: &str = "data";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), CandlebotError> {
    load_backtest_config(config).map(|_| ())
}

/// Build a [`BacktestConfig`] from the `[backtest]` section. Only
/// `trading_budget` is required.
pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, CandlebotError> {
    let budget = config
        .get_f64(BACKTEST, "trading_budget")?
        .ok_or_else(|| CandlebotError::ConfigMissing {
            section: BACKTEST.to_string(),
            key: "trading_budget".to_string(),
        })?;
    let leverage = config.get_u32(BACKTEST, "leverage")?.unwrap_or(1);
    let risk_ratio = config
        .get_string(BACKTEST, "risk_ratio")
        .unwrap_or_else(|| "1:1".to_string());

    let mut cfg = BacktestConfig::new(budget, leverage, &risk_ratio)?
        .with_position_pct(config.get_u32(BACKTEST, "position_pct")?.unwrap_or(100))?
        .with_multiple_trade(config.get_bool(BACKTEST, "multiple_trade")?.unwrap_or(false))
        .with_warmup_bars(
            config
                .get_usize(BACKTEST, "warmup_bars")?
                .unwrap_or(DEFAULT_WARMUP_BARS),
        )
        .with_print_result(config.get_bool(BACKTEST, "print_result")?.unwrap_or(true));

    if let Some(policy) = config.get_string(BACKTEST, "same_bar_policy") {
        let policy = policy
            .parse()
            .map_err(|reason: String| CandlebotError::invalid(BACKTEST, "same_bar_policy", reason))?;
        cfg = cfg.with_same_bar_policy(policy);
    }
    Ok(cfg)
}

pub fn load_strategy(config: &dyn ConfigPort) -> Result<StrategyKind, CandlebotError> {
    StrategyKind::from_name(&config.require_string(STRATEGY, "name")?)
}

pub fn candles_path(config: &dyn ConfigPort) -> Option<PathBuf> {
    config
        .get_string(DATA, "candles")
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}
