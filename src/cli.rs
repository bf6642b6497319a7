//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::{CsvAdapter, export_table};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::run_backtest;
use crate::domain::config_validation::{candles_path, load_backtest_config, load_strategy};
use crate::domain::error::CandlebotError;
use crate::domain::indicator::IndicatorEngine;
use crate::domain::metrics::render_report;
use crate::domain::signal::{SignalEntry, SignalSet, evaluate_strategy_signals};
use crate::domain::strategy::{self, StrategyKind};
use crate::domain::table::TimeSeriesTable;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "candlebot", about = "Candle indicators, signals and backtests")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command that loads candles.
#[derive(clap::Args, Debug)]
pub struct DataArgs {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Candle CSV; overrides `[data] candles`
    #[arg(long)]
    pub candles: Option<PathBuf>,
    /// Strategy recipe; overrides `[strategy] name`
    #[arg(short, long)]
    pub strategy: Option<String>,
    /// Restrict to these instruments (repeatable)
    #[arg(short, long = "instrument")]
    pub instruments: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[command(flatten)]
        data: DataArgs,
        /// Validate the configuration and stop
        #[arg(long)]
        dry_run: bool,
    },
    /// Scan each instrument's latest row for signals
    Signals {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Write the table with every indicator column to CSV
    Export {
        #[command(flatten)]
        data: DataArgs,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List built-in strategy recipes
    Strategies,
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(&err)
        }
    }
}

/// Dispatch a parsed command, leaving exit-code mapping to [`run`].
pub fn execute(cli: Cli) -> Result<(), CandlebotError> {
    match cli.command {
        Command::Backtest { data, dry_run } => run_backtest_command(&data, dry_run),
        Command::Signals { data } => run_signals(&data),
        Command::Export { data, output } => run_export(&data, &output),
        Command::Strategies => {
            print!("{}", list_strategies());
            Ok(())
        }
    }
}

pub fn list_strategies() -> String {
    StrategyKind::ALL
        .iter()
        .map(|k| format!("{:<16} {}\n", k.name(), k.description()))
        .collect()
}

/// A table with the chosen recipe and its indicators computed.
struct Prepared {
    strategy: StrategyKind,
    table: TimeSeriesTable,
}

fn resolve_strategy(args: &DataArgs, config: &dyn ConfigPort) -> Result<StrategyKind, CandlebotError> {
    match &args.strategy {
        Some(name) => StrategyKind::from_name(name),
        None => load_strategy(config),
    }
}

fn prepare(args: &DataArgs, config: &dyn ConfigPort) -> Result<Prepared, CandlebotError> {
    let strategy = resolve_strategy(args, config)?;
    let path = args
        .candles
        .clone()
        .or_else(|| candles_path(config))
        .ok_or_else(|| CandlebotError::ConfigMissing {
            section: "data".into(),
            key: "candles".into(),
        })?;

    let records = CsvAdapter::new(path).fetch_candles(&args.instruments)?;
    let mut table = TimeSeriesTable::build(&records)?;
    if let Some(absent) = args.instruments.iter().find(|i| !table.contains_instrument(i)) {
        return Err(CandlebotError::NoData {
            instrument: absent.clone(),
        });
    }
    let mut engine = IndicatorEngine::new();
    strategy::install(&mut engine, &mut table, strategy)?;
    info!(
        strategy = %strategy,
        indicators = engine.len(),
        columns = table.column_names().len(),
        "prepared table"
    );
    Ok(Prepared { strategy, table })
}

fn run_backtest_command(args: &DataArgs, dry_run: bool) -> Result<(), CandlebotError> {
    info!(path = %args.config.display(), "loading config");
    let config = FileConfigAdapter::from_file(&args.config)?;
    let backtest = load_backtest_config(&config)?;
    if dry_run {
        let strategy = resolve_strategy(args, &config)?;
        println!("configuration valid; strategy {strategy}");
        return Ok(());
    }

    let prepared = prepare(args, &config)?;
    let result = run_backtest(&prepared.table, &backtest)?;
    if backtest.print_result {
        print!("{}", render_report(&result, prepared.strategy.name()));
    } else {
        let s = result.summary();
        println!(
            "opened {} wins {} losses {} profit/loss {:.2} equity {:.2}",
            s.opened, s.wins, s.losses, s.profit_loss, s.equity
        );
    }
    Ok(())
}

fn run_signals(args: &DataArgs) -> Result<(), CandlebotError> {
    let config = FileConfigAdapter::from_file(&args.config)?;
    let prepared = prepare(args, &config)?;
    let signals = evaluate_strategy_signals(&prepared.table)?;
    print!("{}", format_signals(&signals));
    Ok(())
}

pub fn format_signals(signals: &SignalSet) -> String {
    if signals.is_empty() {
        return "no signals\n".to_string();
    }
    let level = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |x| format!("{x:.4}"));
    let line = |tag: &str, e: &SignalEntry| {
        format!(
            "{tag:<5} {:<10} {} open={:.4} tp={} sl={}\n",
            e.instrument,
            e.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            e.open,
            level(e.take_profit),
            level(e.stop_loss)
        )
    };
    let mut out = String::new();
    for e in &signals.buys {
        out.push_str(&line("BUY", e));
    }
    for e in &signals.sells {
        out.push_str(&line("SELL", e));
    }
    for e in &signals.close {
        out.push_str(&line("CLOSE", e));
    }
    out
}

fn run_export(args: &DataArgs, output: &Path) -> Result<(), CandlebotError> {
    let config = FileConfigAdapter::from_file(&args.config)?;
    let prepared = prepare(args, &config)?;
    export_table(&prepared.table, output)?;
    println!("wrote {} rows to {}", prepared.table.len(), output.display());
    Ok(())
}
