//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::text_report_adapter::{self, TextReportAdapter};
use crate::domain::bar::Bar;
use crate::domain::config_load::{self, load_simulation_config};
use crate::domain::engine::BacktestEngine;
use crate::domain::entry::{self, EntryDetector};
use crate::domain::error::TradesimError;
use crate::domain::metrics::TradeStats;
use crate::domain::signal::Detection;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "tradesim", about = "Trade-simulation engine for enriched bar series")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a bar series and report the results
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Bar CSV; overrides data_file from the config
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay entry detection only and list historical signals
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
    /// Validate a configuration without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            output,
        } => run_backtest(&config, data.as_ref(), output.as_ref()),
        Command::Scan { config, data } => run_scan(&config, data.as_ref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = TradesimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_bars(
    adapter: &dyn ConfigPort,
    data_override: Option<&PathBuf>,
) -> Result<Vec<Bar>, TradesimError> {
    let source = match data_override {
        Some(path) => path.display().to_string(),
        None => config_load::data_file(adapter)?,
    };
    eprintln!("Loading bars from {source}");
    let bars = CsvDataAdapter::new().fetch_bars(&source)?;
    eprintln!("Loaded {} bars", bars.len());
    Ok(bars)
}

fn run_backtest(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    output_path: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let sim = match load_simulation_config(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let engine = match BacktestEngine::new(sim) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 2: load data
    let bars = match load_bars(&adapter, data_override) {
        Ok(bars) => bars,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: replay
    eprintln!("Replaying...");
    let result = match engine.run(&bars) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let stats = TradeStats::compute(&result.trades);
    eprintln!(
        "Done: {} trades, final capital {:.2}",
        stats.count, result.final_capital
    );

    // Stage 4: report
    match output_path {
        Some(path) => {
            let report = TextReportAdapter::new();
            if let Err(e) = report.write(&result, &stats, &path.display().to_string()) {
                eprintln!("error: {e}");
                return (&e).into();
            }
            eprintln!("Report written to {}", path.display());
        }
        None => print!("{}", text_report_adapter::render(&result, &stats)),
    }
    ExitCode::SUCCESS
}

fn run_scan(config_path: &PathBuf, data_override: Option<&PathBuf>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let detector = match config_load::load_entry_config(&adapter).and_then(EntryDetector::new) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let bars = match load_bars(&adapter, data_override) {
        Ok(bars) => bars,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if bars.len() < entry::MIN_HISTORY {
        let e = TradesimError::InsufficientHistory {
            bars: bars.len(),
            minimum: entry::MIN_HISTORY,
        };
        eprintln!("error: {e}");
        return (&e).into();
    }

    let rows = detector.scan(&bars);
    let mut signals = 0usize;
    for row in &rows {
        if let Detection::Signal(signal) = &row.detection {
            signals += 1;
            println!(
                "{} {:?} confidence {:.0} quality {:.0} [{}]",
                row.timestamp,
                signal.direction,
                signal.confidence,
                signal.quality_score,
                signal.filters_passed.join(",")
            );
        }
    }
    eprintln!("{} signals across {} evaluated bars", signals, rows.len());
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let checked = load_simulation_config(&adapter).and_then(BacktestEngine::new);
    match checked {
        Ok(_) => {
            eprintln!("Configuration OK");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}
