//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvSeriesAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::benchmark::{BenchmarkReport, run_benchmark};
use crate::domain::cancel::CancelToken;
use crate::domain::config_validation::{
    DataSource, load_benchmark_config, load_data_source, load_executor_config, load_instruments,
    load_model_kind, validate_benchmark_config, validate_strategy_config,
};
use crate::domain::error::NormbenchError;
use crate::domain::executor::{ExecutorConfig, SimulationResult, StrategyExecutor};
use crate::domain::forecast::{LinearRegression, ModelKind};
use crate::domain::performance::Performance;
use crate::domain::walk_forward::BenchmarkConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;
use crate::ports::series_port::SeriesPort;

pub const DEFAULT_OUTPUT_DIR: &str = "reports";

#[derive(Parser, Debug)]
#[command(
    name = "normbench",
    about = "Normalization benchmark and forecast-driven strategy simulator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score every normalization method on each instrument
    Benchmark {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated instruments, overriding the config
        #[arg(long)]
        instrument: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run the forecast-driven strategy over each instrument
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List instruments available from the configured source
    Instruments {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Benchmark {
            config,
            instrument,
            output,
            workers,
        } => run_benchmark_command(&config, instrument.as_deref(), output.as_deref(), workers),
        Command::Simulate {
            config,
            instrument,
            output,
        } => run_simulate_command(&config, instrument.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Instruments { config } => run_list_instruments(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, NormbenchError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

pub fn open_series_port(
    source: &DataSource,
) -> Result<Box<dyn SeriesPort + Sync>, NormbenchError> {
    match source {
        DataSource::Csv { dir } => {
            info!(dir = %dir, "reading series from csv directory");
            Ok(Box::new(CsvSeriesAdapter::new(dir)))
        }
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite { path, pool_size } => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            info!(path = %path, pool_size, "reading series from sqlite");
            Ok(Box::new(SqliteAdapter::open(path, *pool_size)?))
        }
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite { .. } => Err(NormbenchError::config_invalid(
            "data",
            "source",
            "sqlite feature is not enabled in this build",
        )),
    }
}

/// Instruments from the command line, else the config, else everything the
/// source lists.
pub fn resolve_instruments(
    override_list: Option<&str>,
    config: &dyn ConfigPort,
    port: &dyn SeriesPort,
) -> Result<Vec<String>, NormbenchError> {
    let instruments = match override_list {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => match load_instruments(config)? {
            Some(list) => list,
            None => port.list_instruments()?,
        },
    };

    if instruments.is_empty() {
        return Err(NormbenchError::ConfigMissing {
            section: "benchmark".to_string(),
            key: "instruments".to_string(),
        });
    }
    Ok(instruments)
}

pub fn resolve_output_dir(override_dir: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => config
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    }
}

fn run_benchmark_command(
    config_path: &Path,
    instrument: Option<&str>,
    output: Option<&Path>,
    workers: Option<usize>,
) -> Result<(), NormbenchError> {
    let adapter = load_config(config_path)?;
    validate_benchmark_config(&adapter)?;

    let mut benchmark = load_benchmark_config(&adapter)?;
    if let Some(workers) = workers {
        benchmark.workers = workers;
        benchmark.validate()?;
    }

    let port = open_series_port(&load_data_source(&adapter)?)?;
    let instruments = resolve_instruments(instrument, &adapter, port.as_ref())?;
    let reporter = CsvReportAdapter::new(resolve_output_dir(output, &adapter));

    let report = run_benchmark_pipeline(
        port.as_ref(),
        &instruments,
        &benchmark,
        &reporter,
        &CancelToken::new(),
    )?;
    print_benchmark_summary(&report);
    eprintln!("\nReports written to: {}", reporter.output_dir().display());

    if report.reports.is_empty() {
        return Err(NormbenchError::Data {
            reason: "no instrument could be evaluated".to_string(),
        });
    }
    Ok(())
}

/// Evaluate `instruments` and persist the three benchmark tables.
pub fn run_benchmark_pipeline(
    port: &(dyn SeriesPort + Sync),
    instruments: &[String],
    config: &BenchmarkConfig,
    reporter: &dyn ReportPort,
    cancel: &CancelToken,
) -> Result<BenchmarkReport, NormbenchError> {
    eprintln!(
        "Benchmarking {} instruments with {} methods...",
        instruments.len(),
        config.methods.len()
    );
    let report = run_benchmark(port, instruments, config, LinearRegression::new, cancel)?;
    reporter.write_benchmark(&report)?;
    Ok(report)
}

fn print_benchmark_summary(report: &BenchmarkReport) {
    eprintln!("\n=== Best Method per Instrument ===");
    for best in &report.selections {
        eprintln!(
            "  {}:  {}  R2 {:.4}  MAE {:.4}  MSE {:.6}",
            best.instrument, best.method, best.r2, best.mae, best.mse
        );
    }

    let skipped_methods = report.skipped_methods();
    if !skipped_methods.is_empty() {
        eprintln!("\n=== Skipped Methods ===");
        for s in &skipped_methods {
            eprintln!("  {} / {}: {}", s.instrument, s.method, s.reason);
        }
    }

    if !report.skipped_instruments.is_empty() {
        eprintln!("\n=== Skipped Instruments ===");
        for s in &report.skipped_instruments {
            eprintln!("  {}: {}", s.instrument, s.reason);
        }
    }
}

fn run_simulate_command(
    config_path: &Path,
    instrument: Option<&str>,
    output: Option<&Path>,
) -> Result<(), NormbenchError> {
    let adapter = load_config(config_path)?;
    validate_strategy_config(&adapter)?;

    let executor_config = load_executor_config(&adapter)?;
    let model = load_model_kind(&adapter)?;
    let port = open_series_port(&load_data_source(&adapter)?)?;
    let instruments = resolve_instruments(instrument, &adapter, port.as_ref())?;
    let reporter = CsvReportAdapter::new(resolve_output_dir(output, &adapter));

    let results = run_simulation_pipeline(
        port.as_ref(),
        &instruments,
        &executor_config,
        model,
        &reporter,
        &CancelToken::new(),
    )?;

    if results.is_empty() {
        return Err(NormbenchError::Data {
            reason: "no instrument could be simulated".to_string(),
        });
    }
    eprintln!("\nReports written to: {}", reporter.output_dir().display());
    Ok(())
}

/// Simulate each instrument in turn, printing a summary and persisting the
/// equity curve and trade log. A trained model only runs on the bars after
/// its training prefix. Instruments that cannot be loaded, trained or run
/// are skipped with a warning.
pub fn run_simulation_pipeline(
    port: &dyn SeriesPort,
    instruments: &[String],
    config: &ExecutorConfig,
    model: ModelKind,
    reporter: &dyn ReportPort,
    cancel: &CancelToken,
) -> Result<Vec<(SimulationResult, Performance)>, NormbenchError> {
    let executor = StrategyExecutor::new(config.clone())?;
    let mut results = Vec::with_capacity(instruments.len());

    eprintln!(
        "Simulating {} instruments: model {}, lookback {}, risk {}%",
        instruments.len(),
        model,
        config.lookback,
        config.risk_percent
    );

    for instrument in instruments {
        let series = match port.fetch_series(instrument) {
            Ok(s) => s,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "instrument not loaded, skipped");
                eprintln!("warning: skipping {} ({})", instrument, e);
                continue;
            }
        };

        let prepared = match model.prepare(&series) {
            Ok(p) => p,
            Err(e) if e.is_recoverable() => {
                warn!(instrument = %instrument, error = %e, "model not prepared, skipped");
                eprintln!("warning: skipping {} ({})", instrument, e);
                continue;
            }
            Err(e) => return Err(e),
        };
        if prepared.train_bars > 0 {
            info!(
                instrument = %instrument,
                train_bars = prepared.train_bars,
                simulated_bars = prepared.feed.len(),
                "model trained on leading bars"
            );
        }

        let result = match executor.run(prepared.model.as_ref(), &prepared.feed, cancel) {
            Ok(r) => r,
            Err(e) if e.is_recoverable() => {
                eprintln!("warning: skipping {} ({})", instrument, e);
                continue;
            }
            Err(e) => return Err(e),
        };

        let performance = Performance::compute(&result, config.initial_cash);
        print_simulation_summary(&result, &performance);
        reporter.write_simulation(&result)?;

        let cancelled = cancel.is_cancelled();
        results.push((result, performance));
        if cancelled {
            return Err(NormbenchError::Cancelled);
        }
    }

    Ok(results)
}

fn print_simulation_summary(result: &SimulationResult, perf: &Performance) {
    eprintln!("\n=== {} ({:?}) ===", result.instrument, result.phase);
    eprintln!("Bars:             {}", result.bars_processed());
    eprintln!("Final Equity:     {:.2}", perf.final_equity);
    eprintln!("Total Return:     {:.2}%", perf.total_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", perf.sharpe_ratio);
    eprintln!(
        "Max Drawdown:     -{:.1}% over {} bars",
        perf.max_drawdown * 100.0,
        perf.max_drawdown_duration
    );
    eprintln!("Closed Trades:    {}", perf.total_trades());
    eprintln!("Win Rate:         {:.1}%", perf.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", perf.profit_factor);
    if result.account.has_position() {
        eprintln!("Open Position:    {} shares", result.account.position_size);
    }
    if !result.failures.is_empty() {
        eprintln!("Skipped Bars:     {}", result.failures.len());
    }
}

fn run_validate(config_path: &Path) -> Result<(), NormbenchError> {
    let adapter = load_config(config_path)?;
    validate_benchmark_config(&adapter)?;
    validate_strategy_config(&adapter)?;

    let benchmark = load_benchmark_config(&adapter)?;
    let executor = load_executor_config(&adapter)?;
    let model = load_model_kind(&adapter)?;

    eprintln!("\nData source:  {:?}", load_data_source(&adapter)?);
    match load_instruments(&adapter)? {
        Some(list) => eprintln!("Instruments:  {}", list.join(", ")),
        None => eprintln!("Instruments:  all available"),
    }
    let methods: Vec<String> = benchmark.methods.iter().map(|m| m.to_string()).collect();
    eprintln!("Methods:      {}", methods.join(", "));
    eprintln!("Tail length:  {}", benchmark.tail_length);
    eprintln!("Epsilon:      {}", benchmark.epsilon);
    eprintln!("Workers:      {}", benchmark.workers);
    eprintln!("Model:        {}", model);
    if let ModelKind::Lagged { train_bars, .. } = model {
        match train_bars {
            Some(bars) => eprintln!("Train bars:   {}", bars),
            None => eprintln!("Train bars:   first half of each series"),
        }
    }
    eprintln!("Lookback:     {}", executor.lookback);
    eprintln!("Risk:         {}%", executor.risk_percent);
    eprintln!("Initial cash: {}", executor.initial_cash);
    eprintln!(
        "Output dir:   {}",
        resolve_output_dir(None, &adapter).display()
    );

    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn run_list_instruments(config_path: &Path) -> Result<(), NormbenchError> {
    let adapter = load_config(config_path)?;
    let port = open_series_port(&load_data_source(&adapter)?)?;
    let instruments = port.list_instruments()?;

    if instruments.is_empty() {
        eprintln!("No instruments found");
    } else {
        for instrument in &instruments {
            println!("{}", instrument);
        }
        eprintln!("{} instruments found", instruments.len());
    }
    Ok(())
}
