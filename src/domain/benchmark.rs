//! Multi-instrument benchmark runner.
//!
//! Loads each instrument through a [`SeriesPort`], evaluates it and merges
//! the per-instrument reports. Instruments that cannot be loaded or are too
//! short are skipped; configuration errors and cancellation are fatal.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::cancel::CancelToken;
use super::error::NormbenchError;
use super::forecast::Regressor;
use super::walk_forward::{
    BenchmarkConfig, BestMethodSelection, EvaluationReport, MethodMetrics, SkippedMethod,
    evaluate, select_best,
};
use crate::ports::series_port::SeriesPort;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInstrument {
    pub instrument: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BenchmarkReport {
    pub reports: Vec<EvaluationReport>,
    pub selections: Vec<BestMethodSelection>,
    pub skipped_instruments: Vec<SkippedInstrument>,
}

impl BenchmarkReport {
    /// All scored rows, in instrument then method order.
    pub fn leaderboard(&self) -> Vec<MethodMetrics> {
        self.reports
            .iter()
            .flat_map(|r| r.leaderboard.iter().cloned())
            .collect()
    }

    pub fn skipped_methods(&self) -> Vec<SkippedMethod> {
        self.reports
            .iter()
            .flat_map(|r| r.skipped.iter().cloned())
            .collect()
    }
}

enum InstrumentOutcome {
    Evaluated(EvaluationReport),
    Skipped(SkippedInstrument),
}

fn evaluate_instrument<P, R, F>(
    port: &P,
    instrument: &str,
    config: &BenchmarkConfig,
    make_model: &F,
    cancel: &CancelToken,
) -> Result<InstrumentOutcome, NormbenchError>
where
    P: SeriesPort + ?Sized,
    R: Regressor,
    F: Fn() -> R,
{
    if cancel.is_cancelled() {
        return Err(NormbenchError::Cancelled);
    }

    let series = match port.fetch_series(instrument) {
        Ok(series) => series,
        Err(e) => {
            warn!(instrument, error = %e, "instrument not loaded, skipped");
            return Ok(InstrumentOutcome::Skipped(SkippedInstrument {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            }));
        }
    };

    match evaluate(&series, config, make_model, cancel) {
        Ok(report) => Ok(InstrumentOutcome::Evaluated(report)),
        Err(
            e @ (NormbenchError::InsufficientData { .. }
            | NormbenchError::EmptySeries { .. }
            | NormbenchError::UnorderedSeries { .. }),
        ) => {
            warn!(instrument, error = %e, "instrument skipped");
            Ok(InstrumentOutcome::Skipped(SkippedInstrument {
                instrument: instrument.to_string(),
                reason: e.to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

/// Benchmark every instrument in `instruments`.
///
/// With `config.workers > 1` instruments are evaluated on a dedicated rayon
/// pool of that many threads. Results are collected in instrument order, so
/// the report does not depend on the worker count.
pub fn run_benchmark<P, R, F>(
    port: &P,
    instruments: &[String],
    config: &BenchmarkConfig,
    make_model: F,
    cancel: &CancelToken,
) -> Result<BenchmarkReport, NormbenchError>
where
    P: SeriesPort + Sync + ?Sized,
    R: Regressor,
    F: Fn() -> R + Sync,
{
    config.validate()?;

    let workers = config.workers.clamp(1, instruments.len().max(1));
    info!(instruments = instruments.len(), workers, "benchmark started");

    let evaluate_one =
        |instrument: &String| evaluate_instrument(port, instrument, config, &make_model, cancel);

    let outcomes: Vec<Result<InstrumentOutcome, NormbenchError>> = if workers == 1 {
        instruments.iter().map(evaluate_one).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| NormbenchError::Data {
                reason: format!("cannot start {} benchmark workers: {}", workers, e),
            })?;
        pool.install(|| instruments.par_iter().map(evaluate_one).collect())
    };

    let mut report = BenchmarkReport::default();
    for outcome in outcomes {
        match outcome? {
            InstrumentOutcome::Evaluated(evaluation) => {
                if evaluation.is_total_failure() {
                    report.skipped_instruments.push(SkippedInstrument {
                        instrument: evaluation.instrument.clone(),
                        reason: "every method was skipped".to_string(),
                    });
                }
                report.reports.push(evaluation);
            }
            InstrumentOutcome::Skipped(skipped) => report.skipped_instruments.push(skipped),
        }
    }

    report.selections = select_best(&report.leaderboard());

    info!(
        evaluated = report.reports.len(),
        selected = report.selections.len(),
        skipped = report.skipped_instruments.len(),
        "benchmark finished"
    );

    Ok(report)
}
