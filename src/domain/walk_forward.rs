//! Walk-forward scoring of normalization methods.
//!
//! For each candidate method the full close series is normalized, the last
//! `tail_length` points are held out, and a fresh regressor is fitted on
//! one-step-ahead pairs from the training slice only. The held-out tail
//! produces its own pairs for scoring, so no pair straddles the split.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::error::NormbenchError;
use super::forecast::{FeatureRow, ForecastModel, Regressor};
use super::normalizer::{DEFAULT_EPSILON, NormalizationMethod, normalize};
use super::price_series::PriceSeries;
use super::regression::RegressionScore;

pub const DEFAULT_TAIL_LENGTH: usize = 30;

/// Training points needed ahead of the tail: two one-step pairs.
pub const MIN_TRAINING_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkConfig {
    pub tail_length: usize,
    pub epsilon: f64,
    pub methods: Vec<NormalizationMethod>,
    pub workers: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            tail_length: DEFAULT_TAIL_LENGTH,
            epsilon: DEFAULT_EPSILON,
            methods: NormalizationMethod::ALL.to_vec(),
            workers: 1,
        }
    }
}

impl BenchmarkConfig {
    pub fn min_points(&self) -> usize {
        self.tail_length + MIN_TRAINING_POINTS
    }

    pub fn validate(&self) -> Result<(), NormbenchError> {
        if self.tail_length < 2 {
            return Err(NormbenchError::config_invalid(
                "benchmark",
                "tail_length",
                "tail_length must be at least 2",
            ));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(NormbenchError::config_invalid(
                "benchmark",
                "epsilon",
                "epsilon must be finite and non-negative",
            ));
        }
        if self.methods.is_empty() {
            return Err(NormbenchError::config_invalid(
                "benchmark",
                "methods",
                "at least one method is required",
            ));
        }
        if self.workers == 0 {
            return Err(NormbenchError::config_invalid(
                "benchmark",
                "workers",
                "workers must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Held-out score of one method on one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodMetrics {
    pub instrument: String,
    pub method: NormalizationMethod,
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
}

/// The leaderboard row chosen for an instrument.
pub type BestMethodSelection = MethodMetrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMethod {
    pub instrument: String,
    pub method: NormalizationMethod,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub instrument: String,
    pub leaderboard: Vec<MethodMetrics>,
    pub skipped: Vec<SkippedMethod>,
}

impl EvaluationReport {
    pub fn is_total_failure(&self) -> bool {
        self.leaderboard.is_empty()
    }
}

/// Input `value[t]`, target `value[t+1]`, both inside `values`.
pub fn one_step_pairs(values: &[f64]) -> (Vec<FeatureRow>, Vec<f64>) {
    values
        .windows(2)
        .map(|w| (FeatureRow::new(vec![w[0]]), w[1]))
        .unzip()
}

/// Split point between training slice and held-out tail.
pub fn split_index(len: usize, tail_length: usize) -> usize {
    len.saturating_sub(tail_length)
}

/// Score every configured method on `series`.
///
/// Per-method numeric failures are recorded in `skipped` and do not stop
/// the remaining methods. A series too short to split, or a cancelled
/// token, is returned as an error.
pub fn evaluate<R, F>(
    series: &PriceSeries,
    config: &BenchmarkConfig,
    make_model: F,
    cancel: &CancelToken,
) -> Result<EvaluationReport, NormbenchError>
where
    R: Regressor,
    F: Fn() -> R,
{
    let instrument = series.instrument().to_string();
    let need = config.min_points();
    if series.len() < need {
        return Err(NormbenchError::InsufficientData {
            instrument,
            have: series.len(),
            need,
        });
    }

    let closes = series.closes();
    let mut leaderboard = Vec::with_capacity(config.methods.len());
    let mut skipped = Vec::new();

    for &method in &config.methods {
        if cancel.is_cancelled() {
            return Err(NormbenchError::Cancelled);
        }

        match score_method(&closes, method, config, make_model()) {
            Ok(score) => {
                debug!(
                    instrument = %instrument,
                    method = %method,
                    r2 = score.r2,
                    mae = score.mae,
                    mse = score.mse,
                    "method scored"
                );
                leaderboard.push(MethodMetrics {
                    instrument: instrument.clone(),
                    method,
                    mae: score.mae,
                    mse: score.mse,
                    r2: score.r2,
                });
            }
            Err(e) if e.is_recoverable() => {
                warn!(instrument = %instrument, method = %method, error = %e, "method skipped");
                skipped.push(SkippedMethod {
                    instrument: instrument.clone(),
                    method,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        instrument = %instrument,
        scored = leaderboard.len(),
        skipped = skipped.len(),
        "evaluation finished"
    );

    Ok(EvaluationReport {
        instrument,
        leaderboard,
        skipped,
    })
}

fn score_method<R: Regressor>(
    closes: &[f64],
    method: NormalizationMethod,
    config: &BenchmarkConfig,
    mut model: R,
) -> Result<RegressionScore, NormbenchError> {
    let normalized = normalize(closes, method, config.epsilon)?;
    let split = split_index(normalized.len(), config.tail_length);
    let (train, tail) = normalized.values.split_at(split);

    let (train_inputs, train_targets) = one_step_pairs(train);
    let (test_inputs, test_targets) = one_step_pairs(tail);

    model.fit(&train_inputs, &train_targets)?;

    let predictions = test_inputs
        .iter()
        .map(|row| model.predict(row))
        .collect::<Result<Vec<f64>, _>>()?;

    RegressionScore::compute(&test_targets, &predictions)
}

/// Pick the highest-R² row per instrument.
///
/// Instruments appear in first-seen order. On equal R² the earlier row
/// wins. A NaN R² never beats a finite one.
pub fn select_best(leaderboard: &[MethodMetrics]) -> Vec<BestMethodSelection> {
    let mut winners: Vec<&MethodMetrics> = Vec::new();
    let mut slot_by_instrument: HashMap<&str, usize> = HashMap::new();

    for row in leaderboard {
        match slot_by_instrument.get(row.instrument.as_str()) {
            Some(&slot) => {
                let current = winners[slot];
                if row.r2 > current.r2 || (current.r2.is_nan() && !row.r2.is_nan()) {
                    winners[slot] = row;
                }
            }
            None => {
                slot_by_instrument.insert(row.instrument.as_str(), winners.len());
                winners.push(row);
            }
        }
    }

    winners.into_iter().cloned().collect()
}
