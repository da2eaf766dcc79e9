//! Close-series transforms compared by the benchmark.
//!
//! Every transform returns a series of the same length and order as its
//! input. Z-Score uses the population standard deviation (divide by `n`).
//! Box-Cox and Log shift the input by `epsilon` before transforming.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::error::NormbenchError;

pub const DEFAULT_EPSILON: f64 = 1e-6;

const BOXCOX_LAMBDA_MIN: f64 = -5.0;
const BOXCOX_LAMBDA_MAX: f64 = 5.0;
const BOXCOX_TOLERANCE: f64 = 1e-8;
/// A lambda this close to either search bound is reported as clamped.
const BOXCOX_BOUND_MARGIN: f64 = 1e-6;
const LAMBDA_ZERO: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    ZScore,
    MinMax,
    BoxCox,
    Log,
}

impl NormalizationMethod {
    pub const ALL: [NormalizationMethod; 4] = [
        NormalizationMethod::ZScore,
        NormalizationMethod::MinMax,
        NormalizationMethod::BoxCox,
        NormalizationMethod::Log,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NormalizationMethod::ZScore => "zscore",
            NormalizationMethod::MinMax => "minmax",
            NormalizationMethod::BoxCox => "boxcox",
            NormalizationMethod::Log => "log",
        }
    }
}

impl fmt::Display for NormalizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NormalizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "zscore" => Ok(NormalizationMethod::ZScore),
            "minmax" => Ok(NormalizationMethod::MinMax),
            "boxcox" => Ok(NormalizationMethod::BoxCox),
            "log" => Ok(NormalizationMethod::Log),
            other => Err(format!("unknown normalization method '{}'", other)),
        }
    }
}

/// Parse a comma-separated method list, rejecting unknown names and duplicates.
pub fn parse_methods(input: &str) -> Result<Vec<NormalizationMethod>, String> {
    let mut methods = Vec::new();
    for token in input.split(',') {
        if token.trim().is_empty() {
            return Err("empty token in method list".to_string());
        }
        let method: NormalizationMethod = token.parse()?;
        if methods.contains(&method) {
            return Err(format!("duplicate method '{}'", method));
        }
        methods.push(method);
    }
    Ok(methods)
}

/// Parameters fitted while transforming, kept so values can be mapped back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformParams {
    ZScore { mean: f64, std: f64 },
    MinMax { min: f64, max: f64 },
    BoxCox { lambda: f64, epsilon: f64 },
    Log { epsilon: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    pub method: NormalizationMethod,
    pub values: Vec<f64>,
    pub params: TransformParams,
}

impl NormalizedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Map a transformed value back to price space.
    pub fn denormalize(&self, value: f64) -> f64 {
        match self.params {
            TransformParams::ZScore { mean, std } => value * std + mean,
            TransformParams::MinMax { min, max } => value * (max - min) + min,
            TransformParams::BoxCox { lambda, epsilon } => {
                if lambda.abs() < LAMBDA_ZERO {
                    value.exp() - epsilon
                } else {
                    (lambda * value + 1.0).powf(1.0 / lambda) - epsilon
                }
            }
            TransformParams::Log { epsilon } => value.exp() - epsilon,
        }
    }
}

pub fn normalize(
    values: &[f64],
    method: NormalizationMethod,
    epsilon: f64,
) -> Result<NormalizedSeries, NormbenchError> {
    if values.is_empty() {
        return Err(NormbenchError::degenerate("cannot normalize an empty series"));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(NormbenchError::degenerate("series contains non-finite values"));
    }

    match method {
        NormalizationMethod::ZScore => zscore(values),
        NormalizationMethod::MinMax => min_max(values),
        NormalizationMethod::BoxCox => box_cox(values, epsilon),
        NormalizationMethod::Log => log(values, epsilon),
    }
}

fn zscore(values: &[f64]) -> Result<NormalizedSeries, NormbenchError> {
    let mean = mean(values);
    let std = population_variance(values, mean).sqrt();
    if std <= 0.0 || !std.is_finite() {
        return Err(NormbenchError::degenerate("zero variance, z-score undefined"));
    }

    Ok(NormalizedSeries {
        method: NormalizationMethod::ZScore,
        values: values.iter().map(|v| (v - mean) / std).collect(),
        params: TransformParams::ZScore { mean, std },
    })
}

fn min_max(values: &[f64]) -> Result<NormalizedSeries, NormbenchError> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return Err(NormbenchError::degenerate(
            "constant series, min-max range is zero",
        ));
    }

    Ok(NormalizedSeries {
        method: NormalizationMethod::MinMax,
        values: values.iter().map(|v| (v - min) / range).collect(),
        params: TransformParams::MinMax { min, max },
    })
}

fn box_cox(values: &[f64], epsilon: f64) -> Result<NormalizedSeries, NormbenchError> {
    let shifted = shift_positive(values, epsilon, "box-cox")?;

    let first = shifted[0];
    if shifted.iter().all(|&v| v == first) {
        return Err(NormbenchError::degenerate(
            "constant series, box-cox lambda undefined",
        ));
    }

    let log_sum: f64 = shifted.iter().map(|v| v.ln()).sum();
    let lambda = golden_section_max(
        |lambda| box_cox_log_likelihood(&shifted, log_sum, lambda),
        BOXCOX_LAMBDA_MIN,
        BOXCOX_LAMBDA_MAX,
        BOXCOX_TOLERANCE,
    );
    if lambda_at_bound(lambda) {
        warn!(lambda, "box-cox lambda clamped at the search bound");
    } else {
        debug!(lambda, "box-cox lambda estimated");
    }

    let transformed: Vec<f64> = shifted
        .iter()
        .map(|&v| box_cox_value(v, lambda))
        .collect();
    if transformed.iter().any(|v| !v.is_finite()) {
        return Err(NormbenchError::degenerate(format!(
            "box-cox produced non-finite values at lambda {:.4}",
            lambda
        )));
    }

    Ok(NormalizedSeries {
        method: NormalizationMethod::BoxCox,
        values: transformed,
        params: TransformParams::BoxCox { lambda, epsilon },
    })
}

fn log(values: &[f64], epsilon: f64) -> Result<NormalizedSeries, NormbenchError> {
    let shifted = shift_positive(values, epsilon, "log")?;

    Ok(NormalizedSeries {
        method: NormalizationMethod::Log,
        values: shifted.iter().map(|v| v.ln()).collect(),
        params: TransformParams::Log { epsilon },
    })
}

fn shift_positive(values: &[f64], epsilon: f64, name: &str) -> Result<Vec<f64>, NormbenchError> {
    let shifted: Vec<f64> = values.iter().map(|v| v + epsilon).collect();
    if let Some(pos) = shifted.iter().position(|&v| v <= 0.0) {
        return Err(NormbenchError::invalid_domain(format!(
            "{} requires values above {}, got {} at index {}",
            name, -epsilon, values[pos], pos
        )));
    }
    Ok(shifted)
}

fn lambda_at_bound(lambda: f64) -> bool {
    (lambda - BOXCOX_LAMBDA_MIN).abs() < BOXCOX_BOUND_MARGIN
        || (lambda - BOXCOX_LAMBDA_MAX).abs() < BOXCOX_BOUND_MARGIN
}

fn box_cox_value(x: f64, lambda: f64) -> f64 {
    if lambda.abs() < LAMBDA_ZERO {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

/// Profile log-likelihood of the Box-Cox transform at `lambda`.
fn box_cox_log_likelihood(shifted: &[f64], log_sum: f64, lambda: f64) -> f64 {
    let n = shifted.len() as f64;
    let transformed: Vec<f64> = shifted
        .iter()
        .map(|&v| box_cox_value(v, lambda))
        .collect();
    let m = mean(&transformed);
    let variance = population_variance(&transformed, m);
    if variance <= 0.0 || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }
    (lambda - 1.0) * log_sum - n / 2.0 * variance.ln()
}

fn golden_section_max<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64, tolerance: f64) -> f64 {
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    while (b - a).abs() > tolerance {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = f(d);
        }
    }

    (a + b) / 2.0
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
