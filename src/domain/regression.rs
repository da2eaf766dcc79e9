//! Held-out scoring for one-step-ahead predictions.

use super::error::NormbenchError;
use super::normalizer::mean;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionScore {
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
}

impl RegressionScore {
    /// Score `predicted` against `actual`.
    ///
    /// Fails when the slices are empty or of different length, when the
    /// targets are constant (R² undefined), or when any metric is not finite.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, NormbenchError> {
        if actual.is_empty() || actual.len() != predicted.len() {
            return Err(NormbenchError::degenerate(format!(
                "cannot score {} predictions against {} targets",
                predicted.len(),
                actual.len()
            )));
        }

        let n = actual.len() as f64;
        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        for (a, p) in actual.iter().zip(predicted) {
            let err = a - p;
            abs_sum += err.abs();
            sq_sum += err * err;
        }

        let target_mean = mean(actual);
        let ss_tot: f64 = actual.iter().map(|a| (a - target_mean).powi(2)).sum();
        if ss_tot <= 0.0 {
            return Err(NormbenchError::degenerate(
                "held-out targets are constant, R² undefined",
            ));
        }

        let score = RegressionScore {
            mae: abs_sum / n,
            mse: sq_sum / n,
            r2: 1.0 - sq_sum / ss_tot,
        };
        if !(score.mae.is_finite() && score.mse.is_finite() && score.r2.is_finite()) {
            return Err(NormbenchError::degenerate("non-finite score"));
        }
        Ok(score)
    }
}
