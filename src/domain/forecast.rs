//! Forecast capability and the models shipped with the crate.
//!
//! A model predicts the next value from one of two input shapes:
//! [`PriceWindow`] (the most recent closes, used by the strategy executor)
//! and [`FeatureRow`] (an arbitrary feature vector, used when scoring
//! normalization methods). The shapes are separate types so one cannot be
//! passed where the other is expected.

use super::error::NormbenchError;
use super::price_series::PriceSeries;

/// Fixed-width window of the most recent closes, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceWindow(Vec<f64>);

impl PriceWindow {
    pub fn new(closes: Vec<f64>) -> Self {
        PriceWindow(closes)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One supervised input row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow(Vec<f64>);

impl FeatureRow {
    pub fn new(features: Vec<f64>) -> Self {
        FeatureRow(features)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub trait ForecastModel<I> {
    fn predict(&self, input: &I) -> Result<f64, NormbenchError>;
}

/// A model that can be trained on feature rows.
pub trait Regressor: ForecastModel<FeatureRow> {
    fn fit(&mut self, inputs: &[FeatureRow], targets: &[f64]) -> Result<(), NormbenchError>;
}

/// Ordinary least squares with an intercept.
///
/// Solves the centred normal equations `(X'X) b = X'y` by Gaussian
/// elimination with partial pivoting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearRegression {
    pub intercept: Option<f64>,
    pub coefficients: Option<Vec<f64>>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    fn predict_slice(&self, features: &[f64]) -> Result<f64, NormbenchError> {
        let (intercept, coefficients) = match (self.intercept, self.coefficients.as_ref()) {
            (Some(i), Some(c)) => (i, c),
            _ => return Err(NormbenchError::model_fit("model has not been fitted")),
        };
        if features.len() != coefficients.len() {
            return Err(NormbenchError::model_fit(format!(
                "expected {} features, got {}",
                coefficients.len(),
                features.len()
            )));
        }
        let value = intercept
            + features
                .iter()
                .zip(coefficients)
                .map(|(x, b)| x * b)
                .sum::<f64>();
        if value.is_finite() {
            Ok(value)
        } else {
            Err(NormbenchError::model_fit("prediction is not finite"))
        }
    }
}

impl ForecastModel<FeatureRow> for LinearRegression {
    fn predict(&self, input: &FeatureRow) -> Result<f64, NormbenchError> {
        self.predict_slice(input.as_slice())
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, inputs: &[FeatureRow], targets: &[f64]) -> Result<(), NormbenchError> {
        if inputs.len() != targets.len() {
            return Err(NormbenchError::model_fit(format!(
                "{} input rows but {} targets",
                inputs.len(),
                targets.len()
            )));
        }
        let width = match inputs.first() {
            Some(row) => row.len(),
            None => return Err(NormbenchError::model_fit("no training rows")),
        };
        if inputs.iter().any(|row| row.len() != width) {
            return Err(NormbenchError::model_fit("ragged feature rows"));
        }
        let k = width + 1;
        if inputs.len() < k {
            return Err(NormbenchError::model_fit(format!(
                "{} rows cannot determine {} coefficients",
                inputs.len(),
                k
            )));
        }

        // Centre features and targets so the Gram matrix scales with the
        // spread of each column, not its level. The intercept is recovered
        // from the means afterwards.
        let n = inputs.len() as f64;
        let mut x_mean = vec![0.0; width];
        for row in inputs {
            for (m, x) in x_mean.iter_mut().zip(row.as_slice()) {
                *m += x / n;
            }
        }
        let y_mean = targets.iter().sum::<f64>() / n;

        let mut xtx = vec![vec![0.0; width]; width];
        let mut xty = vec![0.0; width];
        for (row, &y) in inputs.iter().zip(targets) {
            let centred: Vec<f64> = row
                .as_slice()
                .iter()
                .zip(&x_mean)
                .map(|(x, m)| x - m)
                .collect();
            let dy = y - y_mean;
            for i in 0..width {
                xty[i] += centred[i] * dy;
                for j in 0..width {
                    xtx[i][j] += centred[i] * centred[j];
                }
            }
        }

        let beta = solve_linear_system(xtx, xty)?;
        let intercept = y_mean - beta.iter().zip(&x_mean).map(|(b, m)| b * m).sum::<f64>();
        if !intercept.is_finite() || beta.iter().any(|b| !b.is_finite()) {
            return Err(NormbenchError::model_fit("non-finite coefficients"));
        }

        self.intercept = Some(intercept);
        self.coefficients = Some(beta);
        Ok(())
    }
}

/// Relative pivot size below which a column counts as dependent on the
/// columns before it.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve a symmetric positive semi-definite system by Gaussian elimination.
///
/// Each pivot is compared against its own column's diagonal, so the test is
/// independent of how large the feature values are.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, NormbenchError> {
    let n = b.len();
    let diagonal: Vec<f64> = (0..n).map(|i| a[i][i]).collect();
    if diagonal.iter().any(|d| !d.is_finite()) {
        return Err(NormbenchError::model_fit("singular system (non-finite features)"));
    }

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        let pivot = a[pivot_row][col].abs();
        if diagonal[col] <= 0.0 || pivot <= diagonal[col] * PIVOT_TOLERANCE {
            return Err(NormbenchError::model_fit(
                "singular system (features have no variance)",
            ));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Fits a straight line through the window and extrapolates one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendModel;

impl ForecastModel<PriceWindow> for TrendModel {
    fn predict(&self, input: &PriceWindow) -> Result<f64, NormbenchError> {
        let values = input.as_slice();
        let n = values.len();
        if n < 2 {
            return Err(NormbenchError::model_fit(format!(
                "trend needs at least 2 closes, got {}",
                n
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(NormbenchError::model_fit("window contains non-finite closes"));
        }

        let nf = n as f64;
        let x_mean = (nf - 1.0) / 2.0;
        let y_mean = values.iter().sum::<f64>() / nf;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }
        let slope = sxy / sxx;
        Ok(y_mean + slope * (nf - x_mean))
    }
}

/// Linear autoregression on the last `lags` closes.
#[derive(Debug, Clone)]
pub struct LaggedModel {
    lags: usize,
    regression: LinearRegression,
}

impl LaggedModel {
    /// Train on every `lags`-wide window of `closes` predicting the close after it.
    pub fn train(closes: &[f64], lags: usize) -> Result<Self, NormbenchError> {
        if lags == 0 {
            return Err(NormbenchError::model_fit("lags must be positive"));
        }
        if closes.len() <= lags {
            return Err(NormbenchError::model_fit(format!(
                "need more than {} closes to train, got {}",
                lags,
                closes.len()
            )));
        }

        let inputs: Vec<FeatureRow> = closes
            .windows(lags)
            .take(closes.len() - lags)
            .map(|w| FeatureRow::new(w.to_vec()))
            .collect();
        let targets = &closes[lags..];

        let mut regression = LinearRegression::new();
        regression.fit(&inputs, targets)?;
        Ok(Self { lags, regression })
    }

    pub fn lags(&self) -> usize {
        self.lags
    }
}

impl ForecastModel<PriceWindow> for LaggedModel {
    fn predict(&self, input: &PriceWindow) -> Result<f64, NormbenchError> {
        let values = input.as_slice();
        if values.len() < self.lags {
            return Err(NormbenchError::model_fit(format!(
                "window of {} closes is shorter than {} lags",
                values.len(),
                self.lags
            )));
        }
        self.regression
            .predict_slice(&values[values.len() - self.lags..])
    }
}

/// Price-window model selected for a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Trend,
    /// `train_bars` leading closes fit the model; `None` uses the first half.
    Lagged {
        lags: usize,
        train_bars: Option<usize>,
    },
}

/// A model together with the bars it may be run on.
///
/// For a trained model `feed` starts after the training prefix, so no
/// forecast is made on a bar the model was fitted on.
pub struct PreparedModel {
    pub model: Box<dyn ForecastModel<PriceWindow>>,
    pub feed: PriceSeries,
    pub train_bars: usize,
}

impl ModelKind {
    /// Shortest window the model can predict from.
    pub fn min_window(&self) -> usize {
        match self {
            ModelKind::Trend => 2,
            ModelKind::Lagged { lags, .. } => *lags,
        }
    }

    /// Build the model for `series`, training `Lagged` on a leading prefix.
    pub fn prepare(&self, series: &PriceSeries) -> Result<PreparedModel, NormbenchError> {
        match self {
            ModelKind::Trend => Ok(PreparedModel {
                model: Box::new(TrendModel),
                feed: series.clone(),
                train_bars: 0,
            }),
            ModelKind::Lagged { lags, train_bars } => {
                let train_bars = train_bars.unwrap_or(series.len() / 2);
                if train_bars >= series.len() {
                    return Err(NormbenchError::InsufficientData {
                        instrument: series.instrument().to_string(),
                        have: series.len(),
                        need: train_bars + 1,
                    });
                }
                let closes = series.closes();
                let model = LaggedModel::train(&closes[..train_bars], *lags)?;
                Ok(PreparedModel {
                    model: Box::new(model),
                    feed: series.tail_from(train_bars)?,
                    train_bars,
                })
            }
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Trend => write!(f, "trend"),
            ModelKind::Lagged { lags, .. } => write!(f, "lagged({})", lags),
        }
    }
}
