//! Predictor adapter contract and the built-in baseline models.
//!
//! The walk-forward evaluator only sees a [`Predictor`]: it hands over a
//! [`TrainingWindow`] of strictly-earlier events to `fit`, then asks `predict`
//! for one value per outcome dimension.

use chrono::{DateTime, Utc};
use walkline_core::ModelFitError;
use walkline_data::Event;

/// A read-only view over the events a model may learn from.
#[derive(Debug, Clone, Copy)]
pub struct TrainingWindow<'a> {
    events: &'a [Event],
}

impl<'a> TrainingWindow<'a> {
    #[must_use]
    pub fn new(events: &'a [Event]) -> Self {
        Self { events }
    }

    #[must_use]
    pub fn events(&self) -> &'a [Event] {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Latest timestamp in the window.
    #[must_use]
    pub fn max_timestamp(&self) -> Option<DateTime<Utc>> {
        self.events.iter().map(|e| e.timestamp).max()
    }

    /// Feature rows, one per event. Missing values stay `NaN`.
    #[must_use]
    pub fn feature_matrix(&self) -> Vec<&'a [f64]> {
        self.events.iter().map(|e| e.features.as_slice()).collect()
    }

    /// Target column for one outcome dimension.
    #[must_use]
    pub fn targets(&self, dimension: usize) -> Vec<f64> {
        self.events
            .iter()
            .map(|e| e.outcomes.get(dimension).copied().unwrap_or(f64::NAN))
            .collect()
    }

    /// Number of outcome dimensions, taken from the first event.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.events.first().map_or(0, |e| e.outcomes.len())
    }
}

/// Fit/predict contract for an opaque model.
///
/// Implementations must be `Clone` so the evaluator can keep the last
/// successfully fit model when a retrain fails.
pub trait Predictor: Clone {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Fits the model on a training window.
    ///
    /// # Errors
    /// Returns `ModelFitError` if the window is empty or degenerate.
    fn fit(&mut self, window: &TrainingWindow<'_>) -> Result<(), ModelFitError>;

    /// Predicts one value per outcome dimension.
    ///
    /// # Errors
    /// Returns `ModelFitError::NotFitted` before the first successful fit, or
    /// `FeatureWidth` if the row does not match the training width.
    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, ModelFitError>;
}

// ============================================
// Mean baseline
// ============================================

/// Predicts the training-window mean of each outcome, ignoring features.
#[derive(Debug, Clone, Default)]
pub struct MeanPredictor {
    means: Option<Vec<f64>>,
}

impl MeanPredictor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for MeanPredictor {
    fn name(&self) -> &str {
        "mean"
    }

    fn fit(&mut self, window: &TrainingWindow<'_>) -> Result<(), ModelFitError> {
        if window.is_empty() {
            return Err(ModelFitError::EmptyWindow);
        }
        let mut means = Vec::with_capacity(window.dimensions());
        for d in 0..window.dimensions() {
            let targets = window.targets(d);
            if targets.iter().any(|t| !t.is_finite()) {
                return Err(ModelFitError::Degenerate(format!(
                    "non-finite target in dimension {d}"
                )));
            }
            means.push(mean(&targets));
        }
        self.means = Some(means);
        Ok(())
    }

    fn predict(&self, _features: &[f64]) -> Result<Vec<f64>, ModelFitError> {
        self.means.clone().ok_or(ModelFitError::NotFitted)
    }
}

// ============================================
// Ridge regression
// ============================================

#[derive(Debug, Clone)]
struct LinearModel {
    /// Column means used to centre features and impute missing values.
    feature_means: Vec<f64>,
    /// One coefficient vector per outcome dimension.
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

/// L2-regularised least squares, one linear model per outcome dimension.
///
/// Features are mean-centred and missing values imputed with the column
/// mean; the intercept is not penalised.
#[derive(Debug, Clone)]
pub struct RidgeRegressor {
    lambda: f64,
    model: Option<LinearModel>,
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegressor {
    #[must_use]
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda: lambda.max(0.0),
            model: None,
        }
    }

    /// Fitted coefficients for one dimension.
    #[must_use]
    pub fn coefficients(&self, dimension: usize) -> Option<&[f64]> {
        self.model
            .as_ref()
            .and_then(|m| m.coefficients.get(dimension))
            .map(Vec::as_slice)
    }
}

impl Predictor for RidgeRegressor {
    fn name(&self) -> &str {
        "ridge"
    }

    fn fit(&mut self, window: &TrainingWindow<'_>) -> Result<(), ModelFitError> {
        if window.is_empty() {
            return Err(ModelFitError::EmptyWindow);
        }
        let rows = window.feature_matrix();
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelFitError::FeatureWidth {
                expected: width,
                found: bad.len(),
            });
        }

        let feature_means: Vec<f64> = (0..width)
            .map(|j| {
                let m = mean(&rows.iter().map(|r| r[j]).collect::<Vec<_>>());
                if m.is_finite() {
                    m
                } else {
                    0.0
                }
            })
            .collect();

        // centred design matrix with imputation
        let centred: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| {
                r.iter()
                    .zip(&feature_means)
                    .map(|(&x, &m)| if x.is_finite() { x - m } else { 0.0 })
                    .collect()
            })
            .collect();

        let mut gram = vec![vec![0.0; width]; width];
        for row in &centred {
            for i in 0..width {
                for j in i..width {
                    gram[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 0..width {
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
            gram[i][i] += self.lambda;
        }

        let mut coefficients = Vec::with_capacity(window.dimensions());
        let mut intercepts = Vec::with_capacity(window.dimensions());
        for d in 0..window.dimensions() {
            let y = window.targets(d);
            if y.iter().any(|t| !t.is_finite()) {
                return Err(ModelFitError::Degenerate(format!(
                    "non-finite target in dimension {d}"
                )));
            }
            let y_mean = mean(&y);
            let rhs: Vec<f64> = (0..width)
                .map(|j| {
                    centred
                        .iter()
                        .zip(&y)
                        .map(|(row, &t)| row[j] * (t - y_mean))
                        .sum()
                })
                .collect();
            let w = solve(gram.clone(), rhs).ok_or_else(|| {
                ModelFitError::Degenerate(format!("singular normal equations in dimension {d}"))
            })?;
            let intercept = y_mean - w.iter().zip(&feature_means).map(|(a, m)| a * m).sum::<f64>();
            coefficients.push(w);
            intercepts.push(intercept);
        }

        self.model = Some(LinearModel {
            feature_means,
            coefficients,
            intercepts,
        });
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<Vec<f64>, ModelFitError> {
        let model = self.model.as_ref().ok_or(ModelFitError::NotFitted)?;
        if features.len() != model.feature_means.len() {
            return Err(ModelFitError::FeatureWidth {
                expected: model.feature_means.len(),
                found: features.len(),
            });
        }
        let row: Vec<f64> = features
            .iter()
            .zip(&model.feature_means)
            .map(|(&x, &m)| if x.is_finite() { x } else { m })
            .collect();
        Ok(model
            .coefficients
            .iter()
            .zip(&model.intercepts)
            .map(|(w, b)| b + w.iter().zip(&row).map(|(a, x)| a * x).sum::<f64>())
            .collect())
    }
}

/// Mean of the finite values; `NaN` if there are none.
fn mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return f64::NAN;
    }
    sum / count as f64
}

/// Gaussian elimination with partial pivoting. `None` if singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
