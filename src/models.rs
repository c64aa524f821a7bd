//! Trainable predictor contract and the ridge regression baseline
//!
//! The walk-forward evaluator is decoupled from model internals: anything
//! implementing [`DemandPredictor`] can be evaluated. Fitting returns a
//! separate fitted type, so predicting with an untrained model is a
//! compile error rather than a runtime one.
//!
//! The baseline shipped here is ridge regression with a small lambda grid,
//! selected by mean validation error over chronological splits. It stands
//! in for heavier regressors; the contract is the point, not the model.

use std::collections::BTreeSet;
use std::ops::Range;

use nalgebra::{DMatrix, DVector};

use crate::error::{DemandForecastError, Result};
use crate::features::FeatureRow;

/// Number of chronological splits used during model selection
pub const N_SPLITS: usize = 5;

/// Default ridge penalty grid
pub const RIDGE_LAMBDA_GRID: [f64; 3] = [0.1, 1.0, 10.0];

/// A fitted model able to predict demand for feature rows
pub trait FittedDemandPredictor {
    /// Predict demand for each row; deterministic, output length equals
    /// input length
    fn predict(&self, x: &[FeatureRow]) -> Result<Vec<f64>>;

    /// Predict demand clipped to be non-negative; the single prediction
    /// path used by both evaluation and single-shot forecasting
    fn predict_non_negative(&self, x: &[FeatureRow]) -> Result<Vec<f64>> {
        Ok(self
            .predict(x)?
            .into_iter()
            .map(|v| v.max(0.0))
            .collect())
    }

    /// Name of the model
    fn name(&self) -> &str;
}

/// A regressor that can be fitted, with model selection, on a training
/// window
pub trait DemandPredictor {
    /// The type of fitted model produced
    type Fitted: FittedDemandPredictor;

    /// Perform model selection and fit on the training window.
    ///
    /// Selection must use a chronological scheme: no validation fold may
    /// contain rows dated earlier than the training rows of its split.
    fn fit_select(&self, x_train: &[FeatureRow], y_train: &[f64]) -> Result<Self::Fitted>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Chronological train/validation splits over `n_rows` time-ordered rows.
///
/// Mirrors a rolling-origin scheme: split `i` trains on a prefix and
/// validates on the block immediately after it, so validation rows never
/// precede their training rows. Returns no splits when the series is too
/// short to carve `n_splits + 1` blocks.
pub fn chronological_splits(n_rows: usize, n_splits: usize) -> Vec<(Range<usize>, Range<usize>)> {
    if n_splits == 0 || n_rows < n_splits + 1 {
        return Vec::new();
    }
    let fold_size = n_rows / (n_splits + 1);
    if fold_size == 0 {
        return Vec::new();
    }

    (0..n_splits)
        .map(|i| {
            let validation_start = n_rows - (n_splits - i) * fold_size;
            (0..validation_start, validation_start..validation_start + fold_size)
        })
        .collect()
}

/// Standardizes numeric columns and one-hot encodes the categorical year.
///
/// Statistics are fitted on training rows only. At transform time an
/// unseen year maps to an all-zero indicator vector, and a missing lag
/// value maps to the standardized mean (zero).
#[derive(Debug, Clone)]
pub struct FeaturePreprocessor {
    event_columns: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
    year_categories: Vec<i32>,
}

impl FeaturePreprocessor {
    /// Fit standardization statistics and year categories on training rows
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(DemandForecastError::ValidationError(
                "Cannot fit a preprocessor on empty training data".to_string(),
            ));
        }

        let event_columns: Vec<String> = rows
            .iter()
            .flat_map(|r| r.event.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();

        let width = Self::numeric_width(&event_columns);
        let mut sums = vec![0.0; width];
        let mut counts = vec![0usize; width];
        for row in rows {
            for (j, value) in Self::raw_numeric(row, &event_columns).into_iter().enumerate() {
                if let Some(v) = value {
                    sums[j] += v;
                    counts[j] += 1;
                }
            }
        }
        let means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect();

        let mut squared = vec![0.0; width];
        for row in rows {
            for (j, value) in Self::raw_numeric(row, &event_columns).into_iter().enumerate() {
                if let Some(v) = value {
                    squared[j] += (v - means[j]).powi(2);
                }
            }
        }
        let stds: Vec<f64> = squared
            .iter()
            .zip(&counts)
            .map(|(&sq, &c)| {
                let std = if c > 0 { (sq / c as f64).sqrt() } else { 0.0 };
                // constant columns pass through centered rather than dividing by 0
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        let year_categories: Vec<i32> = rows
            .iter()
            .map(|r| r.trend.year)
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();

        Ok(Self {
            event_columns,
            means,
            stds,
            year_categories,
        })
    }

    fn numeric_width(event_columns: &[String]) -> usize {
        // six cyclical encodings + lag + event columns
        7 + event_columns.len()
    }

    fn raw_numeric(row: &FeatureRow, event_columns: &[String]) -> Vec<Option<f64>> {
        let t = &row.trend;
        let mut values = vec![
            Some(t.sin_day_of_week),
            Some(t.cos_day_of_week),
            Some(t.sin_month_of_year),
            Some(t.cos_month_of_year),
            Some(t.sin_day_of_year),
            Some(t.cos_day_of_year),
            t.demand_lag7,
        ];
        for column in event_columns {
            // a column the row lacks means no signal on that date
            values.push(Some(row.event.get(column).copied().unwrap_or(0.0)));
        }
        values
    }

    /// Transform rows into design-matrix rows: standardized numerics
    /// followed by the one-hot year indicators
    pub fn transform(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                let mut out: Vec<f64> = Self::raw_numeric(row, &self.event_columns)
                    .into_iter()
                    .enumerate()
                    .map(|(j, value)| match value {
                        Some(v) => (v - self.means[j]) / self.stds[j],
                        None => 0.0,
                    })
                    .collect();
                for &year in &self.year_categories {
                    out.push(if row.trend.year == year { 1.0 } else { 0.0 });
                }
                out
            })
            .collect()
    }

    /// Width of a transformed row
    pub fn width(&self) -> usize {
        Self::numeric_width(&self.event_columns) + self.year_categories.len()
    }
}

/// Ridge regression demand model with grid-searched penalty
#[derive(Debug, Clone)]
pub struct RidgeDemandModel {
    name: String,
    lambda_grid: Vec<f64>,
    n_splits: usize,
}

/// Fitted ridge regression demand model
#[derive(Debug, Clone)]
pub struct FittedRidgeDemandModel {
    name: String,
    preprocessor: FeaturePreprocessor,
    /// Intercept first, then one coefficient per design column
    beta: DVector<f64>,
    lambda: f64,
}

impl Default for RidgeDemandModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RidgeDemandModel {
    /// Create a model with the default penalty grid and split count
    pub fn new() -> Self {
        Self {
            name: "Ridge demand model".to_string(),
            lambda_grid: RIDGE_LAMBDA_GRID.to_vec(),
            n_splits: N_SPLITS,
        }
    }

    /// Create a model with a custom penalty grid and split count
    pub fn with_grid(lambda_grid: Vec<f64>, n_splits: usize) -> Result<Self> {
        if lambda_grid.is_empty() {
            return Err(DemandForecastError::InvalidParameter(
                "Lambda grid must not be empty".to_string(),
            ));
        }
        if lambda_grid.iter().any(|l| !l.is_finite() || *l < 0.0) {
            return Err(DemandForecastError::InvalidParameter(
                "Lambda values must be finite and non-negative".to_string(),
            ));
        }
        if n_splits == 0 {
            return Err(DemandForecastError::InvalidParameter(
                "Number of splits must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            name: "Ridge demand model".to_string(),
            lambda_grid,
            n_splits,
        })
    }

    fn fit_with_lambda(x: &[FeatureRow], y: &[f64], lambda: f64) -> Result<FittedRidgeDemandModel> {
        let preprocessor = FeaturePreprocessor::fit(x)?;
        let design = preprocessor.transform(x);
        let beta = solve_ridge(&design, y, lambda)?;
        Ok(FittedRidgeDemandModel {
            name: format!("Ridge demand model (lambda={lambda})"),
            preprocessor,
            beta,
            lambda,
        })
    }

    fn validation_mse(&self, x: &[FeatureRow], y: &[f64], lambda: f64) -> Result<Option<f64>> {
        let splits = chronological_splits(x.len(), self.n_splits);
        if splits.is_empty() {
            return Ok(None);
        }

        let mut total = 0.0;
        for (train, validation) in &splits {
            let fitted =
                Self::fit_with_lambda(&x[train.clone()], &y[train.clone()], lambda)?;
            let predicted = fitted.predict(&x[validation.clone()])?;
            let actual = &y[validation.clone()];
            let mse = predicted
                .iter()
                .zip(actual.iter())
                .map(|(p, a)| (p - a).powi(2))
                .sum::<f64>()
                / actual.len() as f64;
            total += mse;
        }

        Ok(Some(total / splits.len() as f64))
    }
}

impl DemandPredictor for RidgeDemandModel {
    type Fitted = FittedRidgeDemandModel;

    fn fit_select(&self, x_train: &[FeatureRow], y_train: &[f64]) -> Result<Self::Fitted> {
        if x_train.is_empty() {
            return Err(DemandForecastError::ValidationError(
                "Cannot fit on an empty training window".to_string(),
            ));
        }
        if x_train.len() != y_train.len() {
            return Err(DemandForecastError::ValidationError(format!(
                "Feature rows ({}) and targets ({}) must have the same length",
                x_train.len(),
                y_train.len()
            )));
        }

        // Grid search over the penalty, scored by mean MSE across the
        // chronological validation folds. A window too short to split
        // falls back to the first grid value.
        let mut best_lambda = self.lambda_grid[0];
        let mut best_score = f64::INFINITY;
        for &lambda in &self.lambda_grid {
            match self.validation_mse(x_train, y_train, lambda)? {
                Some(score) if score < best_score => {
                    best_score = score;
                    best_lambda = lambda;
                }
                Some(_) => {}
                None => break,
            }
        }

        Self::fit_with_lambda(x_train, y_train, best_lambda)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl FittedRidgeDemandModel {
    /// Penalty selected during fitting
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl FittedDemandPredictor for FittedRidgeDemandModel {
    fn predict(&self, x: &[FeatureRow]) -> Result<Vec<f64>> {
        let design = self.preprocessor.transform(x);
        Ok(design
            .iter()
            .map(|row| {
                self.beta[0]
                    + row
                        .iter()
                        .enumerate()
                        .map(|(j, v)| v * self.beta[j + 1])
                        .sum::<f64>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Solve the ridge system by augmenting the design matrix with penalty
/// rows and running an SVD least-squares solve.
///
/// The intercept column is not penalized. Returns the coefficient vector
/// with the intercept first.
fn solve_ridge(design: &[Vec<f64>], y: &[f64], lambda: f64) -> Result<DVector<f64>> {
    let n = design.len();
    if n == 0 || n != y.len() {
        return Err(DemandForecastError::ValidationError(
            "Design matrix and targets must have the same non-zero length".to_string(),
        ));
    }
    let width = design[0].len();
    let cols = width + 1; // intercept
    let penalty_rows = width;
    let rows = n + penalty_rows;

    let mut m = DMatrix::zeros(rows, cols);
    let mut rhs = DVector::zeros(rows);
    for (i, row) in design.iter().enumerate() {
        m[(i, 0)] = 1.0;
        for (j, &v) in row.iter().enumerate() {
            m[(i, j + 1)] = v;
        }
        rhs[i] = y[i];
    }
    let sqrt_lambda = lambda.sqrt();
    for j in 0..penalty_rows {
        m[(n + j, j + 1)] = sqrt_lambda;
    }

    // SVD handles the tall, possibly collinear system; one-hot year
    // columns are often collinear with the intercept.
    let svd = m.svd(true, true);
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(&rhs, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Ok(beta);
            }
        }
    }

    Err(DemandForecastError::ForecastingError(
        "Ridge system could not be solved".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_are_chronological_and_cover_the_tail() {
        let splits = chronological_splits(12, 3);
        assert_eq!(splits.len(), 3);
        for (train, validation) in &splits {
            assert!(train.end <= validation.start);
            assert!(!train.is_empty());
            assert!(!validation.is_empty());
        }
        assert_eq!(splits.last().unwrap().1.end, 12);
    }

    #[test]
    fn too_short_series_yields_no_splits() {
        assert!(chronological_splits(3, 5).is_empty());
        assert!(chronological_splits(0, 5).is_empty());
    }

    #[test]
    fn solve_ridge_recovers_line_with_zero_penalty() {
        let design = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![2.0, 5.0, 8.0, 11.0];
        let beta = solve_ridge(&design, &y, 0.0).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-8);
        assert!((beta[1] - 3.0).abs() < 1e-8);
    }
}
