//! Walk-forward (rolling-origin) evaluation of trainable demand predictors
//!
//! The evaluator turns one feature table into a sequence of train/test
//! windows that always train strictly on the past, fits the predictor per
//! window, and concatenates the out-of-sample predictions. Windows advance
//! by exactly the forecast horizon, so the concatenated result holds at
//! most one forecast per date.
//!
//! Windows within one run must execute in order; the engine is
//! single-threaded by design. Parallelism belongs at the level of
//! independent runs over different series.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::demand::DemandObservation;
use crate::error::{DemandForecastError, Result};
use crate::features::FeatureRow;
use crate::models::{DemandPredictor, FittedDemandPredictor};
use crate::performance::forecast_mape;

/// Forecast period in days used during evaluation
pub const EVAL_FORECAST_HORIZON: u32 = 7;

/// Ratio of the dataset used as the initial training prefix
pub const EVAL_TRAIN_RATIO: f64 = 0.6;

/// One evaluated day: the true demand alongside the model's forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResultRow {
    pub date: NaiveDate,
    pub demand: f64,
    pub is_imputed: bool,
    /// Predicted demand, clipped to be non-negative
    pub forecast: f64,
}

/// Outcome of a full walk-forward evaluation
///
/// `mape` is `None` when the series was too short to produce any window;
/// callers must treat that as insufficient data rather than an error.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub mape: Option<f64>,
    pub results: Vec<ForecastResultRow>,
}

fn test_train_split<'a>(
    x: &'a [FeatureRow],
    y: &'a [DemandObservation],
    start: NaiveDate,
    end: NaiveDate,
) -> (
    Vec<&'a FeatureRow>,
    Vec<&'a DemandObservation>,
    Vec<&'a FeatureRow>,
    Vec<&'a DemandObservation>,
) {
    let x_train = x.iter().filter(|r| r.date < start).collect();
    let y_train = y.iter().filter(|o| o.date < start).collect();
    let x_test = x.iter().filter(|r| r.date >= start && r.date <= end).collect();
    let y_test = y.iter().filter(|o| o.date >= start && o.date <= end).collect();
    (x_train, y_train, x_test, y_test)
}

fn forecast_window<P: DemandPredictor>(
    x: &[FeatureRow],
    y: &[DemandObservation],
    predictor: &P,
    start: NaiveDate,
    horizon: u32,
) -> Result<Option<Vec<ForecastResultRow>>> {
    let end = start + Duration::days(i64::from(horizon) - 1);
    let (x_train, y_train, x_test, y_test) = test_train_split(x, y, start, end);

    // Skip this testing period if there is no training or testing data.
    if x_train.is_empty() || x_test.is_empty() {
        return Ok(None);
    }

    let x_train: Vec<FeatureRow> = x_train.into_iter().cloned().collect();
    let y_train: Vec<f64> = y_train.iter().map(|o| o.demand).collect();
    let x_test: Vec<FeatureRow> = x_test.into_iter().cloned().collect();

    let fitted = predictor.fit_select(&x_train, &y_train)?;
    let prediction = fitted.predict_non_negative(&x_test)?;

    if prediction.len() != y_test.len() {
        return Err(DemandForecastError::ForecastingError(format!(
            "Predictor returned {} values for a {}-row test window",
            prediction.len(),
            y_test.len()
        )));
    }

    Ok(Some(
        y_test
            .iter()
            .zip(prediction)
            .map(|(obs, forecast)| ForecastResultRow {
                date: obs.date,
                demand: obs.demand,
                is_imputed: obs.is_imputed,
                forecast,
            })
            .collect(),
    ))
}

/// Cutoff dates for the walk-forward windows.
///
/// The first cutoff sits at ordinal position `floor(train_ratio * N)` of
/// the time-sorted table; subsequent cutoffs advance by exactly `horizon`
/// days until past the last date. An empty vector means the series is too
/// short to evaluate.
pub fn forecast_start_dates(x: &[FeatureRow], horizon: u32, train_ratio: f64) -> Vec<NaiveDate> {
    if x.is_empty() {
        return Vec::new();
    }
    let count = (x.len() as f64 * train_ratio).floor() as usize;
    if count >= x.len() {
        return Vec::new();
    }

    let dataset_end = x[x.len() - 1].date;
    let mut start = x[count].date;
    let mut starts = Vec::new();
    while start <= dataset_end {
        starts.push(start);
        start += Duration::days(i64::from(horizon));
    }
    starts
}

/// Run the walk-forward loop and concatenate every window's out-of-sample
/// predictions, preserving window order.
pub fn rolling_cross_validation<P: DemandPredictor>(
    x: &[FeatureRow],
    y: &[DemandObservation],
    predictor: &P,
    horizon: u32,
    train_ratio: f64,
) -> Result<Vec<ForecastResultRow>> {
    if horizon == 0 {
        return Err(DemandForecastError::InvalidParameter(
            "Forecast horizon must be at least 1 day".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&train_ratio) || train_ratio <= 0.0 {
        return Err(DemandForecastError::InvalidParameter(
            "Train ratio must lie strictly between 0 and 1".to_string(),
        ));
    }

    let mut results = Vec::new();
    for start in forecast_start_dates(x, horizon, train_ratio) {
        if let Some(mut rows) = forecast_window(x, y, predictor, start, horizon)? {
            results.append(&mut rows);
        }
    }
    Ok(results)
}

/// Evaluate a predictor over the whole series and score the concatenated
/// out-of-sample predictions.
///
/// A series too short to produce any window yields an outcome with no
/// results and `mape: None`. A non-empty result set whose rows are all
/// filtered out by the scorer surfaces as
/// [`DemandForecastError::NoScorableData`].
pub fn evaluate_forecast_model<P: DemandPredictor>(
    x: &[FeatureRow],
    y: &[DemandObservation],
    predictor: &P,
    horizon: u32,
    train_ratio: f64,
) -> Result<EvaluationOutcome> {
    let results = rolling_cross_validation(x, y, predictor, horizon, train_ratio)?;

    if results.is_empty() {
        return Ok(EvaluationOutcome {
            mape: None,
            results,
        });
    }

    let mape = forecast_mape(&results)?;
    Ok(EvaluationOutcome {
        mape: Some(mape),
        results,
    })
}

/// Fit on the full history and forecast the prepared future rows.
///
/// This is the single-shot deployment path; `x_future` normally comes from
/// [`crate::features::prepare_forecast_features`]. Predictions are clipped
/// to be non-negative, exactly as during evaluation.
pub fn forecast_next_window<P: DemandPredictor>(
    x_history: &[FeatureRow],
    y_history: &[DemandObservation],
    x_future: &[FeatureRow],
    predictor: &P,
) -> Result<Vec<(NaiveDate, f64)>> {
    if x_history.is_empty() {
        return Err(DemandForecastError::DataError(
            "Cannot forecast from an empty history".to_string(),
        ));
    }
    if x_history.len() != y_history.len() {
        return Err(DemandForecastError::ValidationError(format!(
            "Feature rows ({}) and demand history ({}) must have the same length",
            x_history.len(),
            y_history.len()
        )));
    }

    let y_train: Vec<f64> = y_history.iter().map(|o| o.demand).collect();
    let fitted = predictor.fit_select(x_history, &y_train)?;
    let prediction = fitted.predict_non_negative(x_future)?;

    Ok(x_future
        .iter()
        .map(|r| r.date)
        .zip(prediction)
        .collect())
}
