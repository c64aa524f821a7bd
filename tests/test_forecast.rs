use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use demand_forecast::{
    build_model_features, evaluate_forecast_model, forecast_next_window, normalize_demand,
    prepare_forecast_features, rolling_cross_validation, DemandObservation, DemandPredictor,
    EventFeatureFrame, FeatureRow, FittedDemandPredictor, InMemoryEventFeatures, RawDemand,
    Result,
};

/// Predictor that always emits one constant, and asserts the no-leakage
/// invariant: every test date must follow every training date.
struct ConstantPredictor {
    value: f64,
}

struct FittedConstant {
    value: f64,
    train_max: Option<NaiveDate>,
}

impl DemandPredictor for ConstantPredictor {
    type Fitted = FittedConstant;

    fn fit_select(&self, x_train: &[FeatureRow], y_train: &[f64]) -> Result<FittedConstant> {
        assert_eq!(x_train.len(), y_train.len());
        Ok(FittedConstant {
            value: self.value,
            train_max: x_train.iter().map(|r| r.date).max(),
        })
    }

    fn name(&self) -> &str {
        "constant"
    }
}

impl FittedDemandPredictor for FittedConstant {
    fn predict(&self, x: &[FeatureRow]) -> Result<Vec<f64>> {
        let test_min = x.iter().map(|r| r.date).min();
        if let (Some(train_max), Some(test_min)) = (self.train_max, test_min) {
            assert!(
                train_max < test_min,
                "test window {test_min} must strictly follow training window {train_max}"
            );
        }
        Ok(vec![self.value; x.len()])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

fn series_of(n: usize) -> (Vec<FeatureRow>, Vec<DemandObservation>) {
    let raw: Vec<RawDemand> = (0..n)
        .map(|i| RawDemand {
            date: start_date() + Duration::days(i as i64),
            demand: Some(100.0 + (i % 7) as f64 * 5.0),
        })
        .collect();
    let series = normalize_demand(&raw);
    let events = EventFeatureFrame::date_only(start_date(), series[n - 1].date);
    let x = build_model_features(&series, &events);
    (x, series)
}

#[test]
fn windows_are_disjoint_and_cover_the_evaluation_span() {
    let (x, y) = series_of(30);
    let predictor = ConstantPredictor { value: 100.0 };

    let results = rolling_cross_validation(&x, &y, &predictor, 7, 0.6).unwrap();

    // first cutoff at ordinal floor(30 * 0.6) = 18; windows [18, 24] and
    // [25, 29], the second clipped by the end of the data
    assert_eq!(results.len(), 12);
    let dates: Vec<NaiveDate> = results.iter().map(|r| r.date).collect();
    let unique: BTreeSet<NaiveDate> = dates.iter().copied().collect();
    assert_eq!(unique.len(), dates.len(), "each date forecast at most once");
    assert_eq!(*dates.first().unwrap(), start_date() + Duration::days(18));
    assert_eq!(*dates.last().unwrap(), start_date() + Duration::days(29));
}

#[test]
fn result_rows_carry_truth_alongside_forecast() {
    let (x, y) = series_of(30);
    let predictor = ConstantPredictor { value: 42.0 };

    let results = rolling_cross_validation(&x, &y, &predictor, 7, 0.6).unwrap();
    for row in &results {
        let obs = y.iter().find(|o| o.date == row.date).unwrap();
        assert_eq!(row.demand, obs.demand);
        assert_eq!(row.is_imputed, obs.is_imputed);
        assert_eq!(row.forecast, 42.0);
    }
}

#[test]
fn negative_raw_predictions_are_clipped_to_zero() {
    let (x, y) = series_of(30);
    let predictor = ConstantPredictor { value: -5.0 };

    let results = rolling_cross_validation(&x, &y, &predictor, 7, 0.6).unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.forecast == 0.0));
}

#[test]
fn empty_series_is_insufficient_data_not_an_error() {
    let predictor = ConstantPredictor { value: 1.0 };
    let outcome = evaluate_forecast_model(&[], &[], &predictor, 7, 0.6).unwrap();
    assert!(outcome.results.is_empty());
    assert!(outcome.mape.is_none());
}

#[test]
fn invalid_parameters_are_rejected() {
    let (x, y) = series_of(10);
    let predictor = ConstantPredictor { value: 1.0 };
    assert!(evaluate_forecast_model(&x, &y, &predictor, 0, 0.6).is_err());
    assert!(evaluate_forecast_model(&x, &y, &predictor, 7, 0.0).is_err());
    assert!(evaluate_forecast_model(&x, &y, &predictor, 7, 1.0).is_err());
}

#[test]
fn evaluation_scores_the_concatenated_results() {
    let (x, y) = series_of(35);
    // forecast exactly the series mean-ish value; MAPE is finite and positive
    let predictor = ConstantPredictor { value: 110.0 };

    let outcome = evaluate_forecast_model(&x, &y, &predictor, 7, 0.6).unwrap();
    let mape = outcome.mape.unwrap();
    assert!(mape.is_finite());
    assert!(mape > 0.0);
    assert_eq!(outcome.results.len(), 14);
}

#[test]
fn single_shot_forecast_covers_the_prepared_window() {
    let (x, y) = series_of(28);
    let source = InMemoryEventFeatures::new(Vec::new());
    let future = prepare_forecast_features(&y, 7, &source, "analysis-1").unwrap();

    let predictor = ConstantPredictor { value: 88.0 };
    let forecast = forecast_next_window(&x, &y, &future, &predictor).unwrap();

    assert_eq!(forecast.len(), 7);
    for (i, (date, value)) in forecast.iter().enumerate() {
        assert_eq!(*date, start_date() + Duration::days(28 + i as i64));
        assert_eq!(*value, 88.0);
    }
}
