//! Accuracy metric primitives

use crate::error::{DemandForecastError, Result};

/// Calculate the mean absolute percentage error (MAPE), as a percentage.
///
/// Pairs whose true value is exactly zero are excluded, since percentage
/// error is undefined there. Returns [`DemandForecastError::NoScorableData`]
/// when no pairs survive that exclusion.
pub fn mape(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    if y_true.len() != y_pred.len() || y_true.is_empty() {
        return Err(DemandForecastError::ValidationError(
            "True and predicted values must have the same non-zero length".to_string(),
        ));
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for (&actual, &predicted) in y_true.iter().zip(y_pred.iter()) {
        if actual == 0.0 {
            continue;
        }
        sum += ((actual - predicted) / actual).abs();
        count += 1;
    }

    if count == 0 {
        return Err(DemandForecastError::NoScorableData);
    }

    Ok(sum / count as f64 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mape_on_exact_forecast_is_zero() {
        let values = vec![10.0, 20.0, 30.0];
        assert_eq!(mape(&values, &values).unwrap(), 0.0);
    }

    #[test]
    fn mape_skips_zero_actuals() {
        let actual = vec![0.0, 100.0];
        let predicted = vec![50.0, 110.0];
        let result = mape(&actual, &predicted).unwrap();
        assert!((result - 10.0).abs() < 1e-12);
    }

    #[test]
    fn mape_with_only_zero_actuals_is_undefined() {
        let actual = vec![0.0, 0.0];
        let predicted = vec![1.0, 2.0];
        assert!(matches!(
            mape(&actual, &predicted),
            Err(DemandForecastError::NoScorableData)
        ));
    }

    #[test]
    fn mape_rejects_mismatched_lengths() {
        assert!(mape(&[1.0, 2.0], &[1.0]).is_err());
    }
}
