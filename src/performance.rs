//! Forecast accuracy scoring with data-quality exclusions
//!
//! Percentage error is fragile on dirty demand data: a single near-zero
//! actual can dominate the mean, and imputed days are not real ground
//! truth. The scorer therefore filters before it measures.

use tracing::warn;

use crate::error::{DemandForecastError, Result};
use crate::forecast::ForecastResultRow;
use crate::metrics;

/// Demand below this percentage of the mean marks a low-demand anomaly
pub const DEMAND_PERCENT_THRESHOLD: f64 = 5.0;

/// Score concatenated walk-forward results as MAPE, in percent.
///
/// Filtering, in order:
///
/// 1. sort by date;
/// 2. find the first day whose demand is positive yet below
///    [`DEMAND_PERCENT_THRESHOLD`] percent of the mean demand; if one
///    exists, warn and drop that day and every later day. A single
///    low-demand anomaly poisons the rest of the evaluation window, which
///    is deliberately aggressive: one near-zero actual would otherwise
///    inflate percentage error beyond use;
/// 3. drop imputed days and rows with non-finite demand or forecast;
/// 4. drop days with exactly zero demand, where percentage error is
///    undefined.
///
/// When nothing survives, the metric is undefined and the function returns
/// [`DemandForecastError::NoScorableData`] rather than 0 or NaN.
pub fn forecast_mape(results: &[ForecastResultRow]) -> Result<f64> {
    if results.is_empty() {
        return Err(DemandForecastError::NoScorableData);
    }

    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| r.date);

    let mean_demand = sorted.iter().map(|r| r.demand).sum::<f64>() / sorted.len() as f64;
    let low_demand_day = sorted
        .iter()
        .find(|r| r.demand > 0.0 && r.demand / mean_demand * 100.0 < DEMAND_PERCENT_THRESHOLD);
    if let Some(anomaly) = low_demand_day {
        warn!(
            date = %anomaly.date,
            threshold_percent = DEMAND_PERCENT_THRESHOLD,
            "Demand below threshold percent of mean demand; this day and all following days are excluded from scoring"
        );
        let cutoff = anomaly.date;
        sorted.retain(|r| r.date < cutoff);
    }

    let (y_true, y_pred): (Vec<f64>, Vec<f64>) = sorted
        .iter()
        .filter(|r| !r.is_imputed && r.demand.is_finite() && r.forecast.is_finite())
        .filter(|r| r.demand != 0.0)
        .map(|r| (r.demand, r.forecast))
        .unzip();

    if y_true.is_empty() {
        return Err(DemandForecastError::NoScorableData);
    }

    metrics::mape(&y_true, &y_pred)
}
