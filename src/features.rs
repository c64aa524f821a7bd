//! Calendar, lag, and event-driven feature derivation
//!
//! Three feature families feed the demand model:
//!
//! - cyclical calendar encodings (day of week, month of year, day of year),
//! - a 7-day demand lag,
//! - externally supplied event signals, keyed by date and retrieved from an
//!   analytics service behind the [`EventFeatureSource`] trait.
//!
//! Event columns are genuinely optional: a date the service knows nothing
//! about means "no signal", never missing data to impute.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::demand::DemandObservation;
use crate::error::{DemandForecastError, Result};

pub const DAYS_PER_WEEK: f64 = 7.0;
pub const MONTHS_PER_YEAR: f64 = 12.0;
/// Accounts for leap years
pub const DAYS_PER_YEAR: f64 = 365.25;

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Demand lag length in days
pub const LAG_DAYS: usize = 7;

/// Scale applied to the highest active rank level of a rank-family feature
pub const RANK_BAND: f64 = 20.0;

const RANK_MARKER: &str = "_rank_";
const SEVERE_WEATHER_MARKER: &str = "_impact_severe_weather";

/// The fixed trend feature set retained for modelling
///
/// Raw day/month ordinals are intermediates of the encoding and are not
/// kept. `year` stays as a categorical column; `demand_lag7` is `None` for
/// the first [`LAG_DAYS`] rows of the derived series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFeatures {
    pub sin_day_of_week: f64,
    pub cos_day_of_week: f64,
    pub sin_month_of_year: f64,
    pub cos_month_of_year: f64,
    pub sin_day_of_year: f64,
    pub cos_day_of_year: f64,
    pub year: i32,
    pub demand_lag7: Option<f64>,
}

/// Trend features for a single date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFeatureRow {
    pub date: NaiveDate,
    pub features: TrendFeatures,
}

/// One fully assembled model input row
///
/// `demand` and `is_imputed` are `None` on future rows prepared for
/// single-shot forecasting, where the true demand is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub demand: Option<f64>,
    pub is_imputed: Option<bool>,
    pub trend: TrendFeatures,
    /// Event feature columns; an absent column means no signal
    pub event: BTreeMap<String, f64>,
}

/// Summary statistics the service reports for one feature on one date
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub max: f64,
}

/// Raw per-feature payload from the event analytics service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeatureValues {
    #[serde(default)]
    pub stats: FeatureStats,
    /// Rank level -> count of active events at that level
    #[serde(default)]
    pub rank_levels: BTreeMap<String, f64>,
}

/// All raw feature payloads the service returned for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventFeatures {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub features: BTreeMap<String, EventFeatureValues>,
}

/// Reduce a raw service payload to the single value used as a model feature.
///
/// Features whose name carries a rank dimension reduce to the highest
/// active rank level scaled by [`RANK_BAND`] (0 when none is active);
/// severe-weather impact features reduce to the maximum statistic; all
/// other features reduce to the summed statistic.
pub fn event_feature_value(feature_name: &str, values: &EventFeatureValues) -> f64 {
    if feature_name.contains(RANK_MARKER) {
        let max_rank = values
            .rank_levels
            .iter()
            .filter(|(_, count)| **count > 0.0)
            .filter_map(|(rank, _)| rank.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        return f64::from(max_rank) * RANK_BAND;
    }

    if feature_name.contains(SEVERE_WEATHER_MARKER) {
        return values.stats.max;
    }

    values.stats.sum
}

/// Date-keyed table of reduced event feature values
///
/// When the service returns no rows for a range, the frame still covers
/// every requested date but carries no columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeatureFrame {
    columns: Vec<String>,
    rows: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl EventFeatureFrame {
    /// Build a frame with one row per day in `[start, end]` and no columns
    pub fn date_only(start: NaiveDate, end: NaiveDate) -> Self {
        let mut rows = BTreeMap::new();
        let mut date = start;
        while date <= end {
            rows.insert(date, BTreeMap::new());
            date += Duration::days(1);
        }
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Reduce raw service rows into a frame
    pub fn from_raw(raw: &[RawEventFeatures]) -> Self {
        let columns: BTreeSet<String> = raw
            .iter()
            .flat_map(|r| r.features.keys().cloned())
            .collect();

        let rows = raw
            .iter()
            .map(|r| {
                let values = r
                    .features
                    .iter()
                    .map(|(name, payload)| (name.clone(), event_feature_value(name, payload)))
                    .collect();
                (r.date, values)
            })
            .collect();

        Self {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    /// Names of the event feature columns, sorted
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Dates covered by the frame, ascending
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    /// Value of `column` on `date`; 0 when the frame has no signal there
    pub fn value(&self, date: NaiveDate, column: &str) -> f64 {
        self.rows
            .get(&date)
            .and_then(|row| row.get(column))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn values_for(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.columns
            .iter()
            .map(|c| (c.clone(), self.value(date, c)))
            .collect()
    }
}

/// Named feature importance reported by the analytics service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_name: String,
    pub important: bool,
}

/// External source of event-driven predictor signals
///
/// Implementations wrap the analytics service; retrieval is synchronous and
/// blocking from the engine's point of view, and retries or backoff are the
/// implementation's responsibility.
pub trait EventFeatureSource {
    /// The date range covered by an analysis
    fn date_range(&self, analysis_id: &str) -> Result<(NaiveDate, NaiveDate)>;

    /// Raw per-date features for `[start, end]`; zero rows when the service
    /// has no data for the range
    fn features_for_range(
        &self,
        analysis_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawEventFeatures>>;

    /// Per-feature importance results for an analysis
    fn feature_importance(&self, analysis_id: &str) -> Result<Vec<FeatureImportance>>;
}

/// Map-backed [`EventFeatureSource`] for tests, demos, and offline runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventFeatures {
    rows: Vec<RawEventFeatures>,
    range: Option<(NaiveDate, NaiveDate)>,
    importance: Vec<FeatureImportance>,
}

impl InMemoryEventFeatures {
    pub fn new(rows: Vec<RawEventFeatures>) -> Self {
        Self {
            rows,
            range: None,
            importance: Vec::new(),
        }
    }

    /// Override the analysis date range (defaults to the span of the rows)
    pub fn with_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn with_importance(mut self, importance: Vec<FeatureImportance>) -> Self {
        self.importance = importance;
        self
    }
}

impl EventFeatureSource for InMemoryEventFeatures {
    fn date_range(&self, _analysis_id: &str) -> Result<(NaiveDate, NaiveDate)> {
        if let Some(range) = self.range {
            return Ok(range);
        }
        let min = self.rows.iter().map(|r| r.date).min();
        let max = self.rows.iter().map(|r| r.date).max();
        match (min, max) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(DemandForecastError::DataError(
                "In-memory source has no rows and no explicit date range".to_string(),
            )),
        }
    }

    fn features_for_range(
        &self,
        _analysis_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawEventFeatures>> {
        Ok(self
            .rows
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect())
    }

    fn feature_importance(&self, _analysis_id: &str) -> Result<Vec<FeatureImportance>> {
        Ok(self.importance.clone())
    }
}

fn trend_features_for(points: &[(NaiveDate, Option<f64>)]) -> Vec<TrendFeatureRow> {
    let has_gap = points
        .windows(2)
        .any(|pair| (pair[1].0 - pair[0].0).num_days() != 1);
    if has_gap {
        warn!("Missing dates detected in feature derivation input");
    }

    points
        .iter()
        .enumerate()
        .map(|(i, &(date, _))| {
            let day_of_week = f64::from(date.weekday().num_days_from_monday());
            let month = f64::from(date.month());
            let day_of_year = f64::from(date.ordinal());

            let demand_lag7 = if i >= LAG_DAYS {
                points[i - LAG_DAYS].1
            } else {
                None
            };

            TrendFeatureRow {
                date,
                features: TrendFeatures {
                    sin_day_of_week: (TWO_PI * day_of_week / DAYS_PER_WEEK).sin(),
                    cos_day_of_week: (TWO_PI * day_of_week / DAYS_PER_WEEK).cos(),
                    sin_month_of_year: (TWO_PI * month / MONTHS_PER_YEAR).sin(),
                    cos_month_of_year: (TWO_PI * month / MONTHS_PER_YEAR).cos(),
                    sin_day_of_year: (TWO_PI * day_of_year / DAYS_PER_YEAR).sin(),
                    cos_day_of_year: (TWO_PI * day_of_year / DAYS_PER_YEAR).cos(),
                    year: date.year(),
                    demand_lag7,
                },
            }
        })
        .collect()
}

/// Derive the fixed trend feature set from a normalized demand series.
///
/// Logs a non-fatal warning when consecutive input dates are not exactly
/// one day apart, which indicates an upstream gap that normalization
/// should have closed.
pub fn derive_trend_features(series: &[DemandObservation]) -> Vec<TrendFeatureRow> {
    let points: Vec<(NaiveDate, Option<f64>)> =
        series.iter().map(|o| (o.date, Some(o.demand))).collect();
    trend_features_for(&points)
}

/// Derive reduced event features for a date range from an external source.
///
/// When the source returns no rows at all, the result covers every day of
/// the range with no event columns; callers treat absent columns as "no
/// signal", not as missing data.
pub fn derive_event_features(
    source: &dyn EventFeatureSource,
    analysis_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<EventFeatureFrame> {
    let raw = source.features_for_range(analysis_id, start, end)?;
    if raw.is_empty() {
        return Ok(EventFeatureFrame::date_only(start, end));
    }
    Ok(EventFeatureFrame::from_raw(&raw))
}

/// Derive event features for the full date range an analysis covers
pub fn derive_analysis_features(
    source: &dyn EventFeatureSource,
    analysis_id: &str,
) -> Result<EventFeatureFrame> {
    let (start, end) = source.date_range(analysis_id)?;
    derive_event_features(source, analysis_id, start, end)
}

/// Return the names of features the analysis ranked as important.
///
/// Logs a non-fatal warning when the analysis found none; the pipeline
/// still runs, it just has weaker event signals to work with.
pub fn important_feature_names(
    source: &dyn EventFeatureSource,
    analysis_id: &str,
) -> Result<Vec<String>> {
    let names: Vec<String> = source
        .feature_importance(analysis_id)?
        .into_iter()
        .filter(|f| f.important)
        .map(|f| f.feature_name)
        .collect();

    if names.is_empty() {
        warn!(analysis_id, "No important event features found for analysis");
    }

    Ok(names)
}

/// Assemble the full model feature table from a normalized demand series
/// and a reduced event frame.
///
/// Every series date becomes one row; event values default to 0 for dates
/// the frame does not cover.
pub fn build_model_features(
    series: &[DemandObservation],
    events: &EventFeatureFrame,
) -> Vec<FeatureRow> {
    let trend = derive_trend_features(series);

    series
        .iter()
        .zip(trend)
        .map(|(obs, t)| FeatureRow {
            date: obs.date,
            demand: Some(obs.demand),
            is_imputed: Some(obs.is_imputed),
            trend: t.features,
            event: events.values_for(obs.date),
        })
        .collect()
}

/// Build the feature rows needed to forecast the `window_size` days
/// immediately following the last historical date.
///
/// Event features are derived for the future span, the span is
/// concatenated to history, and trend features are recomputed over the
/// concatenation so lag and cyclical features see historical context. Only
/// the future rows are returned, with `demand` and `is_imputed` unset: the
/// true demand for those days is unknown at feature-preparation time.
pub fn prepare_forecast_features(
    history: &[DemandObservation],
    window_size: u32,
    source: &dyn EventFeatureSource,
    analysis_id: &str,
) -> Result<Vec<FeatureRow>> {
    if history.is_empty() {
        return Err(DemandForecastError::DataError(
            "Cannot prepare forecast features from an empty demand history".to_string(),
        ));
    }
    if window_size == 0 {
        return Err(DemandForecastError::InvalidParameter(
            "Forecast window size must be at least 1 day".to_string(),
        ));
    }

    let max_date = history[history.len() - 1].date;
    let start = max_date + Duration::days(1);
    let end = max_date + Duration::days(i64::from(window_size));

    let events = derive_event_features(source, analysis_id, start, end)?;

    let mut points: Vec<(NaiveDate, Option<f64>)> =
        history.iter().map(|o| (o.date, Some(o.demand))).collect();
    let mut date = start;
    while date <= end {
        points.push((date, None));
        date += Duration::days(1);
    }

    let trend = trend_features_for(&points);

    Ok(trend[history.len()..]
        .iter()
        .map(|t| FeatureRow {
            date: t.date,
            demand: None,
            is_imputed: None,
            trend: t.features.clone(),
            event: events.values_for(t.date),
        })
        .collect())
}
