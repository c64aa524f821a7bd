//! # Demand Forecast
//!
//! A Rust library for evaluating short-horizon daily demand forecasts that
//! combine historical demand with externally supplied event-driven signals.
//!
//! ## Features
//!
//! - Demand series normalization: calendar resampling, gap imputation,
//!   imputed-day flagging
//! - Calendar/cyclical and lag feature derivation, plus date-keyed event
//!   features from an external analytics source
//! - Walk-forward (rolling-origin) evaluation of any pluggable regressor
//! - MAPE accuracy scoring with data-quality exclusion rules
//! - A ridge regression baseline with chronological model selection
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use demand_forecast::{
//!     build_model_features, derive_event_features, evaluate_forecast_model,
//!     normalize_demand, InMemoryEventFeatures, RawDemand, RidgeDemandModel,
//! };
//!
//! fn main() -> demand_forecast::Result<()> {
//!     // Sixty days of weekly-seasonal demand
//!     let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//!     let raw: Vec<RawDemand> = (0..60)
//!         .map(|i| RawDemand {
//!             date: start + chrono::Duration::days(i),
//!             demand: Some(100.0 + (i % 7) as f64 * 5.0),
//!         })
//!         .collect();
//!
//!     // Normalize, derive features, evaluate
//!     let series = normalize_demand(&raw);
//!     let source = InMemoryEventFeatures::new(Vec::new());
//!     let events = derive_event_features(
//!         &source,
//!         "analysis-1",
//!         start,
//!         series[series.len() - 1].date,
//!     )?;
//!     let x = build_model_features(&series, &events);
//!
//!     let outcome = evaluate_forecast_model(&x, &series, &RidgeDemandModel::new(), 7, 0.6)?;
//!     if let Some(mape) = outcome.mape {
//!         println!("MAPE: {mape:.2}%");
//!     }
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod demand;
pub mod error;
pub mod features;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod performance;

// Re-export commonly used types
pub use crate::data::DemandLoader;
pub use crate::demand::{normalize_demand, DemandObservation, RawDemand};
pub use crate::error::{DemandForecastError, Result};
pub use crate::features::{
    build_model_features, derive_analysis_features, derive_event_features,
    derive_trend_features, important_feature_names, prepare_forecast_features, EventFeatureFrame,
    EventFeatureSource, FeatureRow, InMemoryEventFeatures, RawEventFeatures,
};
pub use crate::forecast::{
    evaluate_forecast_model, forecast_next_window, rolling_cross_validation,
    EvaluationOutcome, ForecastResultRow,
};
pub use crate::models::{
    DemandPredictor, FittedDemandPredictor, FittedRidgeDemandModel, RidgeDemandModel,
};
pub use crate::performance::forecast_mape;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
