//! Evaluate the ridge baseline on a synthetic demand series and then
//! forecast the following week.
//!
//! Run with: cargo run --example evaluate_demand_model

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use demand_forecast::features::{EventFeatureValues, FeatureStats};
use demand_forecast::{
    build_model_features, derive_analysis_features, evaluate_forecast_model,
    forecast_next_window, important_feature_names, normalize_demand, prepare_forecast_features,
    InMemoryEventFeatures, RawDemand, RawEventFeatures, RidgeDemandModel,
};

fn main() -> demand_forecast::Result<()> {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();

    // Four months of weekly-seasonal demand with a short outage
    let raw: Vec<RawDemand> = (0..120i64)
        .filter(|i| !(55..=57).contains(i))
        .map(|i| {
            let weekday_lift = [0.0, 2.0, 4.0, 6.0, 10.0, 25.0, 18.0][(i % 7) as usize];
            RawDemand {
                date: start + Duration::days(i),
                demand: Some(140.0 + weekday_lift),
            }
        })
        .collect();

    let series = normalize_demand(&raw);
    println!(
        "Normalized {} days ({} imputed)",
        series.len(),
        series.iter().filter(|o| o.is_imputed).count()
    );

    // A festival weekend the analytics service knows about
    let mut festival = BTreeMap::new();
    festival.insert(
        "phq_attendance_festivals".to_string(),
        EventFeatureValues {
            stats: FeatureStats {
                sum: 30_000.0,
                max: 30_000.0,
            },
            rank_levels: BTreeMap::new(),
        },
    );
    let source = InMemoryEventFeatures::new(vec![RawEventFeatures {
        date: start + Duration::days(100),
        features: festival,
    }])
    .with_range(start, start + Duration::days(119));

    for name in important_feature_names(&source, "demo-analysis")? {
        println!("Important event feature: {name}");
    }

    let events = derive_analysis_features(&source, "demo-analysis")?;
    let x = build_model_features(&series, &events);

    let outcome = evaluate_forecast_model(&x, &series, &RidgeDemandModel::new(), 7, 0.6)?;
    match outcome.mape {
        Some(mape) => println!(
            "Walk-forward evaluation: {} scored days, MAPE {:.2}%",
            outcome.results.len(),
            mape
        ),
        None => println!("Series too short to evaluate"),
    }

    let future = prepare_forecast_features(&series, 7, &source, "demo-analysis")?;
    let forecast = forecast_next_window(&x, &series, &future, &RidgeDemandModel::new())?;
    println!("Next week:");
    for (date, value) in forecast {
        println!("  {date}  {value:>8.1}");
    }

    Ok(())
}
