use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use demand_forecast::features::{
    event_feature_value, EventFeatureValues, FeatureStats, DAYS_PER_WEEK, DAYS_PER_YEAR,
    MONTHS_PER_YEAR,
};
use demand_forecast::{
    build_model_features, derive_event_features, derive_trend_features, normalize_demand,
    prepare_forecast_features, DemandObservation, EventFeatureFrame, InMemoryEventFeatures,
    RawDemand, RawEventFeatures,
};
use rstest::rstest;

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

fn daily_series(start: NaiveDate, n: usize) -> Vec<DemandObservation> {
    (0..n)
        .map(|i| DemandObservation {
            date: start + Duration::days(i as i64),
            demand: 100.0 + i as f64,
            is_imputed: false,
        })
        .collect()
}

/// Smallest angular distance between two angles
fn angular_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(TWO_PI);
    diff.min(TWO_PI - diff)
}

#[test]
fn cyclical_encodings_round_trip() {
    // 2020 is a leap year, so this covers all 366 day-of-year values.
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let series = daily_series(start, 366);
    let rows = derive_trend_features(&series);
    assert_eq!(rows.len(), 366);

    for row in &rows {
        let f = &row.features;

        let dow = f64::from(row.date.weekday().num_days_from_monday());
        let recovered = f.sin_day_of_week.atan2(f.cos_day_of_week);
        assert!(angular_distance(recovered, TWO_PI * dow / DAYS_PER_WEEK) < 1e-9);

        let month = f64::from(row.date.month());
        let recovered = f.sin_month_of_year.atan2(f.cos_month_of_year);
        assert!(angular_distance(recovered, TWO_PI * month / MONTHS_PER_YEAR) < 1e-9);

        let doy = f64::from(row.date.ordinal());
        let recovered = f.sin_day_of_year.atan2(f.cos_day_of_year);
        assert!(angular_distance(recovered, TWO_PI * doy / DAYS_PER_YEAR) < 1e-9);
    }
}

#[test]
fn lag7_is_null_for_first_seven_rows_then_shifts_demand() {
    let start = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
    let series = daily_series(start, 20);
    let rows = derive_trend_features(&series);

    for (i, row) in rows.iter().enumerate() {
        if i < 7 {
            assert!(row.features.demand_lag7.is_none(), "row {i}");
        } else {
            assert_eq!(row.features.demand_lag7, Some(series[i - 7].demand), "row {i}");
        }
    }
}

#[rstest]
#[case("phq_rank_public_holidays", 60.0)] // max active level 3 * 20
#[case("phq_impact_severe_weather_air_quality_retail", 4.5)]
#[case("phq_attendance_concerts", 1234.0)]
fn feature_families_use_their_reduction_rule(#[case] name: &str, #[case] expected: f64) {
    let mut rank_levels = BTreeMap::new();
    rank_levels.insert("1".to_string(), 5.0);
    rank_levels.insert("3".to_string(), 2.0);
    rank_levels.insert("5".to_string(), 0.0);
    let values = EventFeatureValues {
        stats: FeatureStats {
            sum: 1234.0,
            max: 4.5,
        },
        rank_levels,
    };
    assert_eq!(event_feature_value(name, &values), expected);
}

#[test]
fn service_wire_shape_deserializes() {
    let json = r#"{
        "date": "2023-06-01",
        "phq_attendance_concerts": {"stats": {"sum": 4500.0, "max": 3000.0}},
        "phq_rank_public_holidays": {"rank_levels": {"4": 1.0}, "stats": {"sum": 0.0, "max": 0.0}}
    }"#;
    let row: RawEventFeatures = serde_json::from_str(json).unwrap();

    assert_eq!(row.date, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
    let frame = EventFeatureFrame::from_raw(&[row]);
    assert_eq!(
        frame.columns(),
        ["phq_attendance_concerts", "phq_rank_public_holidays"]
    );
    assert_eq!(
        frame.value(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), "phq_attendance_concerts"),
        4500.0
    );
    assert_eq!(
        frame.value(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), "phq_rank_public_holidays"),
        80.0
    );
}

#[test]
fn zero_feature_fallback_yields_date_only_frame() {
    let source = InMemoryEventFeatures::new(Vec::new());
    let start = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();
    let end = start + Duration::days(4);

    let frame = derive_event_features(&source, "analysis-1", start, end).unwrap();

    assert_eq!(frame.len(), 5);
    assert!(frame.columns().is_empty());
    let dates: Vec<NaiveDate> = frame.dates().collect();
    assert_eq!(
        dates,
        (0..5).map(|i| start + Duration::days(i)).collect::<Vec<_>>()
    );
}

#[test]
fn model_features_merge_events_with_zero_for_uncovered_dates() {
    let start = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
    let series = daily_series(start, 10);

    let mut features = BTreeMap::new();
    features.insert(
        "phq_attendance_sports".to_string(),
        EventFeatureValues {
            stats: FeatureStats { sum: 900.0, max: 900.0 },
            rank_levels: BTreeMap::new(),
        },
    );
    let raw = vec![RawEventFeatures {
        date: start + Duration::days(3),
        features,
    }];
    let frame = EventFeatureFrame::from_raw(&raw);

    let rows = build_model_features(&series, &frame);
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[3].event["phq_attendance_sports"], 900.0);
    assert_eq!(rows[4].event["phq_attendance_sports"], 0.0);
    assert_eq!(rows[0].demand, Some(100.0));
    assert_eq!(rows[0].is_imputed, Some(false));
}

#[test]
fn forecast_features_cover_future_span_without_demand() {
    let start = NaiveDate::from_ymd_opt(2023, 9, 1).unwrap();
    let raw: Vec<RawDemand> = (0..21)
        .map(|i| RawDemand {
            date: start + Duration::days(i),
            demand: Some(200.0 + i as f64),
        })
        .collect();
    let history = normalize_demand(&raw);
    let source = InMemoryEventFeatures::new(Vec::new());

    let future = prepare_forecast_features(&history, 7, &source, "analysis-1").unwrap();

    assert_eq!(future.len(), 7);
    for (i, row) in future.iter().enumerate() {
        assert_eq!(row.date, start + Duration::days(21 + i as i64));
        assert!(row.demand.is_none());
        assert!(row.is_imputed.is_none());
        // lag features see historical context across the concatenation
        assert_eq!(row.trend.demand_lag7, Some(history[14 + i].demand));
    }
}

#[test]
fn forecast_features_require_history() {
    let source = InMemoryEventFeatures::new(Vec::new());
    assert!(prepare_forecast_features(&[], 7, &source, "analysis-1").is_err());
}
