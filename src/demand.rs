//! Demand series normalization: calendar resampling and gap imputation
//!
//! Raw demand tables routinely have holes: days the business was closed,
//! days the export job failed, days the reading was discarded. Everything
//! downstream (lag features, walk-forward windows) assumes one row per
//! calendar day, so the first step is always [`normalize_demand`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Window length in days of the centered rolling mean used to impute gaps
pub const ROLL_PERIOD: usize = 15;

/// A raw demand reading as supplied by the caller
///
/// `demand` is `None` when the day was recorded without a usable value.
/// Days that are missing entirely simply have no `RawDemand` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDemand {
    pub date: NaiveDate,
    pub demand: Option<f64>,
}

/// One day of the normalized demand series
///
/// `is_imputed` marks days whose demand was absent in the raw input and was
/// filled by [`normalize_demand`]. Imputed days are excluded from accuracy
/// scoring because they are not trustworthy ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandObservation {
    pub date: NaiveDate,
    pub demand: f64,
    pub is_imputed: bool,
}

/// Normalize a raw demand series into a contiguous daily series.
///
/// The input is sorted by date and resampled to one row per calendar day
/// between the earliest and latest input date. Missing or null days are
/// flagged `is_imputed` and filled in two passes:
///
/// 1. a centered rolling mean over a [`ROLL_PERIOD`]-day window of the
///    *original* values (at least one valid neighbor required), then
/// 2. a forward fill from the nearest prior resolved value for anything the
///    rolling pass could not reach.
///
/// A leading run too long for the rolling window has no prior value to
/// forward-fill from; those days are back-filled from the first resolved
/// day so the post-condition (no missing demand) always holds.
///
/// An empty input yields an empty series; callers must handle that
/// downstream as insufficient data.
pub fn normalize_demand(raw: &[RawDemand]) -> Vec<DemandObservation> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<RawDemand> = raw.to_vec();
    sorted.sort_by_key(|r| r.date);

    let start = sorted[0].date;
    let end = sorted[sorted.len() - 1].date;
    let n_days = (end - start).num_days() as usize + 1;

    // Resample to one slot per calendar day. On duplicate dates the last
    // reading with a value wins.
    let mut observed: Vec<Option<f64>> = vec![None; n_days];
    for row in &sorted {
        let idx = (row.date - start).num_days() as usize;
        if row.demand.is_some() {
            observed[idx] = row.demand;
        }
    }

    // Pass 1: centered rolling mean computed over the original values only,
    // so fills do not cascade into each other.
    let half_window = ROLL_PERIOD / 2;
    let mut filled = observed.clone();
    for i in 0..n_days {
        if observed[i].is_some() {
            continue;
        }
        let lo = i.saturating_sub(half_window);
        let hi = usize::min(i + half_window, n_days - 1);
        let neighbors: Vec<f64> = observed[lo..=hi].iter().flatten().copied().collect();
        if !neighbors.is_empty() {
            filled[i] = Some(neighbors.iter().sum::<f64>() / neighbors.len() as f64);
        }
    }

    // Pass 2: forward fill remaining holes from the nearest prior resolved
    // value, which may itself be a pass-1 fill.
    let mut last_resolved: Option<f64> = None;
    for slot in filled.iter_mut() {
        match slot {
            Some(value) => last_resolved = Some(*value),
            None => *slot = last_resolved,
        }
    }

    // Back-fill a still-unresolved head from the first resolved value.
    let first_resolved = filled.iter().flatten().copied().next();
    if let Some(first_value) = first_resolved {
        for slot in filled.iter_mut() {
            if slot.is_none() {
                *slot = Some(first_value);
            } else {
                break;
            }
        }
    }

    filled
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| {
            value.map(|demand| DemandObservation {
                date: start + Duration::days(i as i64),
                demand,
                is_imputed: observed[i].is_none(),
            })
        })
        .collect()
}
