//! Raw demand table loading
//!
//! The engine's input is a `{date, demand}` table with one row per
//! observed day and gaps permitted. This module loads that table from CSV
//! or an existing polars `DataFrame`, auto-detecting the two columns, and
//! hands back typed rows with null demand cells preserved for
//! normalization to flag.

use crate::demand::RawDemand;
use crate::error::{DemandForecastError, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Loader for raw demand tables
#[derive(Debug)]
pub struct DemandLoader;

impl DemandLoader {
    /// Load a raw demand table from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawDemand>> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(df)
    }

    /// Extract raw demand rows from an existing DataFrame
    pub fn from_dataframe(df: DataFrame) -> Result<Vec<RawDemand>> {
        let date_column = Self::detect_date_column(&df)?;
        let demand_column = Self::detect_demand_column(&df, &date_column)?;

        let dates = Self::column_as_dates(&df, &date_column)?;
        let demands = Self::column_as_optional_f64(&df, &demand_column)?;

        if dates.len() != demands.len() {
            return Err(DemandForecastError::DataError(format!(
                "Date column has {} values but demand column has {}",
                dates.len(),
                demands.len()
            )));
        }

        Ok(dates
            .into_iter()
            .zip(demands)
            .map(|(date, demand)| RawDemand { date, demand })
            .collect())
    }

    /// Detect the date column in a DataFrame
    fn detect_date_column(df: &DataFrame) -> Result<String> {
        let column_names = df.get_column_names();

        for name in &column_names {
            let lower_name = name.to_lowercase();
            if lower_name.contains("date")
                || lower_name.contains("time")
                || lower_name.contains("timestamp")
            {
                return Ok(name.to_string());
            }
        }

        // If not found by name, use the first temporal column
        for col in df.get_columns() {
            if col.dtype().is_temporal() {
                return Ok(col.name().to_string());
            }
        }

        Err(DemandForecastError::DataError(
            "No date column found in data".to_string(),
        ))
    }

    /// Detect the demand column in a DataFrame
    fn detect_demand_column(df: &DataFrame, date_column: &str) -> Result<String> {
        let column_names = df.get_column_names();

        for name in &column_names {
            if name.to_lowercase().contains("demand") {
                return Ok(name.to_string());
            }
        }

        // If not found by name, use the first numeric non-date column
        for col in df.get_columns() {
            if col.name() == date_column {
                continue;
            }
            if matches!(
                col.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            ) {
                return Ok(col.name().to_string());
            }
        }

        Err(DemandForecastError::DataError(
            "No demand column found in data".to_string(),
        ))
    }

    /// Read a column as calendar dates
    fn column_as_dates(df: &DataFrame, column_name: &str) -> Result<Vec<NaiveDate>> {
        let col = df.column(column_name)?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();

        let parsed: Vec<Option<NaiveDate>> = match col.dtype() {
            DataType::Utf8 => col
                .utf8()?
                .into_iter()
                .map(|opt| opt.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
                .collect(),
            DataType::Date => col
                .date()?
                .into_iter()
                .map(|opt| opt.map(|days| epoch + Duration::days(i64::from(days))))
                .collect(),
            DataType::Datetime(unit, _) => {
                let seconds_divisor = match unit {
                    TimeUnit::Nanoseconds => 1_000_000_000,
                    TimeUnit::Microseconds => 1_000_000,
                    TimeUnit::Milliseconds => 1_000,
                };
                col.datetime()?
                    .into_iter()
                    .map(|opt| {
                        opt.and_then(|ts| {
                            NaiveDateTime::from_timestamp_opt(ts / seconds_divisor, 0)
                                .map(|dt| dt.date())
                        })
                    })
                    .collect()
            }
            other => {
                return Err(DemandForecastError::DataError(format!(
                    "Column '{}' has unsupported date type {:?}",
                    column_name, other
                )))
            }
        };

        parsed
            .into_iter()
            .map(|opt| {
                opt.ok_or_else(|| {
                    DemandForecastError::DataError(format!(
                        "Column '{}' contains a null or unparsable date",
                        column_name
                    ))
                })
            })
            .collect()
    }

    /// Read a column as optional f64 values, preserving nulls
    fn column_as_optional_f64(df: &DataFrame, column_name: &str) -> Result<Vec<Option<f64>>> {
        let col = df.column(column_name)?;

        match col.dtype() {
            DataType::Float64 => Ok(col.f64()?.into_iter().collect()),
            DataType::Float32 => Ok(col
                .f32()?
                .into_iter()
                .map(|opt| opt.map(f64::from))
                .collect()),
            DataType::Int64 => Ok(col
                .i64()?
                .into_iter()
                .map(|opt| opt.map(|v| v as f64))
                .collect()),
            DataType::Int32 => Ok(col
                .i32()?
                .into_iter()
                .map(|opt| opt.map(f64::from))
                .collect()),
            DataType::UInt64 => Ok(col
                .u64()?
                .into_iter()
                .map(|opt| opt.map(|v| v as f64))
                .collect()),
            DataType::UInt32 => Ok(col
                .u32()?
                .into_iter()
                .map(|opt| opt.map(f64::from))
                .collect()),
            _ => Err(DemandForecastError::DataError(format!(
                "Column '{}' cannot be converted to f64",
                column_name
            ))),
        }
    }
}
