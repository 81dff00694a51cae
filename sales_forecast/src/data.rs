//! Sales data handling: raw transaction loading, daily aggregation and
//! chronological train/test partitioning

use crate::config::IngestionConfig;
use crate::error::{ForecastError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Column name used for dates in persisted daily CSV files
pub const DATE_HEADER: &str = "ds";
/// Column name used for values in persisted daily CSV files
pub const VALUE_HEADER: &str = "y";

/// One raw sales transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub quantity: f64,
    /// Values of the configured regressor columns, in configuration order
    pub regressors: Vec<f64>,
}

/// One aggregated calendar day
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub value: f64,
    pub regressors: Vec<f64>,
}

/// Daily time series with strictly increasing, unique dates
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    regressor_names: Vec<String>,
    records: Vec<DailyRecord>,
}

/// Chronological split of a daily series
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub train: DailySeries,
    pub test: DailySeries,
}

/// Data loader for raw transaction files
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load transactions from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, config: &IngestionConfig) -> Result<Vec<Transaction>> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;

        Self::from_dataframe(&df, config)
    }

    /// Extract transactions from an existing DataFrame
    pub fn from_dataframe(df: &DataFrame, config: &IngestionConfig) -> Result<Vec<Transaction>> {
        let date_column = Self::detect_date_column(df, &config.date_column)?;

        let dates = df.column(&date_column)?.cast(&DataType::Utf8)?;
        let dates = dates.utf8()?;

        let quantities = df
            .column(&config.quantity_column)
            .map_err(|e| {
                ForecastError::DataError(format!(
                    "Column '{}' not found: {}",
                    config.quantity_column, e
                ))
            })?
            .cast(&DataType::Float64)?;
        let quantities = quantities.f64()?;

        let mut regressor_series = Vec::with_capacity(config.regressor_columns.len());
        for name in &config.regressor_columns {
            let series = df
                .column(name)
                .map_err(|e| {
                    ForecastError::DataError(format!("Regressor column '{}' not found: {}", name, e))
                })?
                .cast(&DataType::Float64)?;
            regressor_series.push(series);
        }
        let regressors = regressor_series
            .iter()
            .map(|s| s.f64())
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut transactions = Vec::with_capacity(df.height());
        for (row, (date, quantity)) in dates.into_iter().zip(quantities.into_iter()).enumerate() {
            let date = date.ok_or_else(|| {
                ForecastError::DataError(format!("Missing date in row {}", row + 1))
            })?;
            let quantity = quantity.ok_or_else(|| {
                ForecastError::DataError(format!(
                    "Missing or non-numeric '{}' in row {}",
                    config.quantity_column,
                    row + 1
                ))
            })?;
            // A blank regressor cell means no promotion/event that day.
            let values = regressors
                .iter()
                .map(|ca| ca.get(row).unwrap_or(0.0))
                .collect();

            transactions.push(Transaction {
                date: parse_date(date)?,
                quantity,
                regressors: values,
            });
        }

        Ok(transactions)
    }

    /// Find the date column: the configured name if present, otherwise the
    /// first column whose name looks like a date
    fn detect_date_column(df: &DataFrame, preferred: &str) -> Result<String> {
        let column_names = df.get_column_names();

        if column_names.iter().any(|name| *name == preferred) {
            return Ok(preferred.to_string());
        }

        for name in &column_names {
            let lower_name = name.to_lowercase();
            if lower_name == DATE_HEADER || lower_name.contains("date") || lower_name.contains("time")
            {
                return Ok(name.to_string());
            }
        }

        Err(ForecastError::DataError(format!(
            "No date column found in data (expected '{}')",
            preferred
        )))
    }
}

/// Parse a date written as `YYYY-MM-DD`, optionally followed by a time
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(datetime.date());
        }
    }
    Err(ForecastError::DataError(format!("Invalid date format: {}", raw)))
}

/// Sum transactions per calendar day, sorted ascending by date
pub fn aggregate_daily(
    transactions: &[Transaction],
    regressor_names: &[String],
) -> Result<DailySeries> {
    let mut days: BTreeMap<NaiveDate, (f64, Vec<f64>)> = BTreeMap::new();

    for transaction in transactions {
        if transaction.regressors.len() != regressor_names.len() {
            return Err(ForecastError::DataError(format!(
                "Transaction on {} has {} regressor values, expected {}",
                transaction.date,
                transaction.regressors.len(),
                regressor_names.len()
            )));
        }
        let entry = days
            .entry(transaction.date)
            .or_insert_with(|| (0.0, vec![0.0; regressor_names.len()]));
        entry.0 += transaction.quantity;
        for (total, value) in entry.1.iter_mut().zip(&transaction.regressors) {
            *total += value;
        }
    }

    let records = days
        .into_iter()
        .map(|(date, (value, regressors))| DailyRecord {
            date,
            value,
            regressors,
        })
        .collect();

    DailySeries::new(regressor_names.to_vec(), records)
}

/// Split a series into a training prefix and a trailing test window
pub fn split_train_test(series: &DailySeries, test_window: usize) -> Result<Partition> {
    if series.len() <= test_window {
        return Err(ForecastError::InsufficientData {
            needed: test_window,
            got: series.len(),
        });
    }

    let boundary = series.len() - test_window;
    Ok(Partition {
        train: series.slice(0, boundary),
        test: series.slice(boundary, series.len()),
    })
}

impl DailySeries {
    /// Create a series, checking dates are strictly increasing and values
    /// are finite non-negative counts
    pub fn new(regressor_names: Vec<String>, records: Vec<DailyRecord>) -> Result<Self> {
        for pair in records.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ForecastError::DataError(format!(
                    "Dates must be strictly increasing: {} follows {}",
                    pair[1].date, pair[0].date
                )));
            }
        }
        for record in &records {
            if !record.value.is_finite() || record.value < 0.0 {
                return Err(ForecastError::DataError(format!(
                    "Value on {} must be a non-negative count, got {}",
                    record.date, record.value
                )));
            }
            if record.regressors.len() != regressor_names.len() {
                return Err(ForecastError::DataError(format!(
                    "Record on {} has {} regressor values, expected {}",
                    record.date,
                    record.regressors.len(),
                    regressor_names.len()
                )));
            }
        }

        Ok(Self {
            regressor_names,
            records,
        })
    }

    /// Create a series of consecutive days without regressors
    pub fn from_values(start: NaiveDate, values: &[f64]) -> Result<Self> {
        let records = values
            .iter()
            .zip(start.iter_days())
            .map(|(&value, date)| DailyRecord {
                date,
                value,
                regressors: Vec::new(),
            })
            .collect();
        Self::new(Vec::new(), records)
    }

    /// Load a daily CSV with `ds`, `y` and optional regressor columns
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let date_idx = headers.iter().position(|h| h == DATE_HEADER).ok_or_else(|| {
            ForecastError::DataError(format!("Missing '{}' column", DATE_HEADER))
        })?;
        let value_idx = headers.iter().position(|h| h == VALUE_HEADER).ok_or_else(|| {
            ForecastError::DataError(format!("Missing '{}' column", VALUE_HEADER))
        })?;
        let regressor_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != date_idx && i != value_idx)
            .collect();
        let regressor_names = regressor_idx
            .iter()
            .map(|&i| headers[i].to_string())
            .collect();

        let mut records = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or("").trim();
            let parse_number = |idx: usize| -> Result<f64> {
                let raw = field(idx);
                if raw.is_empty() {
                    return Ok(0.0);
                }
                raw.parse::<f64>().map_err(|e| {
                    ForecastError::DataError(format!(
                        "Row {}: cannot parse '{}' as a number: {}",
                        row + 1,
                        raw,
                        e
                    ))
                })
            };

            records.push(DailyRecord {
                date: parse_date(field(date_idx))?,
                value: parse_number(value_idx)?,
                regressors: regressor_idx
                    .iter()
                    .map(|&i| parse_number(i))
                    .collect::<Result<Vec<_>>>()?,
            });
        }

        Self::new(regressor_names, records)
    }

    /// Write the series as CSV with `ds`, `y` and one column per regressor
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec![DATE_HEADER.to_string(), VALUE_HEADER.to_string()];
        header.extend(self.regressor_names.iter().cloned());
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = vec![
                record.date.format("%Y-%m-%d").to_string(),
                record.value.to_string(),
            ];
            row.extend(record.regressors.iter().map(|v| v.to_string()));
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn regressor_names(&self) -> &[String] {
        &self.regressor_names
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    /// Get the dates as a vector
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }

    /// Get the values as a vector
    pub fn values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.value).collect()
    }

    /// Values of one regressor column
    pub fn regressor_column(&self, index: usize) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| r.regressors.get(index).copied().unwrap_or(0.0))
            .collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Get a contiguous slice of rows `[start, end)`
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.records.len());
        let start = start.min(end);
        Self {
            regressor_names: self.regressor_names.clone(),
            records: self.records[start..end].to_vec(),
        }
    }

    /// Keep only the rows matching `keep`, preserving order
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&DailyRecord) -> bool,
    {
        Self {
            regressor_names: self.regressor_names.clone(),
            records: self.records.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the number of days in the series
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
