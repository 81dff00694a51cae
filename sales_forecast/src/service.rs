//! Forecast service: serves N-day forecasts from a persisted model
//!
//! The service is read-only once loaded and can be shared between threads
//! without locking.

use crate::artifact::ModelArtifact;
use crate::config::{ArtifactPaths, ForecastConfig, MAX_HORIZON_DAYS};
use crate::data::DailySeries;
use crate::error::{ForecastError, Result, Stage, StageExt};
use crate::models::{FittedSeasonalTrend, ForecastRow, TrainedForecastModel};
use crate::regressors::RegressorTable;
use chrono::{Duration, NaiveDate};
use forecast_math::{mean, sample_std_dev};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Check a requested horizon lies in `[1, max]`
pub fn validate_horizon(periods: i64, max: usize) -> Result<usize> {
    if periods < 1 || periods as u64 > max as u64 {
        return Err(ForecastError::InvalidHorizon { periods, max });
    }
    Ok(periods as usize)
}

#[derive(Debug, Clone)]
pub struct ForecastService {
    artifact: ModelArtifact,
    table: RegressorTable,
    max_periods: usize,
}

impl ForecastService {
    pub fn new(artifact: ModelArtifact, table: RegressorTable, config: &ForecastConfig) -> Self {
        Self {
            artifact,
            table,
            max_periods: config.max_periods.min(MAX_HORIZON_DAYS),
        }
    }

    /// Load the model artifact and the cleaned training history
    pub fn load(paths: &ArtifactPaths, config: &ForecastConfig) -> Result<Self> {
        let artifact = ModelArtifact::load(paths.model_json())?;
        let history = DailySeries::from_csv(paths.train_cleaned_csv())?;
        let table = RegressorTable::from_series(&history);
        info!(
            history_rows = table.len(),
            regressors = table.names().len(),
            "Forecast service ready"
        );
        Ok(Self::new(artifact, table, config))
    }

    pub fn model(&self) -> &FittedSeasonalTrend {
        &self.artifact.model
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn max_periods(&self) -> usize {
        self.max_periods
    }

    /// Forecast the training history plus `periods` future days
    pub fn forecast(&self, periods: i64) -> Result<Forecast> {
        let periods = validate_horizon(periods, self.max_periods)?;
        self.predict_ahead(periods).stage(Stage::Forecast)
    }

    fn predict_ahead(&self, periods: usize) -> Result<Forecast> {
        let model = self.model();

        let history = model.history_dates();
        let last = model.last_history_date().ok_or_else(|| {
            ForecastError::ModelError("Model has no training history".to_string())
        })?;
        let mut dates = history.to_vec();
        dates.extend((1..=periods as i64).map(|d| last + Duration::days(d)));

        let (frame, defaulted) = self.table.frame_for(dates, model.regressor_names())?;
        if defaulted > 0 {
            debug!(
                rows = frame.len(),
                defaulted, "Regressor values defaulted to zero for dates outside the history table"
            );
        }

        let rows = model.predict(&frame)?;
        Forecast::new(rows, periods)
    }
}

/// Forecast rows covering the history and the requested future days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    rows: Vec<ForecastRow>,
    periods: usize,
    summary: ForecastSummary,
}

impl Forecast {
    fn new(rows: Vec<ForecastRow>, periods: usize) -> Result<Self> {
        if rows.len() < periods {
            return Err(ForecastError::ModelError(format!(
                "Model returned {} rows for a {}-day forecast",
                rows.len(),
                periods
            )));
        }
        let summary = ForecastSummary::from_rows(&rows[rows.len() - periods..])?;
        Ok(Self {
            rows,
            periods,
            summary,
        })
    }

    pub fn rows(&self) -> &[ForecastRow] {
        &self.rows
    }

    /// Rows at training dates
    pub fn history(&self) -> &[ForecastRow] {
        &self.rows[..self.rows.len() - self.periods]
    }

    /// The last `periods` rows
    pub fn future(&self) -> &[ForecastRow] {
        &self.rows[self.rows.len() - self.periods..]
    }

    pub fn periods(&self) -> usize {
        self.periods
    }

    pub fn summary(&self) -> &ForecastSummary {
        &self.summary
    }

    /// Write every row with its decomposition as CSV
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Statistics over the future rows of a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub periods: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation, 0 for a single day
    pub std_dev: f64,
    /// First date with the highest point forecast
    pub peak_date: NaiveDate,
    /// First date with the lowest point forecast
    pub trough_date: NaiveDate,
    /// Mean half-width of the prediction interval
    pub mean_half_width: f64,
}

impl ForecastSummary {
    pub fn from_rows(rows: &[ForecastRow]) -> Result<Self> {
        let first = rows.first().ok_or_else(|| {
            ForecastError::DataError("Cannot summarize an empty forecast".to_string())
        })?;
        let values: Vec<f64> = rows.iter().map(|r| r.yhat).collect();

        let mut peak = first;
        let mut trough = first;
        for row in rows {
            if row.yhat > peak.yhat {
                peak = row;
            }
            if row.yhat < trough.yhat {
                trough = row;
            }
        }

        let half_widths: Vec<f64> = rows.iter().map(ForecastRow::half_width).collect();
        Ok(Self {
            periods: rows.len(),
            total: values.iter().sum(),
            mean: mean(&values).unwrap_or(0.0),
            min: trough.yhat,
            max: peak.yhat,
            std_dev: sample_std_dev(&values).unwrap_or(0.0),
            peak_date: peak.date,
            trough_date: trough.date,
            mean_half_width: mean(&half_widths).unwrap_or(0.0),
        })
    }
}

impl fmt::Display for ForecastSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forecast Summary ({} days):", self.periods)?;
        writeln!(f, "  Total:        {:.2}", self.total)?;
        writeln!(f, "  Mean:         {:.2}", self.mean)?;
        writeln!(f, "  Min:          {:.2} on {}", self.min, self.trough_date)?;
        writeln!(f, "  Max:          {:.2} on {}", self.max, self.peak_date)?;
        writeln!(f, "  Std Dev:      {:.2}", self.std_dev)?;
        writeln!(f, "  Avg interval: ±{:.2}", self.mean_half_width)?;
        Ok(())
    }
}
