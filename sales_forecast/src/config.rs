//! Pipeline configuration
//!
//! Every stage receives the section it needs explicitly. The whole tree can
//! be loaded from a JSON file; missing fields fall back to their defaults.

use crate::error::{ForecastError, Result};
use crate::models::{ModelSettings, SeasonalityMode};
use crate::tuning::ParamGrid;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for training and serving
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: ArtifactPaths,
    pub ingestion: IngestionConfig,
    pub outliers: OutlierConfig,
    pub search: SearchConfig,
    pub model: ModelSettings,
    pub trainer: TrainerConfig,
    pub forecast: ForecastConfig,
    pub logging: LogConfig,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForecastError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ForecastError::ConfigError(format!("Cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.test_window == 0 {
            return Err(ForecastError::ConfigError(
                "ingestion.test_window must be positive".to_string(),
            ));
        }
        if !(self.outliers.z_threshold.is_finite() && self.outliers.z_threshold > 0.0) {
            return Err(ForecastError::ConfigError(format!(
                "outliers.z_threshold must be positive, got {}",
                self.outliers.z_threshold
            )));
        }
        self.search.cv.validate()?;
        self.search.grid.validate()?;
        if let Some(budget) = self.search.candidate_budget_secs {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(ForecastError::ConfigError(format!(
                    "search.candidate_budget_secs must be positive, got {}",
                    budget
                )));
            }
        }
        self.model.validate()?;
        if !(self.trainer.max_test_mape.is_finite() && self.trainer.max_test_mape > 0.0) {
            return Err(ForecastError::ConfigError(format!(
                "trainer.max_test_mape must be positive, got {}",
                self.trainer.max_test_mape
            )));
        }
        if self.forecast.max_periods == 0 || self.forecast.max_periods > MAX_HORIZON_DAYS {
            return Err(ForecastError::ConfigError(format!(
                "forecast.max_periods must be in [1, {}], got {}",
                MAX_HORIZON_DAYS, self.forecast.max_periods
            )));
        }
        Ok(())
    }
}

/// Input file and the directory every artifact is written to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub raw_data: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            raw_data: PathBuf::from("data/sales.csv"),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

impl ArtifactPaths {
    pub fn raw_copy(&self) -> PathBuf {
        self.artifacts_dir.join("data.csv")
    }

    pub fn train_csv(&self) -> PathBuf {
        self.artifacts_dir.join("train.csv")
    }

    pub fn test_csv(&self) -> PathBuf {
        self.artifacts_dir.join("test.csv")
    }

    /// Cleaned training partition, also the serving-time regressor table
    pub fn train_cleaned_csv(&self) -> PathBuf {
        self.artifacts_dir.join("train_cleaned.csv")
    }

    pub fn test_cleaned_csv(&self) -> PathBuf {
        self.artifacts_dir.join("test_cleaned.csv")
    }

    pub fn model_json(&self) -> PathBuf {
        self.artifacts_dir.join("model.json")
    }
}

/// Raw column names and the size of the held-out window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub date_column: String,
    pub quantity_column: String,
    /// Extra numeric columns summed per day and fed to the model
    pub regressor_columns: Vec<String>,
    pub test_window: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            date_column: "date".to_string(),
            quantity_column: "quantity_sold".to_string(),
            regressor_columns: Vec::new(),
            test_window: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Standardized distance above which a row is dropped
    pub z_threshold: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self { z_threshold: 13.59 }
    }
}

/// Rolling-origin cross-validation windows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvSettings {
    /// Initial training window as a fraction of the training rows, in days
    pub initial_fraction: f64,
    /// Spacing between cutoffs, in days
    pub period_days: i64,
    /// Evaluation window after each cutoff, in days
    pub horizon_days: i64,
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            initial_fraction: 0.74,
            period_days: 30,
            horizon_days: 30,
        }
    }
}

impl CvSettings {
    /// Initial window in days for a training partition of `rows` rows
    pub fn initial_days(&self, rows: usize) -> i64 {
        (self.initial_fraction * rows as f64).floor() as i64
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.initial_fraction > 0.0 && self.initial_fraction < 1.0) {
            return Err(ForecastError::ConfigError(format!(
                "search.cv.initial_fraction must be in (0, 1), got {}",
                self.initial_fraction
            )));
        }
        if self.period_days <= 0 || self.horizon_days <= 0 {
            return Err(ForecastError::ConfigError(format!(
                "search.cv period and horizon must be positive, got {} and {}",
                self.period_days, self.horizon_days
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub grid: ParamGrid,
    pub cv: CvSettings,
    /// Evaluate candidates on the rayon thread pool
    pub parallel: bool,
    /// Wall-clock budget per candidate, checked between folds
    pub candidate_budget_secs: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::default(),
            cv: CvSettings::default(),
            parallel: false,
            candidate_budget_secs: Some(300.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Highest acceptable test MAPE, in percent
    pub max_test_mape: f64,
    pub holidays: HolidaySettings,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_test_mape: 25.0,
            holidays: HolidaySettings::default(),
        }
    }
}

/// Holiday calendar location and whether the model sees it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidaySettings {
    /// Supply the calendar to the model; when false it is only loaded and logged
    pub enabled: bool,
    pub calendar_path: Option<PathBuf>,
}

/// Longest horizon the forecast service will ever serve
pub const MAX_HORIZON_DAYS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Horizon limit, at most [`MAX_HORIZON_DAYS`]
    pub max_periods: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            max_periods: MAX_HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    /// Directory for timestamped log files; stderr when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Smallest grid that still exercises both seasonality modes
pub fn quick_grid() -> ParamGrid {
    ParamGrid {
        changepoint_prior_scale: vec![0.05],
        seasonality_prior_scale: vec![10.0],
        holidays_prior_scale: vec![10.0],
        seasonality_mode: vec![SeasonalityMode::Additive, SeasonalityMode::Multiplicative],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.ingestion.test_window, 30);
        assert_eq!(config.outliers.z_threshold, 13.59);
        assert_eq!(config.search.cv.period_days, 30);
        assert_eq!(config.search.cv.horizon_days, 30);
        assert_eq!(config.trainer.max_test_mape, 25.0);
        assert_eq!(config.forecast.max_periods, 180);
        assert!(!config.trainer.holidays.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn initial_window_floors() {
        let cv = CvSettings::default();
        assert_eq!(cv.initial_days(400), 296);
        assert_eq!(cv.initial_days(335), 247);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"outliers": {{"z_threshold": 2.7}}, "paths": {{"artifacts_dir": "out"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.outliers.z_threshold, 2.7);
        assert_eq!(config.paths.model_json(), PathBuf::from("out/model.json"));
        assert_eq!(config.ingestion, IngestionConfig::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let mut config = PipelineConfig::default();
        config.forecast.max_periods = 0;
        assert!(matches!(config.validate(), Err(ForecastError::ConfigError(_))));
        config.forecast.max_periods = 400;
        assert!(matches!(config.validate(), Err(ForecastError::ConfigError(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(file.path()),
            Err(ForecastError::ConfigError(_))
        ));
    }
}
