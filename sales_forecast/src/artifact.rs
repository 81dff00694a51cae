//! Versioned on-disk model artifact
//!
//! The artifact is a JSON document:
//!
//! ```text
//! {
//!   "format": "sales-forecast/seasonal-trend",
//!   "version": 1,
//!   "created_at": "2024-05-01T12:00:00Z",
//!   "hyperparameters": { ... },
//!   "cv_mape": 8.41,
//!   "test_metrics": { "mae": ..., "mse": ..., "rmse": ..., "mape": ..., "smape": ... },
//!   "model": { "settings": ..., "layout": ..., "coefficients": ..., "history_dates": [...] }
//! }
//! ```
//!
//! Floats are written with enough digits to read back bit-for-bit, so a
//! loaded model forecasts exactly like the one that was saved.

use crate::error::{ForecastError, Result};
use crate::metrics::ForecastAccuracy;
use crate::models::{FittedSeasonalTrend, Hyperparameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const ARTIFACT_FORMAT: &str = "sales-forecast/seasonal-trend";
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub hyperparameters: Hyperparameters,
    /// Mean cross-validation MAPE of the selected configuration
    pub cv_mape: Option<f64>,
    /// Scores on the held-out test partition
    pub test_metrics: Option<ForecastAccuracy>,
    pub model: FittedSeasonalTrend,
}

impl ModelArtifact {
    pub fn new(
        model: FittedSeasonalTrend,
        cv_mape: Option<f64>,
        test_metrics: Option<ForecastAccuracy>,
    ) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            version: ARTIFACT_VERSION,
            created_at: Utc::now(),
            hyperparameters: *model.params(),
            cv_mape,
            test_metrics,
            model,
        }
    }

    /// Write the artifact, replacing any previous file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, path)?;

        info!(path = %path.display(), "Saved model artifact");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ForecastError::ArtifactNotFound(path.display().to_string()));
        }
        let corrupt =
            |detail: String| ForecastError::ArtifactCorrupt(format!("{}: {}", path.display(), detail));

        let raw = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;

        let format = value.get("format").and_then(|f| f.as_str());
        if format != Some(ARTIFACT_FORMAT) {
            return Err(corrupt(format!(
                "unexpected format {:?}, expected '{}'",
                format, ARTIFACT_FORMAT
            )));
        }
        let version = value.get("version").and_then(|v| v.as_u64());
        if version != Some(u64::from(ARTIFACT_VERSION)) {
            return Err(corrupt(format!(
                "unsupported version {:?}, expected {}",
                version, ARTIFACT_VERSION
            )));
        }

        let artifact: Self = serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        artifact
            .model
            .check_consistency()
            .map_err(|e| corrupt(e.to_string()))?;
        if artifact.hyperparameters != *artifact.model.params() {
            return Err(corrupt(
                "recorded hyperparameters differ from the model's".to_string(),
            ));
        }

        info!(
            path = %path.display(),
            created_at = %artifact.created_at,
            params = %artifact.hyperparameters,
            "Loaded model artifact"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DailySeries;
    use crate::models::{ModelSettings, SeasonalTrendModel};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn artifact() -> ModelArtifact {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let values: Vec<f64> = (0..60).map(|i| 20.0 + (i % 7) as f64).collect();
        let series = DailySeries::from_values(start, &values).unwrap();
        let model = SeasonalTrendModel::new(Hyperparameters::default(), ModelSettings::default())
            .unwrap()
            .fit(&series)
            .unwrap();
        ModelArtifact::new(model, Some(4.2), None)
    }

    #[test]
    fn save_then_load_is_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let saved = artifact();
        saved.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = ModelArtifact::load(dir.path().join("model.json")).unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactNotFound(_)));
    }

    #[test]
    fn garbage_and_wrong_versions_are_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ForecastError::ArtifactCorrupt(_))
        ));

        let mut value = serde_json::to_value(artifact()).unwrap();
        value["version"] = serde_json::json!(2);
        fs::write(&path, value.to_string()).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ForecastError::ArtifactCorrupt(_))
        ));

        let mut value = serde_json::to_value(artifact()).unwrap();
        value["format"] = serde_json::json!("pickle");
        fs::write(&path, value.to_string()).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ForecastError::ArtifactCorrupt(_))
        ));
    }

    #[test]
    fn truncated_coefficients_are_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.json");

        let mut value = serde_json::to_value(artifact()).unwrap();
        let trend = value["model"]["coefficients"]["trend"]
            .as_array_mut()
            .unwrap();
        trend.pop();
        fs::write(&path, value.to_string()).unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ForecastError::ArtifactCorrupt(_))
        ));
    }
}
