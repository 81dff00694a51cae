//! Error types for the sales_forecast crate

use polars::prelude::PolarsError;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingestion,
    OutlierFilter,
    HyperparameterSearch,
    Training,
    Forecast,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingestion => "ingestion",
            Stage::OutlierFilter => "outlier filter",
            Stage::HyperparameterSearch => "hyperparameter search",
            Stage::Training => "training",
            Stage::Forecast => "forecast",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`ForecastError`], independent of any stage
/// wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientData,
    AllConfigurationsFailed,
    ModelQuality,
    InvalidHorizon,
    ArtifactNotFound,
    ArtifactCorrupt,
    CandidateTimeout,
    Data,
    Model,
    InvalidParameter,
    Config,
    Io,
    Serialization,
    Math,
}

/// Custom error types for the sales_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The aggregated series cannot form a non-empty training partition
    #[error("Insufficient data: need more than {needed} rows, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Every hyperparameter candidate failed during search
    #[error("All {tried} hyperparameter configurations failed")]
    AllConfigurationsFailed { tried: usize },

    /// Trained model exceeds the test MAPE acceptance gate
    #[error("Model rejected: test MAPE {mape:.2}% exceeds threshold {threshold:.2}%")]
    ModelQuality { mape: f64, threshold: f64 },

    /// Requested forecast horizon is outside the accepted range
    #[error("Invalid horizon: {periods} (expected a value between 1 and {max})")]
    InvalidHorizon { periods: i64, max: usize },

    /// Persisted model artifact does not exist
    #[error("Model artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Persisted model artifact exists but cannot be used
    #[error("Model artifact is corrupt: {0}")]
    ArtifactCorrupt(String),

    /// A search candidate ran past its wall-clock budget
    #[error("Candidate exceeded its time budget of {budget_secs:.1}s")]
    CandidateTimeout { budget_secs: f64 },

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error raised while fitting or evaluating a model
    #[error("Model error: {0}")]
    ModelError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error in the pipeline configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from CSV reading or writing
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    PolarsError(String),

    /// Error from JSON serialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error from numeric kernels
    #[error("Math error: {0}")]
    MathError(#[from] forecast_math::MathError),

    /// An error annotated with the pipeline stage it escaped from
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ForecastError>,
    },
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::PolarsError(err.to_string())
    }
}

impl ForecastError {
    /// Wrap this error with the stage it escaped from
    pub fn in_stage(self, stage: Stage) -> Self {
        ForecastError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping stage annotations
    pub fn root(&self) -> &ForecastError {
        match self {
            ForecastError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The outermost stage annotation, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ForecastError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Classification of the root cause
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            ForecastError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ForecastError::AllConfigurationsFailed { .. } => ErrorKind::AllConfigurationsFailed,
            ForecastError::ModelQuality { .. } => ErrorKind::ModelQuality,
            ForecastError::InvalidHorizon { .. } => ErrorKind::InvalidHorizon,
            ForecastError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            ForecastError::ArtifactCorrupt(_) => ErrorKind::ArtifactCorrupt,
            ForecastError::CandidateTimeout { .. } => ErrorKind::CandidateTimeout,
            ForecastError::DataError(_) | ForecastError::PolarsError(_) => ErrorKind::Data,
            ForecastError::CsvError(_) => ErrorKind::Data,
            ForecastError::ModelError(_) => ErrorKind::Model,
            ForecastError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            ForecastError::ConfigError(_) => ErrorKind::Config,
            ForecastError::IoError(_) => ErrorKind::Io,
            ForecastError::JsonError(_) => ErrorKind::Serialization,
            ForecastError::MathError(_) => ErrorKind::Math,
            ForecastError::Stage { source, .. } => source.kind(),
        }
    }
}

/// Attach a pipeline stage to the error of a `Result`
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sees_through_stage_wrappers() {
        let err = ForecastError::InsufficientData { needed: 30, got: 12 }
            .in_stage(Stage::Ingestion)
            .in_stage(Stage::Training);

        assert_eq!(err.kind(), ErrorKind::InsufficientData);
        assert_eq!(err.stage(), Some(Stage::Training));
        assert!(matches!(err.root(), ForecastError::InsufficientData { got: 12, .. }));
    }

    #[test]
    fn stage_message_keeps_cause() {
        let result: Result<()> = Err(ForecastError::DataError("missing column".to_string()));
        let err = result.stage(Stage::Ingestion).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("ingestion failed"));
        assert!(message.contains("missing column"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
