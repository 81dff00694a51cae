//! # Sales Forecast
//!
//! A Rust library for forecasting daily sales from raw transaction records.
//!
//! ## Features
//!
//! - Transaction ingestion with daily aggregation and a chronological train/test split
//! - Z-score outlier removal with boundaries learned from the training data only
//! - Seasonal-trend model: piecewise-linear trend, weekly/yearly seasonality,
//!   holidays and extra regressors, additive or multiplicative
//! - Hyperparameter grid search scored by rolling-origin cross-validation
//! - A quality gate on held-out MAPE before a model is persisted
//! - A forecast service that serves N-day forecasts with intervals and a summary
//!
//! ## Quick Start
//!
//! ```no_run
//! use sales_forecast::config::PipelineConfig;
//! use sales_forecast::pipeline::TrainPipeline;
//! use sales_forecast::service::ForecastService;
//!
//! # fn main() -> Result<(), sales_forecast::ForecastError> {
//! let config = PipelineConfig::default();
//!
//! // Ingest, clean, tune, fit and persist
//! let outcome = TrainPipeline::new(config.clone())?.run()?;
//! println!("Test accuracy: {:.2}%", outcome.metrics.accuracy());
//!
//! // Serve a two-week forecast from the persisted artifact
//! let service = ForecastService::load(&config.paths, &config.forecast)?;
//! let forecast = service.forecast(14)?;
//! println!("{}", forecast.summary());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod config;
pub mod data;
pub mod error;
pub mod holidays;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod outliers;
pub mod pipeline;
pub mod regressors;
pub mod service;
pub mod synthetic;
pub mod trainer;
pub mod tuning;
pub mod validation;

// Re-export commonly used types
pub use crate::artifact::ModelArtifact;
pub use crate::config::PipelineConfig;
pub use crate::data::{DailySeries, DataLoader};
pub use crate::error::{ErrorKind, ForecastError, Stage};
pub use crate::models::{ForecastModel, ForecastRow, Hyperparameters, SeasonalityMode};
pub use crate::pipeline::TrainPipeline;
pub use crate::service::{Forecast, ForecastService, ForecastSummary};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
