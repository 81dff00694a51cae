//! # Forecast Math
//!
//! Numeric building blocks for the sales forecasting pipeline.
//! This crate provides summary statistics, a regularised least-squares
//! solver and the design-matrix features used by the seasonal-trend model.

use thiserror::Error;

pub mod features;
pub mod linalg;
pub mod stats;

/// Errors that can occur in numeric calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for numeric operations
pub type Result<T> = std::result::Result<T, MathError>;

pub use features::{changepoint_features, fourier_features, select_changepoints};
pub use linalg::{
    hstack, residual_sum_of_squares, ridge_solve, scale_rows, DVector, DesignMatrix,
};
pub use stats::{mean, normal_quantile, sample_std_dev};
