//! # Sales forecast workspace
//!
//! Facade over the workspace crates: [`sales_forecast`] for the training
//! pipeline and forecast service, [`forecast_math`] for the numeric kernels.
//!
//! ## Example
//!
//! ```
//! use sales_forecast_workspace::forecast_math::mean;
//!
//! assert_eq!(mean(&[1.0, 2.0, 3.0]).unwrap(), 2.0);
//! ```

pub use forecast_math;
pub use sales_forecast;

/// Name and version of the pipeline crate
pub fn describe() -> String {
    format!("{} {}", sales_forecast::NAME, sales_forecast::VERSION)
}
