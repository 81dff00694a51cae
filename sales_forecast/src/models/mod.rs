//! Forecasting models for daily sales series

use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;

pub mod seasonal_trend;

pub use seasonal_trend::{FittedSeasonalTrend, SeasonalTrendModel};

/// How seasonal and holiday effects combine with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    /// `yhat = trend + seasonal`
    #[default]
    Additive,
    /// `yhat = trend * (1 + seasonal)`
    Multiplicative,
}

impl fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeasonalityMode::Additive => f.write_str("additive"),
            SeasonalityMode::Multiplicative => f.write_str("multiplicative"),
        }
    }
}

impl FromStr for SeasonalityMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "additive" => Ok(SeasonalityMode::Additive),
            "multiplicative" => Ok(SeasonalityMode::Multiplicative),
            other => Err(ForecastError::InvalidParameter(format!(
                "Invalid seasonality mode: {}. Must be 'additive' or 'multiplicative'.",
                other
            ))),
        }
    }
}

/// Tunable knobs of the seasonal-trend model
///
/// Each prior scale is the standard deviation of the Gaussian prior placed
/// on its coefficient block: larger values let that component bend more.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Flexibility of the trend at changepoints
    pub changepoint_prior_scale: f64,
    /// Strength of the seasonal components
    pub seasonality_prior_scale: f64,
    /// Strength of holiday and extra-regressor effects
    pub holidays_prior_scale: f64,
    /// Seasonal combination mode
    pub seasonality_mode: SeasonalityMode,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            seasonality_mode: SeasonalityMode::Additive,
        }
    }
}

impl Hyperparameters {
    /// Check every prior scale is a positive finite number
    pub fn validate(&self) -> Result<()> {
        let scales = [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
            ("holidays_prior_scale", self.holidays_prior_scale),
        ];
        for (name, value) in scales {
            if !(value.is_finite() && value > 0.0) {
                return Err(ForecastError::InvalidParameter(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "changepoint_prior_scale={}, seasonality_prior_scale={}, holidays_prior_scale={}, seasonality_mode={}",
            self.changepoint_prior_scale,
            self.seasonality_prior_scale,
            self.holidays_prior_scale,
            self.seasonality_mode
        )
    }
}

/// Structural settings of the seasonal-trend model that are not tuned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Number of potential trend changepoints
    pub n_changepoints: usize,
    /// Fraction of the history in which changepoints may be placed
    pub changepoint_range: f64,
    /// Yearly seasonality (period 365.25 days, Fourier order 10)
    pub yearly_seasonality: bool,
    /// Weekly seasonality (period 7 days, Fourier order 3)
    pub weekly_seasonality: bool,
    /// Daily seasonality (period 1 day, Fourier order 4)
    pub daily_seasonality: bool,
    /// Central coverage of the prediction interval
    pub interval_width: f64,
    /// Iteration cap for the multiplicative fit; the last iterate is kept
    /// when it is reached
    pub max_iterations: usize,
    /// Relative objective change that ends the multiplicative fit
    pub tolerance: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: false,
            interval_width: 0.80,
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

impl ModelSettings {
    /// Validate settings ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        if self.max_iterations == 0 {
            return Err(ForecastError::InvalidParameter(
                "max_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Dates and regressor values a trained model is asked to predict at
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastFrame {
    dates: Vec<NaiveDate>,
    regressors: Vec<Vec<f64>>,
}

impl ForecastFrame {
    /// Create a frame; `regressors` holds one row per date
    pub fn new(dates: Vec<NaiveDate>, regressors: Vec<Vec<f64>>) -> Result<Self> {
        if dates.len() != regressors.len() {
            return Err(ForecastError::DataError(format!(
                "Frame has {} dates but {} regressor rows",
                dates.len(),
                regressors.len()
            )));
        }
        Ok(Self { dates, regressors })
    }

    /// Frame for a model without extra regressors
    pub fn from_dates(dates: Vec<NaiveDate>) -> Self {
        let regressors = vec![Vec::new(); dates.len()];
        Self { dates, regressors }
    }

    /// Frame covering the dates of a series with its own regressor values
    pub fn from_series(series: &DailySeries) -> Self {
        Self {
            dates: series.dates(),
            regressors: series.records().iter().map(|r| r.regressors.clone()).collect(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn regressors(&self) -> &[Vec<f64>] {
        &self.regressors
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// One predicted day with its interval and decomposition
///
/// The component columns are absolute contributions in the units of the
/// series, so `trend + yearly + weekly + daily + holidays + extra_regressors`
/// equals `yhat` in both seasonality modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub trend: f64,
    pub yearly: f64,
    pub weekly: f64,
    pub daily: f64,
    pub holidays: f64,
    pub extra_regressors: f64,
}

impl ForecastRow {
    /// Half the width of the prediction interval
    pub fn half_width(&self) -> f64 {
        (self.yhat_upper - self.yhat_lower) / 2.0
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug + Send + Sync {
    /// Predict values and intervals for every date of the frame
    fn predict(&self, frame: &ForecastFrame) -> Result<Vec<ForecastRow>>;

    /// Names of the extra regressors, in the order the frame must supply them
    fn regressor_names(&self) -> &[String];

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a daily series
pub trait ForecastModel: Debug + Clone + Send + Sync {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train the model on a daily series
    fn train(&self, data: &DailySeries) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}
