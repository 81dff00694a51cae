//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Mean Absolute Percentage Error, in percent.
///
/// Rows whose actual value is zero are excluded rather than imputed; when
/// every actual is zero the result is `0.0`.
pub fn mape(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    check_lengths(actual, predicted)?;

    let (sum, count) = actual
        .iter()
        .zip(predicted)
        .filter(|(&a, _)| a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (&a, &p)| {
            (sum + ((a - p) / a).abs(), count + 1)
        });

    if count == 0 {
        return Ok(0.0);
    }
    Ok(sum / count as f64 * 100.0)
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(actual: &[f64], predicted: &[f64]) -> Result<ForecastAccuracy> {
    check_lengths(actual, predicted)?;
    if actual.is_empty() {
        return Err(ForecastError::DataError(
            "Cannot score an empty forecast".to_string(),
        ));
    }

    let n = actual.len() as f64;
    let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;

    let smape = actual
        .iter()
        .zip(predicted)
        .map(|(&a, &p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                200.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        / n;

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape: mape(actual, predicted)?,
        smape,
    })
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.len() != predicted.len() {
        return Err(ForecastError::DataError(format!(
            "Actual length ({}) doesn't match predicted length ({})",
            actual.len(),
            predicted.len()
        )));
    }
    Ok(())
}

/// Forecast accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (percent, zero actuals excluded)
    pub mape: f64,
    /// Symmetric Mean Absolute Percentage Error (percent)
    pub smape: f64,
}

impl ForecastAccuracy {
    /// Accuracy as reported to users: `100 - MAPE`
    pub fn accuracy(&self) -> f64 {
        100.0 - self.mape
    }
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:      {:.4}", self.mae)?;
        writeln!(f, "  MSE:      {:.4}", self.mse)?;
        writeln!(f, "  RMSE:     {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:     {:.4}%", self.mape)?;
        writeln!(f, "  SMAPE:    {:.4}%", self.smape)?;
        writeln!(f, "  Accuracy: {:.2}%", self.accuracy())?;
        Ok(())
    }
}
