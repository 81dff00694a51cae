//! Design-matrix features for the seasonal-trend model
//!
//! - Fourier series for periodic effects
//! - Changepoint hinge columns for the piecewise-linear trend

use crate::linalg::DesignMatrix;
use crate::{MathError, Result};
use std::f64::consts::PI;

/// Fourier features `[sin(2πkt/P), cos(2πkt/P)]` for `k = 1..=order`.
///
/// `t` is measured in the same unit as `period` (days for calendar
/// seasonalities). The result has `2 * order` columns.
pub fn fourier_features(t: &[f64], period: f64, order: usize) -> Result<DesignMatrix> {
    if !(period > 0.0) {
        return Err(MathError::InvalidInput(format!(
            "Seasonal period must be positive, got {}",
            period
        )));
    }

    Ok(DesignMatrix::from_fn(t.len(), 2 * order, |i, j| {
        let k = (j / 2 + 1) as f64;
        let angle = 2.0 * PI * k * t[i] / period;
        if j % 2 == 0 {
            angle.sin()
        } else {
            angle.cos()
        }
    }))
}

/// Place potential trend changepoints uniformly over the first `range`
/// fraction of the history.
///
/// `t` must be sorted ascending. Returns the `t` values of the selected
/// rows; the first row is never a changepoint.
pub fn select_changepoints(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    if t.is_empty() || n_changepoints == 0 {
        return Vec::new();
    }

    let hist_size = ((t.len() as f64) * range.clamp(0.0, 1.0)).floor() as usize;
    if hist_size < 2 {
        return Vec::new();
    }
    let count = n_changepoints.min(hist_size - 1);
    let last = (hist_size - 1) as f64;

    let mut indices: Vec<usize> = (1..=count)
        .map(|i| (last * i as f64 / count as f64).round() as usize)
        .collect();
    indices.dedup();
    indices.into_iter().map(|i| t[i]).collect()
}

/// Hinge columns `max(t - s_j, 0)` for every changepoint `s_j`.
pub fn changepoint_features(t: &[f64], changepoints: &[f64]) -> DesignMatrix {
    DesignMatrix::from_fn(t.len(), changepoints.len(), |i, j| {
        (t[i] - changepoints[j]).max(0.0)
    })
}
