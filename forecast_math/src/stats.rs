//! Summary statistics used by the outlier filter and the forecast summary

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

/// Arithmetic mean. Returns `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Sample standard deviation (n - 1 denominator).
///
/// Returns `None` when fewer than two values are available, where the
/// sample estimate is undefined.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

/// Two-sided standard normal quantile for a central interval of `width`.
///
/// `normal_quantile(0.8)` is the z-score such that 80% of the mass lies in
/// `[-z, z]`.
pub fn normal_quantile(width: f64) -> Result<f64> {
    if !(width > 0.0 && width < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Interval width must be in (0, 1), got {}",
            width
        )));
    }

    let standard = Normal::new(0.0, 1.0)
        .map_err(|e| MathError::CalculationError(format!("Normal distribution: {}", e)))?;
    Ok(standard.inverse_cdf(0.5 + width / 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_and_std_match_hand_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values).unwrap(), 5.0);
        // sample variance = 32 / 7
        assert_relative_eq!(
            sample_std_dev(&values).unwrap(),
            (32.0f64 / 7.0).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn degenerate_inputs_are_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(sample_std_dev(&[3.0]), None);
    }

    #[test]
    fn quantile_for_common_widths() {
        assert_relative_eq!(normal_quantile(0.8).unwrap(), 1.2816, epsilon = 1e-3);
        assert_relative_eq!(normal_quantile(0.95).unwrap(), 1.9600, epsilon = 1e-3);
        assert!(normal_quantile(1.0).is_err());
        assert!(normal_quantile(0.0).is_err());
    }
}
