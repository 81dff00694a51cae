//! Z-score outlier removal with boundaries learned from the training
//! partition only

use crate::config::OutlierConfig;
use crate::data::{DailySeries, Partition};
use crate::error::{ForecastError, Result};
use forecast_math::{mean, sample_std_dev};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Center, spread and cut-off learned from a training partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierBoundary {
    /// Mean of the training values
    pub center: f64,
    /// Sample standard deviation of the training values (0 when undefined)
    pub spread: f64,
    /// Maximum standardized distance of an inlier
    pub threshold: f64,
}

/// Result of applying a boundary to one partition
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub kept: DailySeries,
    pub dropped: usize,
}

/// Both partitions after outlier removal, with the boundary that cleaned them
#[derive(Debug, Clone, PartialEq)]
pub struct CleanPartition {
    pub boundary: OutlierBoundary,
    pub train: DailySeries,
    pub test: DailySeries,
}

impl OutlierBoundary {
    /// Learn the boundary from training values
    pub fn fit(train: &DailySeries, threshold: f64) -> Result<Self> {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Outlier threshold must be positive, got {}",
                threshold
            )));
        }

        let values = train.values();
        let center = mean(&values).ok_or_else(|| {
            ForecastError::DataError("Cannot compute outlier boundary of an empty partition".to_string())
        })?;
        let spread = sample_std_dev(&values).unwrap_or(0.0);

        Ok(Self {
            center,
            spread,
            threshold,
        })
    }

    /// Standardized distance from the center, or `None` for a zero spread
    pub fn distance(&self, value: f64) -> Option<f64> {
        if self.spread > 0.0 && self.spread.is_finite() {
            Some((value - self.center).abs() / self.spread)
        } else {
            None
        }
    }

    /// A constant training series has no spread: every point is an inlier.
    pub fn is_outlier(&self, value: f64) -> bool {
        self.distance(value).map_or(false, |d| d > self.threshold)
    }

    /// Drop the rows of `series` that lie beyond the threshold
    pub fn apply(&self, series: &DailySeries) -> Filtered {
        let kept = series.filter(|record| !self.is_outlier(record.value));
        let dropped = series.len() - kept.len();
        Filtered { kept, dropped }
    }
}

/// Remove outliers from both partitions using training statistics
pub fn clean_partition(partition: &Partition, config: &OutlierConfig) -> Result<CleanPartition> {
    info!(
        train_rows = partition.train.len(),
        test_rows = partition.test.len(),
        "Calculating outlier boundaries using training data only"
    );
    let boundary = OutlierBoundary::fit(&partition.train, config.z_threshold)?;
    info!(
        "Train data: Mean={:.2}, Std={:.2}, Threshold={}",
        boundary.center, boundary.spread, boundary.threshold
    );
    if boundary.spread == 0.0 {
        info!("Training values have no spread; treating every point as an inlier");
    }

    let train = boundary.apply(&partition.train);
    info!(
        "Dropping {} training outlier rows (z-score > {}); {} remain",
        train.dropped,
        boundary.threshold,
        train.kept.len()
    );

    let test = boundary.apply(&partition.test);
    info!(
        "Dropping {} test outlier rows (z-score > {}); {} remain",
        test.dropped,
        boundary.threshold,
        test.kept.len()
    );

    Ok(CleanPartition {
        boundary,
        train: train.kept,
        test: test.kept,
    })
}
