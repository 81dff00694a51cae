//! Final fit of the selected configuration and the held-out quality gate

use crate::artifact::ModelArtifact;
use crate::config::{HolidaySettings, TrainerConfig};
use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use crate::holidays::{CsvHolidayCalendar, Holiday, HolidayCalendar};
use crate::metrics::{forecast_accuracy, ForecastAccuracy};
use crate::models::{
    FittedSeasonalTrend, ForecastFrame, Hyperparameters, ModelSettings, SeasonalTrendModel,
    TrainedForecastModel,
};
use crate::outliers::CleanPartition;
use crate::tuning::SearchReport;
use chrono::Datelike;
use tracing::{info, warn};

/// Accepted model with its held-out scores
#[derive(Debug, Clone)]
pub struct TrainedOutcome {
    pub artifact: ModelArtifact,
    pub metrics: ForecastAccuracy,
}

#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainerConfig,
    settings: ModelSettings,
}

impl Trainer {
    pub fn new(config: TrainerConfig, settings: ModelSettings) -> Self {
        Self { config, settings }
    }

    /// Fit the winning configuration on the cleaned training partition and
    /// score it on the cleaned test partition.
    ///
    /// A model whose test MAPE exceeds the configured limit is rejected with
    /// `ModelQuality` before anything is written. An empty test partition is
    /// `InsufficientData`.
    pub fn train(
        &self,
        clean: &CleanPartition,
        search: &SearchReport,
        holidays: Vec<Holiday>,
    ) -> Result<TrainedOutcome> {
        if clean.test.is_empty() {
            warn!("Outlier filter left no rows in the test partition, nothing to score");
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        let params = search.best.params;
        info!("Training final model with parameters: {}", params);
        let model = self.fit(&clean.train, params, holidays)?;

        let metrics = evaluate(&model, &clean.test)?;
        info!(
            "Test MAPE: {:.2}%, accuracy {:.2}% (MAE {:.2}, RMSE {:.2}, SMAPE {:.2}%)",
            metrics.mape,
            metrics.accuracy(),
            metrics.mae,
            metrics.rmse,
            metrics.smape
        );

        if metrics.mape > self.config.max_test_mape {
            warn!(
                mape = metrics.mape,
                threshold = self.config.max_test_mape,
                "Model rejected by the quality gate"
            );
            return Err(ForecastError::ModelQuality {
                mape: metrics.mape,
                threshold: self.config.max_test_mape,
            });
        }

        let artifact = ModelArtifact::new(model, Some(search.best.cv_mape), Some(metrics));
        Ok(TrainedOutcome { artifact, metrics })
    }

    pub fn fit(
        &self,
        train: &DailySeries,
        params: Hyperparameters,
        holidays: Vec<Holiday>,
    ) -> Result<FittedSeasonalTrend> {
        SeasonalTrendModel::new(params, self.settings.clone())?
            .with_holidays(holidays)
            .fit(train)
    }

    /// Holidays the model should see for `series`
    ///
    /// The configured calendar is always loaded and logged; it is handed to
    /// the model only when holidays are enabled.
    pub fn holidays_for(&self, series: &DailySeries) -> Result<Vec<Holiday>> {
        load_holidays(&self.config.holidays, series)
    }
}

/// Predict at the test dates with the test rows' own regressor values
pub fn evaluate<M: TrainedForecastModel>(
    model: &M,
    test: &DailySeries,
) -> Result<ForecastAccuracy> {
    let rows = model.predict(&ForecastFrame::from_series(test))?;
    let predicted: Vec<f64> = rows.iter().map(|r| r.yhat).collect();
    forecast_accuracy(&test.values(), &predicted)
}

fn load_holidays(settings: &HolidaySettings, series: &DailySeries) -> Result<Vec<Holiday>> {
    let path = match &settings.calendar_path {
        Some(path) => path,
        None => {
            if settings.enabled {
                warn!("Holidays are enabled but no calendar is configured");
            }
            return Ok(Vec::new());
        }
    };
    let (first, last) = match (series.first_date(), series.last_date()) {
        (Some(first), Some(last)) => (first.year(), last.year()),
        _ => return Ok(Vec::new()),
    };

    // One extra year so windows around the forecast horizon are covered.
    let calendar = CsvHolidayCalendar::from_csv(path)?;
    let holidays = calendar.holidays(first..=last + 1)?;
    info!(
        path = %path.display(),
        count = holidays.len(),
        enabled = settings.enabled,
        "Loaded holiday calendar for {}..={}",
        first,
        last + 1
    );

    if settings.enabled {
        Ok(holidays)
    } else {
        Ok(Vec::new())
    }
}
