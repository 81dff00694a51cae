//! Training pipeline: ingestion, outlier filter, search, final fit, persist

use crate::artifact::ModelArtifact;
use crate::config::PipelineConfig;
use crate::data::{aggregate_daily, split_train_test, DataLoader, Partition};
use crate::error::{Result, Stage, StageExt};
use crate::metrics::ForecastAccuracy;
use crate::outliers::{clean_partition, CleanPartition};
use crate::trainer::Trainer;
use crate::tuning::{GridSearch, SearchReport};
use std::fs;
use tracing::{debug, info, info_span};

/// Everything the training run produced
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub artifact: ModelArtifact,
    pub search: SearchReport,
    pub metrics: ForecastAccuracy,
    pub clean: CleanPartition,
}

#[derive(Debug, Clone)]
pub struct TrainPipeline {
    config: PipelineConfig,
}

impl TrainPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage; the artifact is written only if the model passes
    /// the quality gate
    pub fn run(&self) -> Result<TrainOutcome> {
        let span = info_span!("train_pipeline");
        let _enter = span.enter();

        let partition = self.ingest().stage(Stage::Ingestion)?;
        let clean = self.remove_outliers(&partition).stage(Stage::OutlierFilter)?;

        let trainer = Trainer::new(self.config.trainer.clone(), self.config.model.clone());
        let holidays = trainer.holidays_for(&clean.train).stage(Stage::Training)?;

        let search = GridSearch::new(self.config.search.clone(), self.config.model.clone())
            .with_holidays(holidays.clone())
            .run(&clean.train)
            .stage(Stage::HyperparameterSearch)?;

        let outcome = trainer
            .train(&clean, &search, holidays)
            .stage(Stage::Training)?;
        outcome
            .artifact
            .save(self.config.paths.model_json())
            .stage(Stage::Training)?;

        info!(
            cv_mape = search.best.cv_mape,
            test_mape = outcome.metrics.mape,
            "Training pipeline finished"
        );
        Ok(TrainOutcome {
            artifact: outcome.artifact,
            search,
            metrics: outcome.metrics,
            clean,
        })
    }

    /// Read, aggregate and split the raw data, writing the partition CSVs
    pub fn ingest(&self) -> Result<Partition> {
        let paths = &self.config.paths;
        let ingestion = &self.config.ingestion;
        info!(path = %paths.raw_data.display(), "Starting data ingestion");

        fs::create_dir_all(&paths.artifacts_dir)?;
        let source = fs::canonicalize(&paths.raw_data)?;
        match fs::canonicalize(paths.raw_copy()) {
            Ok(target) if target == source => {
                debug!(path = %source.display(), "Raw data already in the artifacts directory")
            }
            _ => {
                fs::copy(&source, paths.raw_copy())?;
            }
        }

        let transactions = DataLoader::from_csv(&paths.raw_data, ingestion)?;
        let daily = aggregate_daily(&transactions, &ingestion.regressor_columns)?;
        info!(
            transactions = transactions.len(),
            days = daily.len(),
            "Aggregated transactions to daily totals"
        );

        let partition = split_train_test(&daily, ingestion.test_window)?;
        partition.train.to_csv(paths.train_csv())?;
        partition.test.to_csv(paths.test_csv())?;
        info!(
            train_rows = partition.train.len(),
            test_rows = partition.test.len(),
            "Ingestion of the data is completed"
        );
        Ok(partition)
    }

    fn remove_outliers(&self, partition: &Partition) -> Result<CleanPartition> {
        let clean = clean_partition(partition, &self.config.outliers)?;
        clean.train.to_csv(self.config.paths.train_cleaned_csv())?;
        clean.test.to_csv(self.config.paths.test_cleaned_csv())?;
        Ok(clean)
    }
}
