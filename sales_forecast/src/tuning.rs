//! Grid search over model hyperparameters scored by cross-validation

use crate::config::SearchConfig;
use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use crate::holidays::Holiday;
use crate::models::{
    ForecastModel, Hyperparameters, ModelSettings, SeasonalTrendModel, SeasonalityMode,
};
use crate::validation::{cross_validate, Deadline};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Progress is logged after this many evaluated candidates
const PROGRESS_EVERY: usize = 5;

/// Candidate values for each knob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub changepoint_prior_scale: Vec<f64>,
    pub seasonality_prior_scale: Vec<f64>,
    pub holidays_prior_scale: Vec<f64>,
    pub seasonality_mode: Vec<SeasonalityMode>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: vec![0.01, 0.1, 0.5],
            seasonality_prior_scale: vec![0.1, 1.0, 10.0],
            holidays_prior_scale: vec![0.1, 1.0, 10.0],
            seasonality_mode: vec![SeasonalityMode::Additive, SeasonalityMode::Multiplicative],
        }
    }
}

impl ParamGrid {
    /// Cartesian product in declaration order, last knob varying fastest
    pub fn combinations(&self) -> Vec<Hyperparameters> {
        let mut all = Vec::with_capacity(self.len());
        for &changepoint_prior_scale in &self.changepoint_prior_scale {
            for &seasonality_prior_scale in &self.seasonality_prior_scale {
                for &holidays_prior_scale in &self.holidays_prior_scale {
                    for &seasonality_mode in &self.seasonality_mode {
                        all.push(Hyperparameters {
                            changepoint_prior_scale,
                            seasonality_prior_scale,
                            holidays_prior_scale,
                            seasonality_mode,
                        });
                    }
                }
            }
        }
        all
    }

    pub fn len(&self) -> usize {
        self.changepoint_prior_scale.len()
            * self.seasonality_prior_scale.len()
            * self.holidays_prior_scale.len()
            * self.seasonality_mode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ForecastError::ConfigError(
                "Parameter grid has no combinations".to_string(),
            ));
        }
        for params in self.combinations() {
            params
                .validate()
                .map_err(|e| ForecastError::ConfigError(format!("Parameter grid: {}", e)))?;
        }
        Ok(())
    }
}

/// A candidate that completed cross-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: Hyperparameters,
    pub cv_mape: f64,
    pub folds: usize,
    pub elapsed_secs: f64,
}

/// A candidate that was excluded from selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub params: Hyperparameters,
    pub reason: String,
}

/// Outcome of a grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub best: CandidateScore,
    /// Successful candidates in enumeration order
    pub scores: Vec<CandidateScore>,
    pub failures: Vec<CandidateFailure>,
    pub elapsed_secs: f64,
}

impl SearchReport {
    pub fn tried(&self) -> usize {
        self.scores.len() + self.failures.len()
    }
}

/// Grid search over seasonal-trend models
#[derive(Debug, Clone)]
pub struct GridSearch {
    config: SearchConfig,
    settings: ModelSettings,
    holidays: Vec<Holiday>,
}

impl GridSearch {
    pub fn new(config: SearchConfig, settings: ModelSettings) -> Self {
        Self {
            config,
            settings,
            holidays: Vec::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: Vec<Holiday>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn run(&self, series: &DailySeries) -> Result<SearchReport> {
        search(series, &self.config, |params| {
            Ok(SeasonalTrendModel::new(*params, self.settings.clone())?
                .with_holidays(self.holidays.clone()))
        })
    }
}

/// Score every grid combination and select the lowest mean CV MAPE.
///
/// Candidates that fail to build, fit or score are logged and excluded.
/// Ties keep the earliest candidate in enumeration order, also when the
/// candidates run in parallel.
pub fn search<M, F>(series: &DailySeries, config: &SearchConfig, build: F) -> Result<SearchReport>
where
    M: ForecastModel,
    F: Fn(&Hyperparameters) -> Result<M> + Sync,
{
    let candidates = config.grid.combinations();
    let total = candidates.len();
    let span = info_span!("grid_search", candidates = total, parallel = config.parallel);
    let _enter = span.enter();

    info!(
        "Starting hyperparameter tuning over {} combinations on {} training rows",
        total,
        series.len()
    );
    let started = Instant::now();
    let progress = Progress::new(total);

    let evaluate = |params: &Hyperparameters| {
        let outcome = evaluate_candidate(params, series, config, &build);
        progress.record(&outcome);
        outcome
    };
    let outcomes: Vec<Result<CandidateScore>> = if config.parallel {
        candidates.par_iter().map(evaluate).collect()
    } else {
        candidates.iter().map(evaluate).collect()
    };

    let mut scores = Vec::new();
    let mut failures = Vec::new();
    for (params, outcome) in candidates.iter().zip(outcomes) {
        match outcome {
            Ok(score) => scores.push(score),
            Err(e) => {
                warn!(%params, error = %e, "Candidate excluded from selection");
                failures.push(CandidateFailure {
                    params: *params,
                    reason: e.to_string(),
                });
            }
        }
    }

    let mut best: Option<&CandidateScore> = None;
    for score in &scores {
        if best.map_or(true, |b| score.cv_mape < b.cv_mape) {
            best = Some(score);
        }
    }
    let best = best
        .cloned()
        .ok_or(ForecastError::AllConfigurationsFailed { tried: total })?;

    let elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        "Hyperparameter tuning finished in {:.1}s: best CV MAPE {:.4}% with {} ({} of {} candidates failed)",
        elapsed_secs,
        best.cv_mape,
        best.params,
        failures.len(),
        total
    );

    Ok(SearchReport {
        best,
        scores,
        failures,
        elapsed_secs,
    })
}

/// Full fit, then cross-validation, within one wall-clock budget
fn evaluate_candidate<M, F>(
    params: &Hyperparameters,
    series: &DailySeries,
    config: &SearchConfig,
    build: &F,
) -> Result<CandidateScore>
where
    M: ForecastModel,
    F: Fn(&Hyperparameters) -> Result<M>,
{
    let deadline = Deadline::start(config.candidate_budget_secs);
    let model = build(params)?;
    model.train(series)?;
    deadline.check()?;

    let outcome = cross_validate(&model, series, &config.cv, &deadline)?;
    if !outcome.mean_mape.is_finite() {
        return Err(ForecastError::ModelError(format!(
            "Cross-validation MAPE is not finite ({})",
            outcome.mean_mape
        )));
    }

    Ok(CandidateScore {
        params: *params,
        cv_mape: outcome.mean_mape,
        folds: outcome.folds.len(),
        elapsed_secs: deadline.elapsed_secs(),
    })
}

/// Completed-candidate counter shared across worker threads
struct Progress {
    total: usize,
    done: AtomicUsize,
    best: Mutex<Option<f64>>,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            best: Mutex::new(None),
        }
    }

    fn record(&self, outcome: &Result<CandidateScore>) {
        let best = match self.best.lock() {
            Ok(mut best) => {
                if let Ok(score) = outcome {
                    if best.map_or(true, |b| score.cv_mape < b) {
                        *best = Some(score.cv_mape);
                    }
                }
                *best
            }
            Err(_) => None,
        };

        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if done % PROGRESS_EVERY == 0 || done == self.total {
            match best {
                Some(mape) => info!(
                    "Progress: {}/{} combinations evaluated, best MAPE so far {:.4}%",
                    done, self.total, mape
                ),
                None => info!(
                    "Progress: {}/{} combinations evaluated, no candidate has succeeded yet",
                    done, self.total
                ),
            }
        }
    }
}
