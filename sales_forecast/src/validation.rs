//! Rolling-origin cross-validation on calendar cutoffs

use crate::config::CvSettings;
use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use crate::metrics::mape;
use crate::models::{ForecastFrame, ForecastModel, TrainedForecastModel};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Wall-clock budget shared by every fit of one candidate
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget_secs: Option<f64>,
}

impl Deadline {
    pub fn start(budget_secs: Option<f64>) -> Self {
        Self {
            started: Instant::now(),
            budget_secs,
        }
    }

    pub fn unlimited() -> Self {
        Self::start(None)
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Fail with `CandidateTimeout` once the budget is spent
    pub fn check(&self) -> Result<()> {
        match self.budget_secs {
            Some(budget_secs) if self.elapsed_secs() > budget_secs => {
                Err(ForecastError::CandidateTimeout { budget_secs })
            }
            _ => Ok(()),
        }
    }
}

/// Score of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub cutoff: NaiveDate,
    pub train_rows: usize,
    pub test_rows: usize,
    pub mape: f64,
}

/// Per-fold scores and their mean
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvOutcome {
    pub folds: Vec<FoldScore>,
    pub mean_mape: f64,
}

/// Cutoff dates for rolling-origin evaluation, ascending.
///
/// The first cutoff sits one horizon before the last date; cutoffs step
/// back by `period_days` while they stay at or after `first + initial_days`.
/// A cutoff whose horizon window holds no data is moved to one horizon
/// before the last observed date preceding it.
pub fn generate_cutoffs(
    dates: &[NaiveDate],
    settings: &CvSettings,
    initial_days: i64,
) -> Result<Vec<NaiveDate>> {
    let (first, last) = match (dates.first(), dates.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            return Err(ForecastError::InsufficientData {
                needed: 1,
                got: 0,
            })
        }
    };
    let horizon = Duration::days(settings.horizon_days);
    let period = Duration::days(settings.period_days);
    let earliest = first + Duration::days(initial_days);

    let mut cutoff = last - horizon;
    if cutoff < earliest {
        return Err(ForecastError::InsufficientData {
            needed: (initial_days + settings.horizon_days) as usize,
            got: (last - first).num_days() as usize,
        });
    }

    let mut cutoffs = vec![cutoff];
    while cutoff >= earliest {
        let mut next = cutoff - period;
        let has_data = dates.iter().any(|&d| d > next && d <= next + horizon);
        if !has_data && next > first {
            if let Some(&closest) = dates.iter().filter(|&&d| d <= next).max() {
                next = closest - horizon;
            }
        }
        cutoffs.push(next);
        cutoff = next;
    }
    // The last cutoff stepped past the initial window.
    cutoffs.pop();

    if cutoffs.is_empty() {
        return Err(ForecastError::DataError(
            "Less data than horizon after initial window; make horizon or initial shorter"
                .to_string(),
        ));
    }
    cutoffs.reverse();
    Ok(cutoffs)
}

/// Fit `model` at every cutoff and score the following horizon with MAPE.
///
/// The deadline is checked before every fold.
pub fn cross_validate<M: ForecastModel>(
    model: &M,
    series: &DailySeries,
    settings: &CvSettings,
    deadline: &Deadline,
) -> Result<CvOutcome> {
    let initial_days = settings.initial_days(series.len());
    let cutoffs = generate_cutoffs(&series.dates(), settings, initial_days)?;
    let horizon = Duration::days(settings.horizon_days);

    let mut folds = Vec::with_capacity(cutoffs.len());
    for cutoff in cutoffs {
        deadline.check()?;

        let train = series.filter(|r| r.date <= cutoff);
        let test = series.filter(|r| r.date > cutoff && r.date <= cutoff + horizon);
        if test.is_empty() {
            debug!(%cutoff, "Skipping fold without evaluation rows");
            continue;
        }

        let trained = model.train(&train)?;
        let predictions = trained.predict(&ForecastFrame::from_series(&test))?;
        let predicted: Vec<f64> = predictions.iter().map(|row| row.yhat).collect();
        let score = mape(&test.values(), &predicted)?;

        debug!(
            model = model.name(),
            %cutoff,
            train_rows = train.len(),
            test_rows = test.len(),
            mape = score,
            "Cross-validation fold"
        );
        folds.push(FoldScore {
            cutoff,
            train_rows: train.len(),
            test_rows: test.len(),
            mape: score,
        });
    }

    if folds.is_empty() {
        return Err(ForecastError::ModelError(
            "Cross-validation produced no scored folds".to_string(),
        ));
    }
    let mean_mape = folds.iter().map(|f| f.mape).sum::<f64>() / folds.len() as f64;
    Ok(CvOutcome { folds, mean_mape })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(offset)
    }

    fn days(n: i64) -> Vec<NaiveDate> {
        (0..n).map(day).collect()
    }

    #[test]
    fn cutoffs_step_back_from_the_end() {
        // 370 days, initial = floor(0.74 * 370) = 273
        let dates = days(370);
        let settings = CvSettings::default();
        let cutoffs = generate_cutoffs(&dates, &settings, settings.initial_days(370)).unwrap();

        // last = day 369, first cutoff = day 339, then 309 and 279; 249 < 273
        assert_eq!(cutoffs, vec![day(279), day(309), day(339)]);
    }

    #[rstest]
    #[case(100, 74)]
    #[case(60, 44)]
    fn too_short_history_is_rejected(#[case] rows: i64, #[case] initial: i64) {
        let dates = days(rows);
        let settings = CvSettings::default();
        assert!(generate_cutoffs(&dates, &settings, initial).is_err());
    }

    #[test]
    fn cutoff_before_gap_moves_to_last_observation() {
        // Data on days 0..=200 and 260..=300: the window after cutoff 210
        // is empty, so it moves to 200 - 30 = 170.
        let mut dates = days(201);
        dates.extend((260..=300).map(day));
        let settings = CvSettings::default();

        let cutoffs = generate_cutoffs(&dates, &settings, 100).unwrap();
        assert_eq!(cutoffs, vec![day(110), day(140), day(170), day(240), day(270)]);
    }

    #[test]
    fn expired_deadline_is_a_timeout() {
        let deadline = Deadline::start(Some(0.0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(matches!(
            deadline.check(),
            Err(ForecastError::CandidateTimeout { .. })
        ));
        assert!(Deadline::unlimited().check().is_ok());
    }
}
