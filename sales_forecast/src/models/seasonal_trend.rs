//! Seasonal-trend decomposition model
//!
//! `y(t) = g(t) + s(t) + h(t) + r(t)` in additive mode and
//! `y(t) = g(t) * (1 + s(t) + h(t)) + r(t)` in multiplicative mode, where
//! - `g` is a piecewise-linear trend with potential changepoints,
//! - `s` is a sum of Fourier seasonalities,
//! - `h` holds one indicator per holiday label and window offset,
//! - `r` are the standardized extra regressors (always additive).
//!
//! Coefficients are the MAP estimate under zero-mean Gaussian priors whose
//! standard deviations are the prior scales of [`Hyperparameters`]. With a
//! noise variance `σ²` this is ridge regression with penalty `σ² / τ²` per
//! column. `σ²` is first fixed at a small value, then re-estimated from the
//! residuals and the fit is repeated once.

use super::{
    ForecastFrame, ForecastModel, ForecastRow, Hyperparameters, ModelSettings, SeasonalityMode,
    TrainedForecastModel,
};
use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use crate::holidays::Holiday;
use chrono::{Datelike, Duration, NaiveDate};
use forecast_math::{
    changepoint_features, fourier_features, hstack, mean, normal_quantile,
    residual_sum_of_squares, ridge_solve, sample_std_dev, scale_rows, select_changepoints,
    DVector, DesignMatrix,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Prior scale of the trend intercept and base slope
const TREND_PRIOR_SCALE: f64 = 5.0;
/// Noise variance assumed for the first pass, in scaled units
const INITIAL_NOISE_VARIANCE: f64 = 0.01;
const MIN_NOISE_VARIANCE: f64 = 1e-6;
/// `NaiveDate::num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalKind {
    Yearly,
    Weekly,
    Daily,
}

/// One Fourier seasonality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalComponent {
    pub kind: SeasonalKind,
    /// Period in days
    pub period: f64,
    pub order: usize,
}

impl SeasonalComponent {
    fn width(&self) -> usize {
        2 * self.order
    }
}

/// Indicator column for one holiday label at one offset from the holiday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayColumn {
    pub label: String,
    pub offset: i32,
    /// Sorted dates on which the indicator is 1
    pub dates: Vec<NaiveDate>,
}

/// Standardization learned from the training values of one regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorScaling {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

impl RegressorScaling {
    /// Binary {0, 1} columns stay as they are; a column with no spread is
    /// only centered.
    fn fit(name: &str, values: &[f64]) -> Self {
        let binary = values.iter().all(|&v| v == 0.0 || v == 1.0);
        if binary {
            return Self {
                name: name.to_string(),
                mean: 0.0,
                std: 1.0,
            };
        }
        let std = sample_std_dev(values)
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(1.0);
        Self {
            name: name.to_string(),
            mean: mean(values).unwrap_or(0.0),
            std,
        }
    }

    fn apply(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Everything needed to rebuild the design matrix at arbitrary dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
    /// First training date, `t = 0`
    pub start: NaiveDate,
    /// Days between the first and last training date, `t = 1` at the last
    pub t_scale_days: f64,
    /// Changepoint locations in scaled time
    pub changepoints: Vec<f64>,
    pub seasonalities: Vec<SeasonalComponent>,
    pub holidays: Vec<HolidayColumn>,
    pub regressors: Vec<RegressorScaling>,
}

/// Fitted coefficients in scaled units, grouped by block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// Intercept, base slope, then one slope change per changepoint
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub holidays: Vec<f64>,
    pub regressors: Vec<f64>,
}

struct Design {
    t: Vec<f64>,
    trend: DesignMatrix,
    seasonal: DesignMatrix,
    holidays: DesignMatrix,
    regressors: DesignMatrix,
}

struct Penalties {
    trend: Vec<f64>,
    seasonal: Vec<f64>,
    holidays: Vec<f64>,
    regressors: Vec<f64>,
}

struct Fit {
    trend: DVector<f64>,
    seasonal: DVector<f64>,
    holidays: DVector<f64>,
    regressors: DVector<f64>,
    iterations: usize,
}

/// Scaled-unit contributions of each block at every row of a design
struct Contributions {
    trend: DVector<f64>,
    seasonal: Vec<(SeasonalKind, DVector<f64>)>,
    holidays: DVector<f64>,
    regressors: DVector<f64>,
}

fn days_since_epoch(date: NaiveDate) -> f64 {
    (date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE) as f64
}

fn concat(blocks: &[&[f64]]) -> Vec<f64> {
    blocks.iter().flat_map(|b| b.iter().copied()).collect()
}

fn split(vector: &DVector<f64>, offset: usize, len: usize) -> DVector<f64> {
    vector.rows(offset, len).into_owned()
}

fn model_error(context: &str, detail: impl std::fmt::Display) -> ForecastError {
    ForecastError::ModelError(format!("{}: {}", context, detail))
}

impl ColumnLayout {
    fn from_history(
        series: &DailySeries,
        settings: &ModelSettings,
        holidays: &[Holiday],
    ) -> Result<Self> {
        let (start, end) = match (series.first_date(), series.last_date()) {
            (Some(start), Some(end)) if series.len() >= 2 => (start, end),
            _ => {
                return Err(ForecastError::InsufficientData {
                    needed: 2,
                    got: series.len(),
                })
            }
        };
        let t_scale_days = end.signed_duration_since(start).num_days() as f64;

        let mut layout = Self {
            start,
            t_scale_days,
            changepoints: Vec::new(),
            seasonalities: Self::seasonalities(settings),
            holidays: Self::holiday_columns(holidays),
            regressors: Vec::new(),
        };
        let t = layout.scaled_time(&series.dates());
        layout.changepoints =
            select_changepoints(&t, settings.n_changepoints, settings.changepoint_range);
        layout.regressors = series
            .regressor_names()
            .iter()
            .enumerate()
            .map(|(i, name)| RegressorScaling::fit(name, &series.regressor_column(i)))
            .collect();
        Ok(layout)
    }

    fn seasonalities(settings: &ModelSettings) -> Vec<SeasonalComponent> {
        let mut components = Vec::new();
        if settings.yearly_seasonality {
            components.push(SeasonalComponent {
                kind: SeasonalKind::Yearly,
                period: 365.25,
                order: 10,
            });
        }
        if settings.weekly_seasonality {
            components.push(SeasonalComponent {
                kind: SeasonalKind::Weekly,
                period: 7.0,
                order: 3,
            });
        }
        if settings.daily_seasonality {
            components.push(SeasonalComponent {
                kind: SeasonalKind::Daily,
                period: 1.0,
                order: 4,
            });
        }
        components
    }

    fn holiday_columns(holidays: &[Holiday]) -> Vec<HolidayColumn> {
        let mut columns: BTreeMap<(String, i32), Vec<NaiveDate>> = BTreeMap::new();
        for holiday in holidays {
            for offset in holiday.lower_window..=holiday.upper_window {
                if let Some(date) = holiday
                    .date
                    .checked_add_signed(Duration::days(i64::from(offset)))
                {
                    columns
                        .entry((holiday.label.clone(), offset))
                        .or_default()
                        .push(date);
                }
            }
        }
        columns
            .into_iter()
            .map(|((label, offset), mut dates)| {
                dates.sort();
                dates.dedup();
                HolidayColumn {
                    label,
                    offset,
                    dates,
                }
            })
            .collect()
    }

    fn scaled_time(&self, dates: &[NaiveDate]) -> Vec<f64> {
        dates
            .iter()
            .map(|d| d.signed_duration_since(self.start).num_days() as f64 / self.t_scale_days)
            .collect()
    }

    fn trend_width(&self) -> usize {
        2 + self.changepoints.len()
    }

    fn seasonal_width(&self) -> usize {
        self.seasonalities.iter().map(SeasonalComponent::width).sum()
    }

    fn design(&self, dates: &[NaiveDate], regressors: &[Vec<f64>]) -> Result<Design> {
        let n = dates.len();
        if let Some(row) = regressors.iter().find(|r| r.len() != self.regressors.len()) {
            return Err(ForecastError::DataError(format!(
                "Expected {} regressor values per row, got {}",
                self.regressors.len(),
                row.len()
            )));
        }

        let t = self.scaled_time(dates);
        let hinges = changepoint_features(&t, &self.changepoints);
        let trend = DesignMatrix::from_fn(n, self.trend_width(), |i, j| match j {
            0 => 1.0,
            1 => t[i],
            _ => hinges[(i, j - 2)],
        });

        let days: Vec<f64> = dates.iter().map(|d| days_since_epoch(*d)).collect();
        let blocks = self
            .seasonalities
            .iter()
            .map(|s| fourier_features(&days, s.period, s.order))
            .collect::<forecast_math::Result<Vec<_>>>()?;
        let seasonal = hstack(&blocks.iter().collect::<Vec<_>>(), n)?;

        let holidays = DesignMatrix::from_fn(n, self.holidays.len(), |i, j| {
            if self.holidays[j].dates.binary_search(&dates[i]).is_ok() {
                1.0
            } else {
                0.0
            }
        });

        let regressors = DesignMatrix::from_fn(n, self.regressors.len(), |i, j| {
            self.regressors[j].apply(regressors[i][j])
        });

        Ok(Design {
            t,
            trend,
            seasonal,
            holidays,
            regressors,
        })
    }

    fn penalties(&self, params: &Hyperparameters, noise_variance: f64) -> Penalties {
        let per_scale = |scale: f64| noise_variance / (scale * scale);
        let mut trend = vec![per_scale(TREND_PRIOR_SCALE); 2];
        trend.extend(
            std::iter::repeat(per_scale(params.changepoint_prior_scale))
                .take(self.changepoints.len()),
        );
        Penalties {
            trend,
            seasonal: vec![per_scale(params.seasonality_prior_scale); self.seasonal_width()],
            holidays: vec![per_scale(params.holidays_prior_scale); self.holidays.len()],
            regressors: vec![per_scale(params.holidays_prior_scale); self.regressors.len()],
        }
    }
}

impl Penalties {
    /// `Σ λ_j β_j²` over every block
    fn cost(&self, fit: &Fit) -> f64 {
        let block = |penalties: &[f64], beta: &DVector<f64>| -> f64 {
            penalties.iter().zip(beta.iter()).map(|(p, b)| p * b * b).sum()
        };
        block(&self.trend, &fit.trend)
            + block(&self.seasonal, &fit.seasonal)
            + block(&self.holidays, &fit.holidays)
            + block(&self.regressors, &fit.regressors)
    }
}

impl Design {
    fn rows(&self) -> usize {
        self.t.len()
    }

    fn fitted(&self, fit: &Fit, mode: SeasonalityMode) -> DVector<f64> {
        let trend = &self.trend * &fit.trend;
        let effects = &self.seasonal * &fit.seasonal + &self.holidays * &fit.holidays;
        let extra = &self.regressors * &fit.regressors;
        match mode {
            SeasonalityMode::Additive => trend + effects + extra,
            SeasonalityMode::Multiplicative => {
                trend.component_mul(&effects.add_scalar(1.0)) + extra
            }
        }
    }

    fn fit_additive(&self, y: &DVector<f64>, penalties: &Penalties) -> Result<Fit> {
        let x = hstack(
            &[&self.trend, &self.seasonal, &self.holidays, &self.regressors],
            self.rows(),
        )?;
        let lambda = concat(&[
            &penalties.trend,
            &penalties.seasonal,
            &penalties.holidays,
            &penalties.regressors,
        ]);
        let beta = ridge_solve(&x, y, &lambda)?;

        let (kt, ks, kh, kr) = self.widths();
        Ok(Fit {
            trend: split(&beta, 0, kt),
            seasonal: split(&beta, kt, ks),
            holidays: split(&beta, kt + ks, kh),
            regressors: split(&beta, kt + ks + kh, kr),
            iterations: 0,
        })
    }

    /// Alternating least squares on the bilinear multiplicative model:
    /// fix the trend and solve for the effects, then fix the effects and
    /// solve for the trend. Each step minimizes the penalized objective
    /// exactly, so the objective never increases and the iterate at the cap
    /// is still usable.
    fn fit_multiplicative(
        &self,
        y: &DVector<f64>,
        penalties: &Penalties,
        settings: &ModelSettings,
    ) -> Result<Fit> {
        let n = self.rows();
        let (kt, ks, kh, kr) = self.widths();
        let effects = hstack(&[&self.seasonal, &self.holidays], n)?;
        let effect_penalties = concat(&[&penalties.seasonal, &penalties.holidays]);

        let trend_only = hstack(&[&self.trend, &self.regressors], n)?;
        let trend_penalties = concat(&[&penalties.trend, &penalties.regressors]);
        let initial = ridge_solve(&trend_only, y, &trend_penalties)?;

        let mut fit = Fit {
            trend: split(&initial, 0, kt),
            seasonal: DVector::zeros(ks),
            holidays: DVector::zeros(kh),
            regressors: split(&initial, kt, kr),
            iterations: 0,
        };
        if ks + kh == 0 {
            return Ok(fit);
        }

        let mut previous =
            residual_sum_of_squares(&trend_only, y, &initial) + penalties.cost(&fit);

        for iteration in 1..=settings.max_iterations {
            let trend = &self.trend * &fit.trend;
            let step_a = hstack(&[&scale_rows(&effects, trend.as_slice()), &self.regressors], n)?;
            let beta = ridge_solve(
                &step_a,
                &(y - &trend),
                &concat(&[&effect_penalties, &penalties.regressors]),
            )?;
            fit.seasonal = split(&beta, 0, ks);
            fit.holidays = split(&beta, ks, kh);
            fit.regressors = split(&beta, ks + kh, kr);

            let weights = (&effects * split(&beta, 0, ks + kh)).add_scalar(1.0);
            let step_b = hstack(
                &[&scale_rows(&self.trend, weights.as_slice()), &self.regressors],
                n,
            )?;
            let theta = ridge_solve(&step_b, y, &trend_penalties)?;
            fit.trend = split(&theta, 0, kt);
            fit.regressors = split(&theta, kt, kr);
            fit.iterations = iteration;

            // `step_b * theta` is the full multiplicative fit at this iterate.
            let current = residual_sum_of_squares(&step_b, y, &theta) + penalties.cost(&fit);
            if !current.is_finite() {
                return Err(model_error(
                    "Multiplicative fit diverged",
                    format!("non-finite objective at iteration {}", iteration),
                ));
            }
            if (previous - current).abs() <= settings.tolerance * previous.abs().max(1e-12) {
                return Ok(fit);
            }
            previous = current;
        }

        warn!(
            iterations = settings.max_iterations,
            objective = previous,
            "Multiplicative fit reached the iteration cap, keeping the last iterate"
        );
        Ok(fit)
    }

    fn widths(&self) -> (usize, usize, usize, usize) {
        (
            self.trend.ncols(),
            self.seasonal.ncols(),
            self.holidays.ncols(),
            self.regressors.ncols(),
        )
    }
}

/// Untrained seasonal-trend model: hyperparameters, structure and holidays
#[derive(Debug, Clone)]
pub struct SeasonalTrendModel {
    name: String,
    params: Hyperparameters,
    settings: ModelSettings,
    holidays: Vec<Holiday>,
}

impl SeasonalTrendModel {
    pub fn new(params: Hyperparameters, settings: ModelSettings) -> Result<Self> {
        params.validate()?;
        settings.validate()?;
        Ok(Self {
            name: "SeasonalTrend".to_string(),
            params,
            settings,
            holidays: Vec::new(),
        })
    }

    /// Add holiday indicator columns to the model
    pub fn with_holidays(mut self, holidays: Vec<Holiday>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn fit(&self, data: &DailySeries) -> Result<FittedSeasonalTrend> {
        let layout = ColumnLayout::from_history(data, &self.settings, &self.holidays)?;
        let frame = ForecastFrame::from_series(data);
        let design = layout.design(frame.dates(), frame.regressors())?;

        let values = data.values();
        let y_scale = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let y = DVector::from_iterator(values.len(), values.iter().map(|v| v / y_scale));
        let n = y.len() as f64;

        let solve = |noise_variance: f64| -> Result<(Fit, f64)> {
            let penalties = layout.penalties(&self.params, noise_variance);
            let fit = match self.params.seasonality_mode {
                SeasonalityMode::Additive => design.fit_additive(&y, &penalties)?,
                SeasonalityMode::Multiplicative => {
                    design.fit_multiplicative(&y, &penalties, &self.settings)?
                }
            };
            let rss = (&y - design.fitted(&fit, self.params.seasonality_mode)).norm_squared();
            Ok((fit, rss))
        };

        let (_, first_rss) = solve(INITIAL_NOISE_VARIANCE)?;
        let noise_variance = (first_rss / n).max(MIN_NOISE_VARIANCE);
        let (fit, rss) = solve(noise_variance)?;
        let sigma = (rss / n).sqrt();
        if !sigma.is_finite() {
            return Err(model_error("Fit produced a non-finite residual scale", sigma));
        }

        let deltas = &fit.trend.as_slice()[2..];
        let mean_abs_delta = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64
        };

        debug!(
            params = %self.params,
            rows = values.len(),
            changepoints = layout.changepoints.len(),
            iterations = fit.iterations,
            sigma,
            "Fitted seasonal-trend model"
        );

        Ok(FittedSeasonalTrend {
            name: self.name.clone(),
            params: self.params,
            settings: self.settings.clone(),
            regressor_names: data.regressor_names().to_vec(),
            layout,
            coefficients: Coefficients {
                trend: fit.trend.as_slice().to_vec(),
                seasonal: fit.seasonal.as_slice().to_vec(),
                holidays: fit.holidays.as_slice().to_vec(),
                regressors: fit.regressors.as_slice().to_vec(),
            },
            y_scale,
            sigma,
            mean_abs_delta,
            iterations: fit.iterations,
            history_dates: data.dates(),
        })
    }
}

impl ForecastModel for SeasonalTrendModel {
    type Trained = FittedSeasonalTrend;

    fn train(&self, data: &DailySeries) -> Result<Self::Trained> {
        self.fit(data)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Trained seasonal-trend model; immutable once fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSeasonalTrend {
    name: String,
    params: Hyperparameters,
    settings: ModelSettings,
    regressor_names: Vec<String>,
    layout: ColumnLayout,
    coefficients: Coefficients,
    /// Values were divided by this before fitting
    y_scale: f64,
    /// Residual standard deviation in scaled units
    sigma: f64,
    /// Mean absolute slope change, drives trend uncertainty beyond the history
    mean_abs_delta: f64,
    iterations: usize,
    history_dates: Vec<NaiveDate>,
}

impl FittedSeasonalTrend {
    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Training dates, in order
    pub fn history_dates(&self) -> &[NaiveDate] {
        &self.history_dates
    }

    pub fn last_history_date(&self) -> Option<NaiveDate> {
        self.history_dates.last().copied()
    }

    /// Residual standard deviation in the units of the series
    pub fn residual_std(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// Alternating least-squares iterations used (0 in additive mode)
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Check that coefficient counts agree with the column layout, as they
    /// must after deserializing from an external source
    pub fn check_consistency(&self) -> Result<()> {
        let layout = &self.layout;
        let expected = [
            ("trend", layout.trend_width(), self.coefficients.trend.len()),
            ("seasonal", layout.seasonal_width(), self.coefficients.seasonal.len()),
            ("holiday", layout.holidays.len(), self.coefficients.holidays.len()),
            ("regressor", layout.regressors.len(), self.coefficients.regressors.len()),
            ("regressor name", layout.regressors.len(), self.regressor_names.len()),
        ];
        for (block, want, got) in expected {
            if want != got {
                return Err(ForecastError::ModelError(format!(
                    "Model has {} {} coefficients but its layout needs {}",
                    got, block, want
                )));
            }
        }
        if !(layout.t_scale_days > 0.0 && self.y_scale > 0.0) {
            return Err(ForecastError::ModelError(
                "Model scales must be positive".to_string(),
            ));
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0 && self.mean_abs_delta.is_finite()) {
            return Err(ForecastError::ModelError(
                "Model noise parameters must be finite".to_string(),
            ));
        }
        let all = [
            &self.coefficients.trend,
            &self.coefficients.seasonal,
            &self.coefficients.holidays,
            &self.coefficients.regressors,
        ];
        if all.iter().flat_map(|c| c.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelError(
                "Model coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }

    fn contributions(&self, design: &Design) -> Contributions {
        let vector = |values: &[f64]| DVector::from_column_slice(values);
        let seasonal_beta = vector(&self.coefficients.seasonal);

        let mut offset = 0;
        let seasonal = self
            .layout
            .seasonalities
            .iter()
            .map(|component| {
                let width = component.width();
                let values = design.seasonal.columns(offset, width)
                    * seasonal_beta.rows(offset, width);
                offset += width;
                (component.kind, values)
            })
            .collect();

        Contributions {
            trend: &design.trend * vector(&self.coefficients.trend),
            seasonal,
            holidays: &design.holidays * vector(&self.coefficients.holidays),
            regressors: &design.regressors * vector(&self.coefficients.regressors),
        }
    }
}

impl TrainedForecastModel for FittedSeasonalTrend {
    fn predict(&self, frame: &ForecastFrame) -> Result<Vec<ForecastRow>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let design = self.layout.design(frame.dates(), frame.regressors())?;
        let parts = self.contributions(&design);
        let z = normal_quantile(self.settings.interval_width)?;
        let changepoint_rate = self.layout.changepoints.len() as f64;
        let scale = self.y_scale;

        let rows = frame
            .dates()
            .iter()
            .enumerate()
            .map(|(i, &date)| {
                let trend = parts.trend[i];
                let mut seasonal = [0.0; 3];
                for (kind, values) in &parts.seasonal {
                    let slot = match kind {
                        SeasonalKind::Yearly => 0,
                        SeasonalKind::Weekly => 1,
                        SeasonalKind::Daily => 2,
                    };
                    seasonal[slot] += values[i];
                }
                let holidays = parts.holidays[i];

                // Multiplicative effects are relative to the trend.
                let (factor, amplifier) = match self.params.seasonality_mode {
                    SeasonalityMode::Additive => (1.0, 1.0),
                    SeasonalityMode::Multiplicative => (
                        trend,
                        (1.0 + seasonal.iter().sum::<f64>() + holidays).abs(),
                    ),
                };
                let [yearly, weekly, daily] = seasonal.map(|s| s * factor);
                let holidays = holidays * factor;
                let extra = parts.regressors[i];
                let yhat = trend + yearly + weekly + daily + holidays + extra;

                let beyond = (design.t[i] - 1.0).max(0.0);
                let trend_sd = self.mean_abs_delta
                    * (2.0 * changepoint_rate * beyond.powi(3) / 3.0).sqrt()
                    * amplifier;
                let half_width = z * (self.sigma.powi(2) + trend_sd.powi(2)).sqrt() * scale;

                ForecastRow {
                    date,
                    yhat: yhat * scale,
                    yhat_lower: yhat * scale - half_width,
                    yhat_upper: yhat * scale + half_width,
                    trend: trend * scale,
                    yearly: yearly * scale,
                    weekly: weekly * scale,
                    daily: daily * scale,
                    holidays: holidays * scale,
                    extra_regressors: extra * scale,
                }
            })
            .collect();

        Ok(rows)
    }

    fn regressor_names(&self) -> &[String] {
        &self.regressor_names
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DailyRecord;
    use crate::metrics::mape;
    use approx::assert_relative_eq;

    const WEEKLY: [f64; 7] = [0.0, 2.0, 4.0, 6.0, 8.0, 15.0, 12.0];

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 3).unwrap()
    }

    /// Deterministic wiggle standing in for noise
    fn wiggle(i: usize) -> f64 {
        ((i * 7919) % 13) as f64 * 0.1
    }

    fn additive_series(days: usize) -> DailySeries {
        let values: Vec<f64> = (0..days)
            .map(|i| 100.0 + 0.1 * i as f64 + WEEKLY[i % 7] + wiggle(i))
            .collect();
        DailySeries::from_values(start(), &values).unwrap()
    }

    fn multiplicative_series(days: usize) -> DailySeries {
        let values: Vec<f64> = (0..days)
            .map(|i| (100.0 + 0.2 * i as f64) * (1.0 + WEEKLY[i % 7] / 50.0) + wiggle(i))
            .collect();
        DailySeries::from_values(start(), &values).unwrap()
    }

    fn model(mode: SeasonalityMode) -> SeasonalTrendModel {
        let params = Hyperparameters {
            seasonality_mode: mode,
            ..Hyperparameters::default()
        };
        SeasonalTrendModel::new(params, ModelSettings::default()).unwrap()
    }

    fn in_sample_mape(fitted: &FittedSeasonalTrend, series: &DailySeries) -> f64 {
        let rows = fitted.predict(&ForecastFrame::from_series(series)).unwrap();
        let predicted: Vec<f64> = rows.iter().map(|r| r.yhat).collect();
        mape(&series.values(), &predicted).unwrap()
    }

    #[test]
    fn additive_fit_tracks_weekly_pattern() {
        let series = additive_series(200);
        let fitted = model(SeasonalityMode::Additive).fit(&series).unwrap();
        assert!(in_sample_mape(&fitted, &series) < 2.0);
        assert_eq!(fitted.iterations(), 0);
        assert!(fitted.check_consistency().is_ok());
    }

    #[test]
    fn multiplicative_fit_converges() {
        let series = multiplicative_series(200);
        let fitted = model(SeasonalityMode::Multiplicative).fit(&series).unwrap();
        assert!(fitted.iterations() >= 1);
        assert!(in_sample_mape(&fitted, &series) < 2.0);
    }

    #[test]
    fn iteration_cap_keeps_last_iterate() {
        let series = multiplicative_series(200);
        let settings = ModelSettings {
            max_iterations: 2,
            ..ModelSettings::default()
        };
        let params = Hyperparameters {
            seasonality_mode: SeasonalityMode::Multiplicative,
            ..Hyperparameters::default()
        };
        let capped = SeasonalTrendModel::new(params, settings)
            .unwrap()
            .fit(&series)
            .unwrap();
        assert!(capped.iterations() <= 2);
        assert!(capped.check_consistency().is_ok());
        assert!(in_sample_mape(&capped, &series) < 10.0);
    }

    #[test]
    fn components_sum_to_point_forecast() {
        for mode in [SeasonalityMode::Additive, SeasonalityMode::Multiplicative] {
            let series = multiplicative_series(120);
            let fitted = model(mode).fit(&series).unwrap();
            let future: Vec<NaiveDate> = start().iter_days().skip(110).take(30).collect();
            for row in fitted.predict(&ForecastFrame::from_dates(future)).unwrap() {
                let sum = row.trend
                    + row.yearly
                    + row.weekly
                    + row.daily
                    + row.holidays
                    + row.extra_regressors;
                assert_relative_eq!(sum, row.yhat, max_relative = 1e-9);
                assert!(row.yhat_lower <= row.yhat && row.yhat <= row.yhat_upper);
            }
        }
    }

    #[test]
    fn intervals_widen_beyond_history() {
        let series = additive_series(150);
        let fitted = model(SeasonalityMode::Additive).fit(&series).unwrap();
        let last = series.last_date().unwrap();
        let far = last + Duration::days(120);

        let rows = fitted
            .predict(&ForecastFrame::from_dates(vec![last, far]))
            .unwrap();
        assert!(rows[1].half_width() >= rows[0].half_width());
        assert!(rows[0].half_width() > 0.0);
    }

    #[test]
    fn regressor_effect_is_recovered() {
        let records: Vec<DailyRecord> = start()
            .iter_days()
            .take(140)
            .enumerate()
            .map(|(i, date)| {
                let promo = if i % 5 == 0 { 1.0 } else { 0.0 };
                DailyRecord {
                    date,
                    value: 50.0 + WEEKLY[i % 7] + 20.0 * promo + wiggle(i),
                    regressors: vec![promo],
                }
            })
            .collect();
        let series = DailySeries::new(vec!["promo".to_string()], records).unwrap();
        let fitted = model(SeasonalityMode::Additive).fit(&series).unwrap();
        assert_eq!(fitted.regressor_names(), &["promo".to_string()]);

        let day = series.last_date().unwrap() + Duration::days(1);
        let frame =
            ForecastFrame::new(vec![day, day], vec![vec![1.0], vec![0.0]]).unwrap();
        let rows = fitted.predict(&frame).unwrap();
        assert_relative_eq!(rows[0].yhat - rows[1].yhat, 20.0, epsilon = 1.5);

        let bad = ForecastFrame::from_dates(vec![day]);
        assert!(fitted.predict(&bad).is_err());
    }

    #[test]
    fn holiday_windows_become_indicator_columns() {
        let christmas = NaiveDate::from_ymd_opt(2022, 12, 25).unwrap();
        let holidays = vec![
            Holiday::new(christmas, "christmas").with_windows(-1, 1),
            Holiday::new(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap(), "christmas"),
        ];
        let columns = ColumnLayout::holiday_columns(&holidays);
        let offsets: Vec<i32> = columns.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![-1, 0, 1]);
        assert_eq!(columns[1].dates.len(), 2);

        let series = additive_series(400);
        let fitted = model(SeasonalityMode::Additive)
            .with_holidays(holidays)
            .fit(&series)
            .unwrap();
        assert_eq!(fitted.layout().holidays.len(), 3);
        assert!(fitted.check_consistency().is_ok());
    }

    #[test]
    fn serde_round_trip_predicts_identically() {
        let series = multiplicative_series(90);
        let fitted = model(SeasonalityMode::Multiplicative).fit(&series).unwrap();
        let json = serde_json::to_string(&fitted).unwrap();
        let restored: FittedSeasonalTrend = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, fitted);

        let frame = ForecastFrame::from_dates(start().iter_days().take(100).collect());
        assert_eq!(restored.predict(&frame).unwrap(), fitted.predict(&frame).unwrap());
    }

    #[test]
    fn inconsistent_coefficients_are_detected() {
        let series = additive_series(60);
        let mut fitted = model(SeasonalityMode::Additive).fit(&series).unwrap();
        fitted.coefficients.trend.pop();
        assert!(fitted.check_consistency().is_err());
    }

    #[test]
    fn single_row_is_insufficient() {
        let series = DailySeries::from_values(start(), &[3.0]).unwrap();
        let err = model(SeasonalityMode::Additive).fit(&series).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { needed: 2, got: 1 }));
    }

    #[test]
    fn all_zero_series_fits_flat() {
        let series = DailySeries::from_values(start(), &[0.0; 30]).unwrap();
        let fitted = model(SeasonalityMode::Additive).fit(&series).unwrap();
        let rows = fitted
            .predict(&ForecastFrame::from_dates(series.dates()))
            .unwrap();
        assert!(rows.iter().all(|r| r.yhat.abs() < 1e-9));
    }
}
