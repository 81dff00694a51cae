use chrono::NaiveDate;
use sales_forecast::config::{quick_grid, CvSettings, OutlierConfig, SearchConfig};
use sales_forecast::data::{aggregate_daily, split_train_test, DailySeries};
use sales_forecast::models::{
    ForecastFrame, Hyperparameters, ModelSettings, SeasonalTrendModel, SeasonalityMode,
    TrainedForecastModel,
};
use sales_forecast::outliers::{clean_partition, OutlierBoundary};
use sales_forecast::synthetic::SyntheticSales;
use sales_forecast::tuning::{search, GridSearch};
use sales_forecast::validation::{cross_validate, Deadline};
use sales_forecast::{ErrorKind, ForecastError};

fn synthetic_series(days: usize) -> DailySeries {
    let transactions = SyntheticSales::default().with_days(days).generate().unwrap();
    aggregate_daily(&transactions, &[]).unwrap()
}

#[test]
fn test_outlier_boundary_uses_training_rows_only() {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut values: Vec<f64> = (0..90).map(|i| 50.0 + (i % 5) as f64).collect();
    // Extreme values only in the trailing test window
    values.extend([5000.0, 52.0, 51.0, 9000.0, 50.0]);
    let series = DailySeries::from_values(start, &values).unwrap();
    let partition = split_train_test(&series, 5).unwrap();

    let config = OutlierConfig { z_threshold: 2.7 };
    let clean = clean_partition(&partition, &config).unwrap();
    let from_train = OutlierBoundary::fit(&partition.train, 2.7).unwrap();

    assert_eq!(clean.boundary, from_train);
    assert_eq!(clean.train.len(), 90);
    assert_eq!(clean.test.values(), vec![52.0, 51.0, 50.0]);

    // The same boundary gives the same verdicts whichever partition it meets
    for value in [5000.0, 52.0] {
        assert_eq!(
            clean.boundary.is_outlier(value),
            from_train.is_outlier(value)
        );
    }
}

#[test]
fn test_cross_validation_scores_every_fold() {
    let series = synthetic_series(370);
    let model = SeasonalTrendModel::new(Hyperparameters::default(), ModelSettings::default())
        .unwrap();

    let outcome = cross_validate(
        &model,
        &series,
        &CvSettings::default(),
        &Deadline::unlimited(),
    )
    .unwrap();

    assert_eq!(outcome.folds.len(), 3);
    assert!(outcome.folds.iter().all(|f| f.test_rows == 30));
    assert!(outcome.folds.windows(2).all(|w| w[0].cutoff < w[1].cutoff));
    assert!(outcome.mean_mape.is_finite());
    assert!(outcome.mean_mape < 15.0, "CV MAPE {}", outcome.mean_mape);
}

#[test]
fn test_grid_search_selects_a_successful_candidate() {
    let series = synthetic_series(370);
    let config = SearchConfig {
        grid: quick_grid(),
        ..SearchConfig::default()
    };
    let report = GridSearch::new(config, ModelSettings::default())
        .run(&series)
        .unwrap();

    assert_eq!(report.tried(), 2);
    assert!(report.scores.iter().any(|s| s.params == report.best.params));
    assert!(report.scores.iter().all(|s| report.best.cv_mape <= s.cv_mape));
    assert!(report
        .failures
        .iter()
        .all(|f| f.params != report.best.params));
}

#[test]
fn test_default_grid_scores_multiplicative_candidates() {
    let series = synthetic_series(370);
    let config = SearchConfig {
        parallel: true,
        ..SearchConfig::default()
    };
    let report = GridSearch::new(config, ModelSettings::default())
        .run(&series)
        .unwrap();

    assert_eq!(report.tried(), 54);
    let multiplicative = report
        .scores
        .iter()
        .filter(|s| s.params.seasonality_mode == SeasonalityMode::Multiplicative)
        .count();
    assert_eq!(multiplicative, 27, "failures: {:?}", report.failures);
    assert!(report.failures.is_empty());
}

#[test]
fn test_search_excludes_candidates_that_cannot_be_built() {
    let series = synthetic_series(370);
    let config = SearchConfig {
        grid: quick_grid(),
        ..SearchConfig::default()
    };
    let report = search(&series, &config, |params| {
        if params.seasonality_mode == SeasonalityMode::Additive {
            return Err(ForecastError::InvalidParameter("additive disabled".to_string()));
        }
        SeasonalTrendModel::new(*params, ModelSettings::default())
    })
    .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.best.params.seasonality_mode, SeasonalityMode::Multiplicative);
}

#[test]
fn test_exhausted_budget_fails_every_candidate() {
    let series = synthetic_series(370);
    let config = SearchConfig {
        grid: quick_grid(),
        candidate_budget_secs: Some(1e-9),
        ..SearchConfig::default()
    };
    let err = GridSearch::new(config, ModelSettings::default())
        .run(&series)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllConfigurationsFailed);
}

#[test]
fn test_model_predicts_expected_weekly_shape() {
    let sales = SyntheticSales {
        noise_fraction: 0.0,
        ..SyntheticSales::default().with_days(200)
    };
    let series = aggregate_daily(&sales.generate().unwrap(), &[]).unwrap();
    let fitted = SeasonalTrendModel::new(Hyperparameters::default(), ModelSettings::default())
        .unwrap()
        .fit(&series)
        .unwrap();

    let future: Vec<NaiveDate> = series
        .last_date()
        .unwrap()
        .iter_days()
        .skip(1)
        .take(7)
        .collect();
    let rows = fitted.predict(&ForecastFrame::from_dates(future)).unwrap();
    for row in rows {
        let expected = sales.expected(row.date);
        assert!(
            (row.yhat - expected).abs() / expected < 0.05,
            "{}: predicted {} expected {}",
            row.date,
            row.yhat,
            expected
        );
    }
}
