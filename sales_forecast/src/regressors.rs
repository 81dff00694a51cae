//! Historical regressor lookups shared by training and serving

use crate::data::DailySeries;
use crate::error::{ForecastError, Result};
use crate::models::ForecastFrame;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Date-indexed covariate values taken from the cleaned training partition
///
/// Dates that are not in the table resolve to zero for every regressor:
/// no promotion or event is assumed on days the table does not know about.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressorTable {
    names: Vec<String>,
    rows: BTreeMap<NaiveDate, Vec<f64>>,
}

impl RegressorTable {
    /// Build the table from a daily series
    pub fn from_series(series: &DailySeries) -> Self {
        let rows = series
            .records()
            .iter()
            .map(|r| (r.date, r.regressors.clone()))
            .collect();
        Self {
            names: series.regressor_names().to_vec(),
            rows,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.rows.contains_key(&date)
    }

    /// Regressor values for `date`, zeros when the date is unknown
    pub fn values_for(&self, date: NaiveDate) -> Vec<f64> {
        self.rows
            .get(&date)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.names.len()])
    }

    /// Build a prediction frame for `dates`, ordering columns as the model
    /// expects them.
    ///
    /// Returns the frame and the number of dates that fell back to zeros.
    pub fn frame_for(
        &self,
        dates: Vec<NaiveDate>,
        model_regressors: &[String],
    ) -> Result<(ForecastFrame, usize)> {
        let mut columns = Vec::with_capacity(model_regressors.len());
        for name in model_regressors {
            let idx = self.names.iter().position(|n| n == name).ok_or_else(|| {
                ForecastError::DataError(format!(
                    "Regressor '{}' used by the model is missing from the history table",
                    name
                ))
            })?;
            columns.push(idx);
        }

        let mut defaulted = 0;
        let rows = dates
            .iter()
            .map(|date| match self.rows.get(date) {
                Some(values) => columns.iter().map(|&i| values[i]).collect(),
                None => {
                    if !columns.is_empty() {
                        defaulted += 1;
                    }
                    vec![0.0; columns.len()]
                }
            })
            .collect();

        let frame = ForecastFrame::new(dates, rows)?;
        Ok((frame, defaulted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DailyRecord;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn table() -> RegressorTable {
        let records = vec![
            DailyRecord { date: date(1), value: 10.0, regressors: vec![1.0, 5.0] },
            DailyRecord { date: date(2), value: 12.0, regressors: vec![0.0, 7.0] },
        ];
        let series =
            DailySeries::new(vec!["promo".to_string(), "price".to_string()], records).unwrap();
        RegressorTable::from_series(&series)
    }

    #[test]
    fn unknown_dates_default_to_zero() {
        let table = table();
        assert_eq!(table.values_for(date(2)), vec![0.0, 7.0]);
        assert_eq!(table.values_for(date(9)), vec![0.0, 0.0]);
    }

    #[test]
    fn frame_reorders_columns_and_counts_defaults() {
        let table = table();
        let (frame, defaulted) = table
            .frame_for(vec![date(1), date(2), date(3)], &["price".to_string()])
            .unwrap();

        assert_eq!(defaulted, 1);
        assert_eq!(frame.regressors(), &[vec![5.0], vec![7.0], vec![0.0]]);
    }

    #[test]
    fn nothing_is_defaulted_without_model_regressors() {
        let (frame, defaulted) = table().frame_for(vec![date(1), date(9)], &[]).unwrap();
        assert_eq!(defaulted, 0);
        assert_eq!(frame.len(), 2);

        let (_, defaulted) = table()
            .frame_for(vec![date(1), date(2)], &["promo".to_string()])
            .unwrap();
        assert_eq!(defaulted, 0);
    }

    #[test]
    fn frame_requires_known_regressors() {
        let table = table();
        assert!(table.frame_for(vec![date(1)], &["weather".to_string()]).is_err());
    }
}
