//! Seeded synthetic sales data for demos and tests

use crate::data::Transaction;
use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use rand::prelude::*;
use rand::SeedableRng;
use rand_distr::Normal;
use std::path::Path;

/// Daily sales `level(t) * weekly[weekday] + noise`, split into transactions
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSales {
    pub start: NaiveDate,
    pub days: usize,
    /// Expected daily total on the first day
    pub base_level: f64,
    /// Change of the level per day
    pub trend_per_day: f64,
    /// Multipliers from Monday to Sunday
    pub weekly: [f64; 7],
    /// Noise standard deviation as a fraction of the expected value
    pub noise_fraction: f64,
    pub transactions_per_day: usize,
    pub seed: u64,
}

impl Default for SyntheticSales {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2022, 1, 3).unwrap_or_default(),
            days: 400,
            base_level: 200.0,
            trend_per_day: 0.1,
            weekly: [0.9, 0.85, 0.9, 1.0, 1.1, 1.3, 1.2],
            noise_fraction: 0.05,
            transactions_per_day: 4,
            seed: 42,
        }
    }
}

impl SyntheticSales {
    pub fn with_days(mut self, days: usize) -> Self {
        self.days = days;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Noise-free daily total for `date`
    pub fn expected(&self, date: NaiveDate) -> f64 {
        let day = date.signed_duration_since(self.start).num_days() as f64;
        let weekday = date.weekday().num_days_from_monday() as usize;
        (self.base_level + self.trend_per_day * day) * self.weekly[weekday]
    }

    pub fn generate(&self) -> Result<Vec<Transaction>> {
        if self.transactions_per_day == 0 {
            return Err(ForecastError::InvalidParameter(
                "transactions_per_day must be positive".to_string(),
            ));
        }
        let standard = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::InvalidParameter(format!("Noise distribution: {}", e)))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut transactions = Vec::with_capacity(self.days * self.transactions_per_day);
        for date in self.start.iter_days().take(self.days) {
            let expected = self.expected(date);
            let noise = standard.sample(&mut rng) * self.noise_fraction * expected;
            let total = (expected + noise).max(0.0);
            let share = total / self.transactions_per_day as f64;
            for _ in 0..self.transactions_per_day {
                transactions.push(Transaction {
                    date,
                    quantity: share,
                    regressors: Vec::new(),
                });
            }
        }
        Ok(transactions)
    }

    /// Write a raw transaction CSV with the given column names
    pub fn write_csv<P: AsRef<Path>>(
        &self,
        path: P,
        date_column: &str,
        quantity_column: &str,
    ) -> Result<usize> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let transactions = self.generate()?;
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([date_column, quantity_column])?;
        for t in &transactions {
            writer.write_record([t.date.format("%Y-%m-%d").to_string(), format!("{:.4}", t.quantity)])?;
        }
        writer.flush()?;
        Ok(transactions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::aggregate_daily;
    use approx::assert_relative_eq;

    #[test]
    fn same_seed_same_data() {
        let a = SyntheticSales::default().with_days(30).generate().unwrap();
        let b = SyntheticSales::default().with_days(30).generate().unwrap();
        let c = SyntheticSales::default().with_days(30).with_seed(7).generate().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn daily_totals_follow_expectation() {
        let sales = SyntheticSales {
            noise_fraction: 0.0,
            ..SyntheticSales::default().with_days(14)
        };
        let daily = aggregate_daily(&sales.generate().unwrap(), &[]).unwrap();
        assert_eq!(daily.len(), 14);
        for record in daily.records() {
            assert_relative_eq!(record.value, sales.expected(record.date), epsilon = 1e-9);
        }
        // 2022-01-08 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2022, 1, 8).unwrap();
        assert_relative_eq!(sales.expected(saturday), (200.0 + 0.5) * 1.3);
    }
}
