//! Holiday calendars
//!
//! Holidays enter the model as indicator columns, one per holiday label and
//! day offset inside its window.

use crate::data::parse_date;
use crate::error::{ForecastError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// One holiday occurrence with the days around it that share its effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub label: String,
    /// Days before the holiday, as a non-positive offset
    pub lower_window: i32,
    /// Days after the holiday, as a non-negative offset
    pub upper_window: i32,
}

impl Holiday {
    pub fn new(date: NaiveDate, label: &str) -> Self {
        Self {
            date,
            label: label.to_string(),
            lower_window: 0,
            upper_window: 0,
        }
    }

    pub fn with_windows(mut self, lower: i32, upper: i32) -> Self {
        self.lower_window = lower;
        self.upper_window = upper;
        self
    }

    /// Check the window brackets the holiday itself
    pub fn validate(&self) -> Result<()> {
        if self.lower_window > 0 || self.upper_window < 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "Holiday '{}' on {} has window [{}, {}]; lower must be <= 0 and upper >= 0",
                self.label, self.date, self.lower_window, self.upper_window
            )));
        }
        Ok(())
    }
}

/// Source of holidays for a range of years
pub trait HolidayCalendar {
    fn holidays(&self, years: RangeInclusive<i32>) -> Result<Vec<Holiday>>;
}

#[derive(Debug, Deserialize)]
struct HolidayRow {
    ds: String,
    holiday: String,
    #[serde(default)]
    lower_window: i32,
    #[serde(default)]
    upper_window: i32,
}

/// Calendar backed by a CSV with `ds,holiday,lower_window,upper_window`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvHolidayCalendar {
    holidays: Vec<Holiday>,
}

impl CsvHolidayCalendar {
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut holidays = Vec::new();
        for row in reader.deserialize() {
            let row: HolidayRow = row?;
            let holiday = Holiday {
                date: parse_date(&row.ds)?,
                label: row.holiday,
                lower_window: row.lower_window,
                upper_window: row.upper_window,
            };
            holiday.validate()?;
            holidays.push(holiday);
        }
        holidays.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)));
        Ok(Self { holidays })
    }

    pub fn from_holidays(mut holidays: Vec<Holiday>) -> Result<Self> {
        for holiday in &holidays {
            holiday.validate()?;
        }
        holidays.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)));
        Ok(Self { holidays })
    }

    pub fn len(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holidays.is_empty()
    }
}

impl HolidayCalendar for CsvHolidayCalendar {
    fn holidays(&self, years: RangeInclusive<i32>) -> Result<Vec<Holiday>> {
        Ok(self
            .holidays
            .iter()
            .filter(|h| years.contains(&h.date.year()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_and_filters_by_year() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ds,holiday,lower_window,upper_window").unwrap();
        writeln!(file, "2023-12-25,christmas,-1,1").unwrap();
        writeln!(file, "2024-12-25,christmas,-1,1").unwrap();
        writeln!(file, "2024-01-01,new_year,0,0").unwrap();

        let calendar = CsvHolidayCalendar::from_csv(file.path()).unwrap();
        assert_eq!(calendar.len(), 3);

        let only_2024 = calendar.holidays(2024..=2024).unwrap();
        assert_eq!(only_2024.len(), 2);
        assert_eq!(only_2024[0].label, "new_year");
        assert_eq!(only_2024[1].lower_window, -1);
    }

    #[test]
    fn rejects_inverted_windows() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let holiday = Holiday::new(date, "labour_day").with_windows(1, 0);
        assert!(CsvHolidayCalendar::from_holidays(vec![holiday]).is_err());
    }
}
