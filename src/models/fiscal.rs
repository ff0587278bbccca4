//! Fiscal year and fiscal month calendar.
//!
//! Fiscal months are organization-defined and need not match calendar
//! months; every period-bounded aggregation (slots, year-to-date sums,
//! rebate months) is computed against this calendar.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// One month of a fiscal year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalMonth {
    /// 1-based position within the fiscal year.
    pub month_index: u32,
    /// Display name, also the key of rebate month allocations.
    pub display_name: String,
    /// First day of the month (inclusive).
    pub start_at: NaiveDate,
    /// Last day of the month (inclusive).
    pub end_at: NaiveDate,
}

impl FiscalMonth {
    /// Number of days in the month.
    pub fn days(&self) -> i64 {
        (self.end_at - self.start_at).num_days() + 1
    }

    /// Returns true if the date falls within this month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_at && date <= self.end_at
    }
}

/// A fiscal year with its months.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYear {
    /// Unique identifier for the fiscal year.
    pub id: String,
    /// Display name, e.g. "2025/26".
    pub name: String,
    /// First day of the fiscal year (inclusive).
    pub start_at: NaiveDate,
    /// Last day of the fiscal year (inclusive).
    pub end_at: NaiveDate,
    /// Months ordered by `month_index`.
    pub months: Vec<FiscalMonth>,
}

impl FiscalYear {
    /// Builds a twelve-month fiscal year starting on `start_at`.
    ///
    /// Each month runs from the same day-of-month to the day before the next
    /// and is named after the calendar month it starts in.
    ///
    /// # Example
    ///
    /// ```
    /// use payroll_engine::models::FiscalYear;
    /// use chrono::NaiveDate;
    ///
    /// let fy = FiscalYear::monthly("fy25", "2025/26", NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()).unwrap();
    /// assert_eq!(fy.months.len(), 12);
    /// assert_eq!(fy.months[0].display_name, "July");
    /// assert_eq!(fy.end_at, NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());
    /// ```
    pub fn monthly(
        id: impl Into<String>,
        name: impl Into<String>,
        start_at: NaiveDate,
    ) -> EngineResult<Self> {
        let mut months = Vec::with_capacity(12);
        for index in 0..12u32 {
            let month_start = add_months(start_at, index)?;
            let month_end = add_months(start_at, index + 1)?
                .pred_opt()
                .ok_or_else(|| calendar_error(start_at))?;
            months.push(FiscalMonth {
                month_index: index + 1,
                display_name: month_start.format("%B").to_string(),
                start_at: month_start,
                end_at: month_end,
            });
        }

        let end_at = months
            .last()
            .map(|m| m.end_at)
            .ok_or_else(|| calendar_error(start_at))?;

        Ok(Self {
            id: id.into(),
            name: name.into(),
            start_at,
            end_at,
            months,
        })
    }

    /// Returns true if the date falls within this fiscal year.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_at && date <= self.end_at
    }

    /// The month containing `date`.
    pub fn month_for(&self, date: NaiveDate) -> Option<&FiscalMonth> {
        self.months.iter().find(|m| m.contains(date))
    }

    /// Finds a month by display name.
    pub fn month_named(&self, display_name: &str) -> Option<&FiscalMonth> {
        self.months.iter().find(|m| m.display_name == display_name)
    }

    /// Months intersecting `[from, to]`, in order.
    pub fn months_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<&FiscalMonth> {
        self.months
            .iter()
            .filter(|m| m.start_at <= to && m.end_at >= from)
            .collect()
    }

    /// Number of months starting after `date`.
    pub fn remaining_months_after(&self, date: NaiveDate) -> usize {
        self.months.iter().filter(|m| m.start_at > date).count()
    }

    /// Number of days after `date` until the end of the year.
    pub fn remaining_days_after(&self, date: NaiveDate) -> i64 {
        (self.end_at - date).num_days().max(0)
    }
}

/// The set of fiscal years known to an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalCalendar {
    /// Fiscal years, in any order.
    pub years: Vec<FiscalYear>,
}

impl FiscalCalendar {
    /// Creates a calendar from fiscal years.
    pub fn new(years: Vec<FiscalYear>) -> Self {
        Self { years }
    }

    /// The fiscal year containing `date`.
    pub fn year_for(&self, date: NaiveDate) -> Option<&FiscalYear> {
        self.years.iter().find(|fy| fy.contains(date))
    }

    /// Finds a fiscal year by id.
    pub fn year(&self, id: &str) -> Option<&FiscalYear> {
        self.years.iter().find(|fy| fy.id == id)
    }

    /// The fiscal month containing `date`, or `FiscalMonthNotFound`.
    pub fn month_for(&self, date: NaiveDate) -> EngineResult<(&FiscalYear, &FiscalMonth)> {
        self.year_for(date)
            .and_then(|fy| fy.month_for(date).map(|m| (fy, m)))
            .ok_or(EngineError::FiscalMonthNotFound { date })
    }
}

fn add_months(date: NaiveDate, months: u32) -> EngineResult<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| calendar_error(date))
}

fn calendar_error(date: NaiveDate) -> EngineError {
    EngineError::CalculationError {
        message: format!(
            "Cannot build fiscal months from {}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fy() -> FiscalYear {
        FiscalYear::monthly("fy25", "2025/26", date(2025, 7, 1)).unwrap()
    }

    #[test]
    fn test_monthly_fiscal_year_months_are_contiguous() {
        let fy = fy();
        for pair in fy.months.windows(2) {
            assert_eq!(pair[0].end_at.succ_opt().unwrap(), pair[1].start_at);
        }
        assert_eq!(fy.months[7].display_name, "February");
        assert_eq!(fy.months[7].days(), 28);
    }

    #[test]
    fn test_mid_month_start_uses_same_day() {
        let fy = FiscalYear::monthly("np", "2081/82", date(2024, 7, 16)).unwrap();
        assert_eq!(fy.months[0].end_at, date(2024, 8, 15));
        assert_eq!(fy.end_at, date(2025, 7, 15));
    }

    #[test]
    fn test_months_between_returns_intersecting_months() {
        let fy = fy();
        let months = fy.months_between(date(2025, 7, 15), date(2025, 8, 10));
        assert_eq!(months.len(), 2);
        assert_eq!(months[1].display_name, "August");
    }

    #[test]
    fn test_remaining_months_after() {
        let fy = fy();
        assert_eq!(fy.remaining_months_after(date(2025, 7, 31)), 11);
        assert_eq!(fy.remaining_months_after(date(2026, 6, 30)), 0);
    }

    #[test]
    fn test_calendar_month_lookup_fails_outside_years() {
        let calendar = FiscalCalendar::new(vec![fy()]);
        assert!(calendar.month_for(date(2025, 9, 3)).is_ok());
        match calendar.month_for(date(2024, 1, 1)).unwrap_err() {
            EngineError::FiscalMonthNotFound { date: d } => assert_eq!(d, date(2024, 1, 1)),
            other => panic!("Expected FiscalMonthNotFound, got {:?}", other),
        }
    }
}
