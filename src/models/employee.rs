//! Employee model and the externally supplied facts a pass consumes.
//!
//! Attendance, leave, duty-station assignments, rebates and payroll history
//! are owned by other subsystems; the calculator only reads the snapshot
//! carried by [`EmployeeFacts`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::backdated::BackdatedCalculation;
use super::rebate::UserVoluntaryRebate;
use super::report_row::ReportRowRecord;

/// An employee attribute exposed to rules as `__EMPLOYEE_<NAME>__`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmployeeAttribute {
    /// Numeric attribute, usable in rules and conditions.
    Number(Decimal),
    /// Text attribute, comparable with `==` / `!=` in conditions.
    Text(String),
}

/// Represents an employee whose payroll is calculated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Unique identifier for the employee.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Organization the employee belongs to.
    #[serde(default)]
    pub organization: String,
    /// First day of employment.
    pub appoint_date: NaiveDate,
    /// Last day of employment, if dismissed.
    #[serde(default)]
    pub dismiss_date: Option<NaiveDate>,
    /// Attributes available to rules (gender, marital status, grade, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, EmployeeAttribute>,
}

impl Employee {
    /// Returns true if the employee is employed on `date`.
    ///
    /// # Examples
    ///
    /// ```
    /// use payroll_engine::models::Employee;
    /// use chrono::NaiveDate;
    ///
    /// let employee = Employee {
    ///     id: "emp_001".to_string(),
    ///     name: "Asha".to_string(),
    ///     organization: "acme".to_string(),
    ///     appoint_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
    ///     dismiss_date: None,
    ///     attributes: Default::default(),
    /// };
    /// assert!(employee.is_employed_on(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap()));
    /// assert!(!employee.is_employed_on(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()));
    /// ```
    pub fn is_employed_on(&self, date: NaiveDate) -> bool {
        date >= self.appoint_date && self.dismiss_date.is_none_or(|d| date <= d)
    }
}

/// Date-level attendance facts for one employee.
///
/// Each set holds the dates carrying that status; a date may appear in
/// several sets (a holiday the employee was present on, for instance).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceFacts {
    /// Days the employee was absent without leave.
    #[serde(default)]
    pub absent_days: BTreeSet<NaiveDate>,
    /// Days of unpaid leave.
    #[serde(default)]
    pub unpaid_leave_days: BTreeSet<NaiveDate>,
    /// Days of paid leave.
    #[serde(default)]
    pub paid_leave_days: BTreeSet<NaiveDate>,
    /// Organization holidays.
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
    /// Weekly off-days.
    #[serde(default)]
    pub offdays: BTreeSet<NaiveDate>,
    /// Days with a recorded presence.
    #[serde(default)]
    pub present_days: BTreeSet<NaiveDate>,
}

impl AttendanceFacts {
    /// Absent and unpaid leave days within `[from, to]`.
    pub fn unpaid_days_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let absent = count_between(&self.absent_days, from, to);
        let unpaid = self
            .unpaid_leave_days
            .range(from..=to)
            .filter(|d| !self.absent_days.contains(d))
            .count() as i64;
        absent + unpaid
    }

    /// Holidays and off-days within `[from, to]`.
    pub fn non_working_days_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        let holidays = count_between(&self.holidays, from, to);
        let offdays = self
            .offdays
            .range(from..=to)
            .filter(|d| !self.holidays.contains(d))
            .count() as i64;
        holidays + offdays
    }

    /// Returns true if `date` is a holiday or an off-day.
    pub fn is_non_working_day(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date) || self.offdays.contains(&date)
    }
}

fn count_between(days: &BTreeSet<NaiveDate>, from: NaiveDate, to: NaiveDate) -> i64 {
    if from > to {
        return 0;
    }
    days.range(from..=to).count() as i64
}

/// A duty-station posting carrying an annual allowance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyStationAssignment {
    /// Unique identifier for the assignment.
    pub id: String,
    /// Duty station name.
    pub station: String,
    /// Annual allowance paid for the station.
    pub annual_amount: Decimal,
    /// First day of the assignment.
    pub from_date: NaiveDate,
    /// Last day of the assignment, if it has ended.
    #[serde(default)]
    pub to_date: Option<NaiveDate>,
}

/// Everything the calculator reads about one employee besides the package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeFacts {
    /// Attendance and leave.
    #[serde(default)]
    pub attendance: AttendanceFacts,
    /// Duty-station postings.
    #[serde(default)]
    pub duty_stations: Vec<DutyStationAssignment>,
    /// Voluntary rebates, archived entries included.
    #[serde(default)]
    pub rebates: Vec<UserVoluntaryRebate>,
    /// Previously generated rows for the employee.
    #[serde(default)]
    pub paid_rows: Vec<ReportRowRecord>,
    /// End date of the latest generated payroll.
    #[serde(default)]
    pub last_payroll_date: Option<NaiveDate>,
    /// Backdated differences not yet applied to a payroll.
    #[serde(default)]
    pub pending_backdated: Vec<BackdatedCalculation>,
}

impl EmployeeFacts {
    /// Sum of previously paid amounts for a heading within `[from, to]`.
    ///
    /// Only rows lying entirely inside the range are counted.
    pub fn paid_amount(&self, heading_id: &str, from: NaiveDate, to: NaiveDate) -> Decimal {
        self.paid_rows
            .iter()
            .filter(|r| r.heading_id == heading_id && r.from_date >= from && r.to_date <= to)
            .map(|r| r.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn test_unpaid_days_do_not_double_count() {
        let mut facts = AttendanceFacts::default();
        facts.absent_days.insert(date(3));
        facts.unpaid_leave_days.insert(date(3));
        facts.unpaid_leave_days.insert(date(4));
        assert_eq!(facts.unpaid_days_between(date(1), date(31)), 2);
        assert_eq!(facts.unpaid_days_between(date(4), date(31)), 1);
    }

    #[test]
    fn test_non_working_days_between() {
        let mut facts = AttendanceFacts::default();
        facts.holidays.insert(date(5));
        facts.offdays.insert(date(5));
        facts.offdays.insert(date(12));
        assert_eq!(facts.non_working_days_between(date(1), date(31)), 2);
        assert!(facts.is_non_working_day(date(12)));
    }

    #[test]
    fn test_employee_attribute_untagged() {
        let attrs: BTreeMap<String, EmployeeAttribute> =
            serde_json::from_str(r#"{"grade": 4, "marital_status": "Married"}"#).unwrap();
        assert_eq!(attrs["grade"], EmployeeAttribute::Number(Decimal::new(4, 0)));
        assert_eq!(
            attrs["marital_status"],
            EmployeeAttribute::Text("Married".to_string())
        );
    }

    #[test]
    fn test_dismissed_employee_not_employed_after_dismissal() {
        let employee = Employee {
            id: "e1".to_string(),
            name: "Ravi".to_string(),
            organization: "acme".to_string(),
            appoint_date: date(1),
            dismiss_date: Some(date(20)),
            attributes: BTreeMap::new(),
        };
        assert!(employee.is_employed_on(date(20)));
        assert!(!employee.is_employed_on(date(21)));
    }
}
