//! Day counting and pro-ration.
//!
//! A period is split into slots, one per fiscal month it intersects.
//! Monthly headings are scaled per slot by worked days over month days,
//! counted with the organization's [`DayCountPolicy`]. Daily headings are
//! paid per payable day.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{AttendanceFacts, FiscalCalendar, FiscalMonth};

/// How working days are counted when pro-rating monthly headings.
///
/// # Example
///
/// ```
/// use payroll_engine::calculation::DayCountPolicy;
///
/// let policy: DayCountPolicy = serde_yaml::from_str("kind: fixed_month_days\ndays: 30").unwrap();
/// assert_eq!(policy, DayCountPolicy::FixedMonthDays { days: 30 });
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayCountPolicy {
    /// Count calendar days of the fiscal month, optionally excluding
    /// holidays and off-days.
    #[default]
    OrganizationCalendar,
    /// Every fiscal month counts as `days` days; partial months scale it.
    FixedMonthDays {
        /// Days assumed per month.
        days: u32,
    },
}

/// Organization-level duration settings used by the calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationSetting {
    /// How working days are counted.
    #[serde(default)]
    pub day_count_policy: DayCountPolicy,
    /// Count holidays and off-days as working days.
    #[serde(default)]
    pub include_holiday_offday_in_calculation: bool,
}

/// The part of a period that falls in one fiscal month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// The fiscal month.
    pub month: FiscalMonth,
    /// First day of the slot (inclusive).
    pub start: NaiveDate,
    /// Last day of the slot (inclusive).
    pub end: NaiveDate,
}

impl Slot {
    /// Calendar days in the slot.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Returns true when the slot covers its whole month.
    pub fn is_full_month(&self) -> bool {
        self.start == self.month.start_at && self.end == self.month.end_at
    }
}

/// Splits `[from, to]` into fiscal-month slots.
///
/// Fails with `FiscalMonthNotFound` on the first day no fiscal month covers.
pub fn slots(calendar: &FiscalCalendar, from: NaiveDate, to: NaiveDate) -> EngineResult<Vec<Slot>> {
    let mut slots = Vec::new();
    let mut cursor = from;
    while cursor <= to {
        let (_, month) = calendar.month_for(cursor)?;
        let end = month.end_at.min(to);
        slots.push(Slot {
            month: month.clone(),
            start: cursor,
            end,
        });
        cursor = match end.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    if slots.is_empty() {
        return Err(EngineError::FiscalMonthNotFound { date: from });
    }
    Ok(slots)
}

impl DayCountPolicy {
    /// Working days in the slot and in its whole month.
    pub fn day_counts(
        &self,
        slot: &Slot,
        attendance: &AttendanceFacts,
        include_holiday_offday: bool,
    ) -> (Decimal, Decimal) {
        let month_days = slot.month.days();
        match self {
            DayCountPolicy::OrganizationCalendar => {
                let mut slot_days = slot.days();
                let mut whole_month = month_days;
                if !include_holiday_offday {
                    slot_days -= attendance.non_working_days_between(slot.start, slot.end);
                    whole_month -=
                        attendance.non_working_days_between(slot.month.start_at, slot.month.end_at);
                }
                (Decimal::from(slot_days.max(0)), Decimal::from(whole_month.max(0)))
            }
            DayCountPolicy::FixedMonthDays { days } => {
                let fixed = Decimal::from(*days);
                if slot.days() == month_days || month_days == 0 {
                    (fixed, fixed)
                } else {
                    (fixed * Decimal::from(slot.days()) / Decimal::from(month_days), fixed)
                }
            }
        }
    }

    /// The fraction of a monthly amount earned over `slots`.
    ///
    /// When `absent_days_impact` is set, absent and unpaid leave days are
    /// taken off the worked days of each slot.
    pub fn monthly_factor(
        &self,
        slots: &[Slot],
        attendance: &AttendanceFacts,
        include_holiday_offday: bool,
        absent_days_impact: bool,
    ) -> Decimal {
        slots
            .iter()
            .map(|slot| {
                let (working, month_working) =
                    self.day_counts(slot, attendance, include_holiday_offday);
                let unpaid = if absent_days_impact {
                    Decimal::from(attendance.unpaid_days_between(slot.start, slot.end))
                } else {
                    Decimal::ZERO
                };
                let worked = (working - unpaid).max(Decimal::ZERO);
                if worked.is_zero() || month_working.is_zero() {
                    Decimal::ZERO
                } else {
                    worked / month_working
                }
            })
            .sum()
    }
}

/// Number of days in `[from, to]` a daily heading pays for.
///
/// Absent and unpaid leave days are never paid. Paid leave is skipped when
/// `deduct_amount_on_leave` is set. Holidays and off-days are paid only when
/// the employee was present, if `pay_when_present_holiday_offday` is set.
pub fn payable_days(
    attendance: &AttendanceFacts,
    from: NaiveDate,
    to: NaiveDate,
    deduct_amount_on_leave: bool,
    pay_when_present_holiday_offday: bool,
) -> i64 {
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter(|day| {
            if attendance.absent_days.contains(day) || attendance.unpaid_leave_days.contains(day) {
                return false;
            }
            if attendance.paid_leave_days.contains(day) {
                return !deduct_amount_on_leave;
            }
            if pay_when_present_holiday_offday && attendance.is_non_working_day(*day) {
                return attendance.present_days.contains(day);
            }
            true
        })
        .count() as i64
}
