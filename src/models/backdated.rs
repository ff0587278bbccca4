//! Package slots and backdated correction records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::heading::HeadingType;
use super::package::Package;
use super::report_row::round_amount;

/// The time-bounded binding of a package to an employee's experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSlot {
    /// Unique identifier for the slot.
    pub id: String,
    /// The employee the slot belongs to.
    pub employee_id: String,
    /// The package applied from `active_from_date`.
    pub package: Package,
    /// First day the package applies going forward.
    pub active_from_date: NaiveDate,
    /// Date from which the package applies retroactively.
    #[serde(default)]
    pub backdated_calculation_from: Option<NaiveDate>,
    /// Set once a backdated run produced at least one difference.
    #[serde(default)]
    pub backdated_calculation_generated: bool,
}

/// The difference between a generated and a recomputed heading total.
///
/// `None` on either side means the heading did not exist in that set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackdatedCalculation {
    /// The package slot that triggered the recompute.
    pub package_slot_id: String,
    /// The heading concerned.
    pub heading_id: String,
    /// The heading name.
    pub heading_name: String,
    /// The heading type.
    pub heading_type: HeadingType,
    /// Total already generated over the window.
    pub previous_amount: Option<Decimal>,
    /// Total recomputed over the window.
    pub current_amount: Option<Decimal>,
    /// The payroll the difference was applied to, once adjusted.
    #[serde(default)]
    pub adjusted_payroll: Option<String>,
}

impl BackdatedCalculation {
    /// `current - previous`, with a missing side counted as zero.
    ///
    /// # Example
    ///
    /// ```
    /// use payroll_engine::models::{BackdatedCalculation, HeadingType};
    /// use rust_decimal::Decimal;
    ///
    /// let diff = BackdatedCalculation {
    ///     package_slot_id: "slot".to_string(),
    ///     heading_id: "basic".to_string(),
    ///     heading_name: "Basic".to_string(),
    ///     heading_type: HeadingType::Addition,
    ///     previous_amount: Some(Decimal::new(1500, 0)),
    ///     current_amount: None,
    ///     adjusted_payroll: None,
    /// };
    /// assert_eq!(diff.difference(), Decimal::new(-1500, 0));
    /// ```
    pub fn difference(&self) -> Decimal {
        round_amount(
            self.current_amount.unwrap_or_default() - self.previous_amount.unwrap_or_default(),
        )
    }
}
