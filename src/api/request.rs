//! Request types for the Payroll Calculation Engine API.
//!
//! This module defines the JSON request structures for the `/calculate` and
//! `/packages/validate` endpoints.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Employee, EmployeeFacts, Package};

/// Request body for the `/calculate` endpoint.
///
/// Previews one employee's payslip for a period. The package is either
/// given inline or referenced by the id of a configured package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayslipRequest {
    /// The employee information.
    pub employee: Employee,
    /// Attendance, rebates and history of the employee.
    #[serde(default)]
    pub facts: EmployeeFacts,
    /// The first day of the period (inclusive).
    pub from_date: NaiveDate,
    /// The last day of the period (inclusive).
    pub to_date: NaiveDate,
    /// Id of a configured package.
    #[serde(default)]
    pub package_id: Option<String>,
    /// An inline package, used instead of `package_id`.
    #[serde(default)]
    pub package: Option<Package>,
    /// Evaluate tax deduction headings.
    #[serde(default = "default_calculate_tax")]
    pub calculate_tax: bool,
    /// Amounts replacing computed values, keyed by package heading id.
    #[serde(default)]
    pub overrides: BTreeMap<String, Decimal>,
}

fn default_calculate_tax() -> bool {
    true
}

/// A heading's new position in a reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadingOrder {
    /// The package heading id.
    pub id: String,
    /// The new order.
    pub order: i32,
}

/// Request body for the `/packages/validate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageValidationRequest {
    /// The package to validate.
    pub package: Package,
    /// Reorder applied before validation.
    #[serde(default)]
    pub reorder: Vec<HeadingOrder>,
}
