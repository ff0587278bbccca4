//! Calculation output models.
//!
//! This module contains the [`EmployeePayroll`] produced by one calculator
//! pass, its [`ReportRow`]s with their provenance, the persisted
//! [`ReportRowRecord`] shape, and the audit trace recorded along the way.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::heading::HeadingType;

/// Rounds a monetary amount to two decimal places.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A record that contributed to a plugin value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Kind of record, e.g. "DutyStationAssignment".
    pub model_name: String,
    /// Identifier of the record.
    pub instance_id: String,
    /// Optional link to the record in the owning subsystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Provenance of a plugin value used while evaluating a heading.
///
/// # Example
///
/// ```
/// use payroll_engine::models::{Provenance, SourceRecord};
/// use rust_decimal::Decimal;
///
/// let provenance = Provenance {
///     value: Decimal::new(100, 0),
///     sources: vec![SourceRecord {
///         model_name: "DutyStationAssignment".to_string(),
///         instance_id: "ds_1".to_string(),
///         url: None,
///     }],
///     used_variable_name: "__DUTY_STATION__".to_string(),
///     registered_plugin_name: "Duty Station".to_string(),
///     registered_plugin_version: "1.0.0".to_string(),
/// };
/// assert_eq!(provenance.sources.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// The value the plugin returned.
    pub value: Decimal,
    /// The records the value was derived from.
    pub sources: Vec<SourceRecord>,
    /// The token used in the rule.
    pub used_variable_name: String,
    /// The plugin's registered name.
    pub registered_plugin_name: String,
    /// The plugin's version.
    pub registered_plugin_version: String,
}

/// The amount of one heading for one employee and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    /// The employee the row belongs to.
    pub employee_id: String,
    /// The package heading evaluated.
    pub package_heading_id: String,
    /// The underlying heading.
    pub heading_id: String,
    /// The heading name.
    pub heading_name: String,
    /// The effective heading type.
    pub heading_type: HeadingType,
    /// First day of the period (inclusive).
    pub from_date: NaiveDate,
    /// Last day of the period (inclusive).
    pub to_date: NaiveDate,
    /// The amount, rounded to two decimal places.
    pub amount: Decimal,
    /// Tax slab label from the conditional variant that produced the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tds_type: Option<String>,
    /// Plugin values the amount was derived from.
    #[serde(default)]
    pub provenance: Vec<Provenance>,
}

impl ReportRow {
    /// Converts the row into its persisted shape.
    pub fn to_record(&self, employee_payroll_id: &str) -> ReportRowRecord {
        ReportRowRecord {
            employee_payroll_id: employee_payroll_id.to_string(),
            employee_id: self.employee_id.clone(),
            package_heading_id: self.package_heading_id.clone(),
            heading_id: self.heading_id.clone(),
            heading_name: self.heading_name.clone(),
            heading_type: self.heading_type,
            amount: self.amount,
            from_date: self.from_date,
            to_date: self.to_date,
        }
    }
}

/// The persisted form of a [`ReportRow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRowRecord {
    /// The employee payroll the row was generated in.
    pub employee_payroll_id: String,
    /// The employee the row belongs to.
    pub employee_id: String,
    /// The package heading evaluated.
    pub package_heading_id: String,
    /// The underlying heading.
    pub heading_id: String,
    /// The heading name.
    pub heading_name: String,
    /// The heading type at generation time.
    pub heading_type: HeadingType,
    /// The generated amount.
    pub amount: Decimal,
    /// First day of the period (inclusive).
    pub from_date: NaiveDate,
    /// Last day of the period (inclusive).
    pub to_date: NaiveDate,
}

/// A single step in the audit trace, one per evaluated heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStep {
    /// Sequential step number (1-indexed).
    pub step_number: u32,
    /// The heading's variable token.
    pub heading: String,
    /// The rule text that was executed.
    pub rule: String,
    /// Input values used (JSON).
    pub input: serde_json::Value,
    /// Output values produced (JSON).
    pub output: serde_json::Value,
    /// Human-readable explanation of the step.
    pub reasoning: String,
}

/// A non-fatal condition noticed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditWarning {
    /// Warning code for programmatic handling.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// The heading concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
}

/// Audit trace for one calculator pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrace {
    /// Steps in evaluation order.
    pub steps: Vec<AuditStep>,
    /// Warnings raised during the pass.
    pub warnings: Vec<AuditWarning>,
    /// Pass duration in microseconds.
    pub duration_us: u64,
}

/// Aggregated totals of an [`EmployeePayroll`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollTotals {
    /// Additions and extra additions.
    pub gross: Decimal,
    /// Deductions and extra deductions.
    pub deductions: Decimal,
    /// Tax deductions.
    pub tax: Decimal,
    /// `gross - deductions - tax`.
    pub net: Decimal,
}

/// The result of one calculator pass for one employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeePayroll {
    /// Unique identifier for this result.
    pub id: Uuid,
    /// The employee the payroll belongs to.
    pub employee_id: String,
    /// The package evaluated.
    pub package_id: String,
    /// First day of the clipped period.
    pub from_date: NaiveDate,
    /// Last day of the clipped period.
    pub to_date: NaiveDate,
    /// Rows in resolved evaluation order.
    pub rows: Vec<ReportRow>,
    /// Audit trace of the pass.
    pub audit_trace: AuditTrace,
    /// When the pass ran.
    pub calculated_at: DateTime<Utc>,
}

impl EmployeePayroll {
    /// Finds a row by heading name.
    pub fn row(&self, heading_name: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.heading_name == heading_name)
    }

    /// The amount of a heading, if present.
    pub fn amount_of(&self, heading_name: &str) -> Option<Decimal> {
        self.row(heading_name).map(|r| r.amount)
    }

    /// Sums rows by heading type.
    pub fn totals(&self) -> PayrollTotals {
        let mut totals = PayrollTotals::default();
        for row in &self.rows {
            if row.heading_type.is_earning() {
                totals.gross += row.amount;
            } else if row.heading_type.is_deduction() {
                totals.deductions += row.amount;
            } else if row.heading_type.is_tax_deduction() {
                totals.tax += row.amount;
            }
        }
        totals.net = totals.gross - totals.deductions - totals.tax;
        totals
    }

    /// Converts the rows into their persisted shape.
    pub fn to_records(&self) -> Vec<ReportRowRecord> {
        let id = self.id.to_string();
        self.rows.iter().map(|r| r.to_record(&id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(name: &str, heading_type: HeadingType, amount: &str) -> ReportRow {
        ReportRow {
            employee_id: "emp_001".to_string(),
            package_heading_id: format!("ph_{}", name),
            heading_id: name.to_lowercase(),
            heading_name: name.to_string(),
            heading_type,
            from_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
            amount: dec(amount),
            tds_type: None,
            provenance: vec![],
        }
    }

    fn payroll(rows: Vec<ReportRow>) -> EmployeePayroll {
        EmployeePayroll {
            id: Uuid::new_v4(),
            employee_id: "emp_001".to_string(),
            package_id: "pkg".to_string(),
            from_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            to_date: NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
            rows,
            audit_trace: AuditTrace::default(),
            calculated_at: Utc::now(),
        }
    }

    #[test]
    fn test_round_amount_midpoint_away_from_zero() {
        assert_eq!(round_amount(dec("10.005")), dec("10.01"));
        assert_eq!(round_amount(dec("-10.005")), dec("-10.01"));
        assert_eq!(round_amount(dec("3.333333")), dec("3.33"));
    }

    #[test]
    fn test_totals_exclude_constants() {
        let p = payroll(vec![
            row("Basic", HeadingType::Type1Cnst, "15000"),
            row("Salary", HeadingType::Addition, "15000"),
            row("Allowance", HeadingType::ExtraAddition, "2000"),
            row("Provident Fund", HeadingType::Deduction, "1500"),
            row("Tax", HeadingType::TaxDeduction, "1000"),
        ]);
        let totals = p.totals();
        assert_eq!(totals.gross, dec("17000"));
        assert_eq!(totals.deductions, dec("1500"));
        assert_eq!(totals.tax, dec("1000"));
        assert_eq!(totals.net, dec("14500"));
    }

    #[test]
    fn test_records_carry_payroll_id() {
        let p = payroll(vec![row("Basic", HeadingType::Type1Cnst, "15000")]);
        let records = p.to_records();
        assert_eq!(records[0].employee_payroll_id, p.id.to_string());
        assert_eq!(records[0].amount, dec("15000"));
    }

    #[test]
    fn test_row_serialization_omits_empty_tds_type() {
        let json = serde_json::to_string(&row("Basic", HeadingType::Type1Cnst, "1.50")).unwrap();
        assert!(json.contains("\"amount\":\"1.50\""));
        assert!(json.contains("\"heading_type\":\"type1_cnst\""));
        assert!(!json.contains("tds_type"));
    }
}
