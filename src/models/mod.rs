//! Core data models for the Payroll Calculation Engine.
//!
//! This module contains the heading, package, calendar, employee, output,
//! backdated and rebate models used throughout the engine.

mod backdated;
mod employee;
mod fiscal;
mod heading;
mod package;
mod rebate;
mod report_row;

pub use backdated::{BackdatedCalculation, PackageSlot};
pub use employee::{
    AttendanceFacts, DutyStationAssignment, Employee, EmployeeAttribute, EmployeeFacts,
};
pub use fiscal::{FiscalCalendar, FiscalMonth, FiscalYear};
pub use heading::{
    ConditionalRule, DurationUnit, HeadingDefinition, HeadingField, HeadingRule, HeadingType,
    NumericRuleValidator, variable_name,
};
pub use package::{Package, PackageHeading};
pub use rebate::{RebateDuration, RebateSetting, RebateStatus, UserVoluntaryRebate};
pub use report_row::{
    AuditStep, AuditTrace, AuditWarning, EmployeePayroll, PayrollTotals, Provenance, ReportRow,
    ReportRowRecord, SourceRecord, round_amount,
};
