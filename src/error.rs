//! Error types for the Payroll Calculation Engine.
//!
//! This module provides strongly-typed errors using the `thiserror` crate
//! for every failure the engine can report: rule parsing and evaluation,
//! package configuration, ordering, rebates and configuration loading.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while parsing, validating or evaluating a heading rule.
///
/// A rule error is fatal for the heading being evaluated, which in turn
/// aborts the whole pass for that employee.
///
/// # Example
///
/// ```
/// use payroll_engine::error::RuleError;
///
/// let error = RuleError::UnresolvedReference {
///     name: "__BONUS__".to_string(),
/// };
/// assert_eq!(error.to_string(), "Unresolved reference: __BONUS__");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The rule text is not a well-formed expression.
    #[error("Syntax error at position {position}: {message}")]
    Syntax {
        /// Byte offset in the rule text where parsing failed.
        position: usize,
        /// A description of the syntax problem.
        message: String,
    },

    /// A heading, variable or function token could not be resolved.
    #[error("Unresolved reference: {name}")]
    UnresolvedReference {
        /// The token that could not be resolved.
        name: String,
    },

    /// A function call's arguments were rejected by its validator.
    #[error("Invalid arguments for {function}: {}", messages.join("; "))]
    InvalidArguments {
        /// The function whose arguments were rejected.
        function: String,
        /// Validation messages reported for the arguments.
        messages: Vec<String>,
    },

    /// The expression evaluated but produced an unusable value.
    #[error("Evaluation error: {message}")]
    Evaluation {
        /// A description of the evaluation failure.
        message: String,
    },
}

/// A type alias for Results that return RuleError.
pub type RuleResult<T> = Result<T, RuleError>;

/// The main error type for the Payroll Calculation Engine.
///
/// # Example
///
/// ```
/// use payroll_engine::error::EngineError;
///
/// let error = EngineError::DependencyCycle {
///     path: vec!["__A__".to_string(), "__B__".to_string(), "__A__".to_string()],
/// };
/// assert_eq!(error.to_string(), "Dependency cycle detected: __A__ -> __B__ -> __A__");
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },

    /// A heading's rule failed to parse, validate or evaluate.
    #[error("Rule error in heading '{heading}': {source}")]
    Rule {
        /// The heading whose rule failed.
        heading: String,
        /// The underlying rule error.
        source: RuleError,
    },

    /// Headings in a package reference each other in a cycle.
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle {
        /// The resolution path that re-entered itself.
        path: Vec<String>,
    },

    /// A reorder would place a tax-impacting heading after a tax deduction.
    #[error("Ordering violation for heading '{heading}': {message}")]
    OrderingViolation {
        /// The heading whose position is invalid.
        heading: String,
        /// A description of the violated constraint.
        message: String,
    },

    /// A rebate allocation exceeds its configured ceiling.
    #[error("Rebate amount limit exceeded: total {total} is above ceiling {ceiling}")]
    CeilingViolation {
        /// The configured ceiling.
        ceiling: Decimal,
        /// The requested total.
        total: Decimal,
    },

    /// A heading definition carries fields that are invalid for its type.
    #[error("Invalid heading '{heading}' field '{field}': {message}")]
    InvalidHeading {
        /// The heading name.
        heading: String,
        /// The invalid field.
        field: String,
        /// A description of the problem.
        message: String,
    },

    /// A plugin could not be registered.
    #[error("Invalid plugin '{name}': {message}")]
    InvalidPlugin {
        /// The plugin name.
        name: String,
        /// Why registration was rejected.
        message: String,
    },

    /// No fiscal month covers the requested date.
    #[error("No fiscal month found for date {date}")]
    FiscalMonthNotFound {
        /// The uncovered date.
        date: NaiveDate,
    },

    /// The referenced package slot does not exist.
    #[error("Package slot not found: {slot_id}")]
    PackageSlotNotFound {
        /// The missing slot id.
        slot_id: String,
    },

    /// The referenced package does not exist.
    #[error("Package not found: {package_id}")]
    PackageNotFound {
        /// The missing package id.
        package_id: String,
    },

    /// The referenced heading does not exist.
    #[error("Heading not found: {heading_id}")]
    HeadingNotFound {
        /// The missing heading id.
        heading_id: String,
    },

    /// The referenced employee does not exist.
    #[error("Employee not found: {employee_id}")]
    EmployeeNotFound {
        /// The missing employee id.
        employee_id: String,
    },

    /// A general calculation error occurred.
    #[error("Calculation error: {message}")]
    CalculationError {
        /// A description of the calculation error.
        message: String,
    },
}

impl EngineError {
    /// Wraps a [`RuleError`] with the name of the heading it came from.
    pub fn rule(heading: impl Into<String>, source: RuleError) -> Self {
        Self::Rule {
            heading: heading.into(),
            source,
        }
    }
}

/// A type alias for Results that return EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
