//! Response types for the Payroll Calculation Engine API.
//!
//! This module defines the success bodies, the error response structures
//! and the mapping from [`EngineError`] to HTTP errors.

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{EmployeePayroll, PayrollTotals};

/// Response body of the `/calculate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayslipResponse {
    /// The calculated payroll with its rows and audit trace.
    pub payroll: EmployeePayroll,
    /// Gross, deduction, tax and net totals.
    pub totals: PayrollTotals,
}

/// Response body of the `/packages/validate` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageValidationResponse {
    /// The validated package.
    pub package_id: String,
    /// Heading variables in evaluation order.
    pub evaluation_order: Vec<String>,
    /// The headings each heading reads, by variable.
    pub dependencies: BTreeMap<String, Vec<String>>,
}

/// API error response structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a new API error with details.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Creates a validation error response.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Creates a malformed JSON error response.
    pub fn malformed_json(message: impl Into<String>) -> Self {
        Self::new("MALFORMED_JSON", message)
    }
}

/// API error with HTTP status code.
pub struct ApiErrorResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The error body.
    pub error: ApiError,
}

impl ApiErrorResponse {
    fn new(status: StatusCode, code: &str, error: &EngineError, details: &str) -> Self {
        Self {
            status,
            error: ApiError::with_details(code, error.to_string(), details),
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<EngineError> for ApiErrorResponse {
    fn from(error: EngineError) -> Self {
        let unprocessable = StatusCode::UNPROCESSABLE_ENTITY;
        match &error {
            EngineError::ConfigNotFound { .. } | EngineError::ConfigParseError { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                &error,
                "The server configuration could not be loaded",
            ),
            EngineError::Rule { .. } => Self::new(
                unprocessable,
                "RULE_ERROR",
                &error,
                "A heading rule failed to parse or evaluate",
            ),
            EngineError::DependencyCycle { .. } => Self::new(
                unprocessable,
                "DEPENDENCY_CYCLE",
                &error,
                "Headings of the package reference each other in a cycle",
            ),
            EngineError::OrderingViolation { .. } => Self::new(
                unprocessable,
                "ORDERING_VIOLATION",
                &error,
                "Tax impacting headings must come before tax deductions",
            ),
            EngineError::CeilingViolation { .. } => Self::new(
                unprocessable,
                "CEILING_VIOLATION",
                &error,
                "The rebate allocation exceeds its ceiling",
            ),
            EngineError::InvalidHeading { .. } => Self::new(
                unprocessable,
                "INVALID_HEADING",
                &error,
                "A heading carries fields that are invalid for its type",
            ),
            EngineError::InvalidPlugin { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INVALID_PLUGIN",
                &error,
                "A calculator plugin could not be registered",
            ),
            EngineError::FiscalMonthNotFound { .. } => Self::new(
                StatusCode::BAD_REQUEST,
                "FISCAL_MONTH_NOT_FOUND",
                &error,
                "The requested period is not covered by the fiscal calendar",
            ),
            EngineError::PackageSlotNotFound { .. }
            | EngineError::PackageNotFound { .. }
            | EngineError::HeadingNotFound { .. }
            | EngineError::EmployeeNotFound { .. } => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &error,
                "The referenced record does not exist",
            ),
            EngineError::CalculationError { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CALCULATION_ERROR",
                &error,
                "Calculation failed",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_serialization() {
        let error = ApiError::new("TEST_ERROR", "Test message");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"code\":\"TEST_ERROR\""));
        assert!(json.contains("\"message\":\"Test message\""));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_api_error_with_details_serialization() {
        let error = ApiError::with_details("TEST_ERROR", "Test message", "Some details");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"details\":\"Some details\""));
    }

    #[test]
    fn test_ordering_violation_is_unprocessable() {
        let api_error: ApiErrorResponse = EngineError::OrderingViolation {
            heading: "Allowance".to_string(),
            message: "Tax impacting headings cannot be after Tax Deduction heading".to_string(),
        }
        .into();
        assert_eq!(api_error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(api_error.error.code, "ORDERING_VIOLATION");
        assert!(api_error.error.message.contains("Allowance"));
    }

    #[test]
    fn test_missing_package_is_not_found() {
        let api_error: ApiErrorResponse = EngineError::PackageNotFound {
            package_id: "ghost".to_string(),
        }
        .into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.error.code, "NOT_FOUND");
    }
}
