//! HTTP request handlers for the Payroll Calculation Engine API.
//!
//! This module contains the handler functions for all API endpoints.

use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calculation::{
    CalculationRequest, EmployeeSalaryCalculator, ResolvedPackage, reorder, validate_package,
};

use super::request::{PackageValidationRequest, PayslipRequest};
use super::response::{
    ApiError, ApiErrorResponse, PackageValidationResponse, PayslipResponse,
};
use super::state::AppState;

/// Creates the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/calculate", post(calculate_handler))
        .route("/packages/validate", post(validate_package_handler))
        .with_state(state)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Json(body)).into_response()
}

fn error_response(error: ApiErrorResponse) -> Response {
    json_response(error.status, error.error)
}

/// Maps a JSON extraction failure to a 400 response.
fn rejection_response(correlation_id: Uuid, rejection: JsonRejection) -> Response {
    let error = match rejection {
        JsonRejection::JsonDataError(err) => {
            let body_text = err.body_text();
            warn!(
                correlation_id = %correlation_id,
                error = %body_text,
                "JSON data error"
            );
            if body_text.contains("missing field") {
                ApiError::validation_error(body_text)
            } else {
                ApiError::malformed_json(body_text)
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            warn!(
                correlation_id = %correlation_id,
                error = %err,
                "JSON syntax error"
            );
            ApiError::malformed_json(format!("Invalid JSON syntax: {}", err))
        }
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::new("MISSING_CONTENT_TYPE", "Content-Type must be application/json")
        }
        _ => ApiError::malformed_json("Failed to parse request body"),
    };
    json_response(StatusCode::BAD_REQUEST, error)
}

/// Handler for POST /calculate endpoint.
///
/// Previews an employee's payslip for the requested period.
async fn calculate_handler(
    State(state): State<AppState>,
    payload: Result<Json<PayslipRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, "Processing payslip preview request");

    let request = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(correlation_id, rejection),
    };

    let employee_id = request.employee.id.clone();
    let start_time = Instant::now();
    match preview_payslip(&state, request) {
        Ok(response) => {
            info!(
                correlation_id = %correlation_id,
                employee_id = %employee_id,
                rows = response.payroll.rows.len(),
                net = %response.totals.net,
                duration_us = start_time.elapsed().as_micros(),
                "Payslip preview completed successfully"
            );
            json_response(StatusCode::OK, response)
        }
        Err(err) => {
            warn!(
                correlation_id = %correlation_id,
                employee_id = %employee_id,
                code = %err.error.code,
                error = %err.error.message,
                "Payslip preview failed"
            );
            error_response(err)
        }
    }
}

/// Resolves the requested package and runs one calculator pass.
fn preview_payslip(
    state: &AppState,
    request: PayslipRequest,
) -> Result<PayslipResponse, ApiErrorResponse> {
    let PayslipRequest {
        employee,
        facts,
        from_date,
        to_date,
        package_id,
        package,
        calculate_tax,
        overrides,
    } = request;

    if from_date > to_date {
        return Err(ApiErrorResponse {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::validation_error(format!(
                "from_date {} is after to_date {}",
                from_date, to_date
            )),
        });
    }

    let config = state.config();
    let package = match (package, package_id) {
        (Some(package), _) => package,
        (None, Some(id)) => config.package(&id)?.clone(),
        (None, None) => {
            return Err(ApiErrorResponse {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::validation_error("Either package or package_id is required"),
            });
        }
    };

    let resolved = validate_package(&package, state.registry())?;
    let calculator = EmployeeSalaryCalculator::new(
        config.calendar(),
        state.registry(),
        config.duration_setting(),
    );

    let mut calculation = CalculationRequest::new(&employee, &facts, from_date, to_date)
        .with_tax(calculate_tax);
    calculation.overrides = overrides;

    let payroll = calculator.calculate(&resolved, &calculation)?;
    let totals = payroll.totals();
    Ok(PayslipResponse { payroll, totals })
}

/// Handler for POST /packages/validate endpoint.
///
/// Applies an optional reorder and reports the resolved evaluation order.
async fn validate_package_handler(
    State(state): State<AppState>,
    payload: Result<Json<PackageValidationRequest>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4();
    info!(correlation_id = %correlation_id, "Processing package validation request");

    let request = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return rejection_response(correlation_id, rejection),
    };

    let package = if request.reorder.is_empty() {
        Ok(request.package)
    } else {
        let orders: Vec<(String, i32)> = request
            .reorder
            .into_iter()
            .map(|o| (o.id, o.order))
            .collect();
        reorder(&request.package, &orders)
    };

    match package.and_then(|p| validate_package(&p, state.registry())) {
        Ok(resolved) => {
            info!(
                correlation_id = %correlation_id,
                package_id = %resolved.package().id,
                headings = resolved.headings().len(),
                "Package is valid"
            );
            json_response(StatusCode::OK, validation_body(&resolved))
        }
        Err(err) => {
            warn!(
                correlation_id = %correlation_id,
                error = %err,
                "Package validation failed"
            );
            error_response(err.into())
        }
    }
}

fn validation_body(resolved: &ResolvedPackage) -> PackageValidationResponse {
    PackageValidationResponse {
        package_id: resolved.package().id.clone(),
        evaluation_order: resolved.headings().iter().map(|h| h.variable()).collect(),
        dependencies: resolved
            .headings()
            .iter()
            .map(|h| (h.variable(), h.dependencies.iter().cloned().collect()))
            .collect(),
    }
}
