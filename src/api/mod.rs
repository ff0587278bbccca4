//! HTTP API module for the Payroll Calculation Engine.
//!
//! This module provides the REST API endpoints for previewing payslips and
//! validating packages against the loaded configuration.

mod handlers;
mod request;
mod response;
mod state;

pub use handlers::create_router;
pub use request::{HeadingOrder, PackageValidationRequest, PayslipRequest};
pub use response::{ApiError, ApiErrorResponse, PackageValidationResponse, PayslipResponse};
pub use state::AppState;
