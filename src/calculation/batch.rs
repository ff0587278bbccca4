//! Parallel payroll generation for many employees.
//!
//! Passes are independent, so a batch fans out over rayon's pool. A failed
//! pass is recorded against its employee and never stops the others.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::models::EmployeePayroll;

use super::calculator::{CalculationRequest, EmployeeSalaryCalculator};
use super::resolver::ResolvedPackage;

/// One employee's pass within a batch.
#[derive(Debug, Clone)]
pub struct BatchJob<'a> {
    /// The employee's resolved package.
    pub package: &'a ResolvedPackage,
    /// The pass inputs.
    pub request: CalculationRequest<'a>,
}

/// An employee whose pass failed.
#[derive(Debug)]
pub struct BatchFailure {
    /// The employee concerned.
    pub employee_id: String,
    /// Why the pass failed.
    pub error: EngineError,
}

/// Results of a batch, in job order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Payrolls of the passes that succeeded.
    pub succeeded: Vec<EmployeePayroll>,
    /// Employees whose pass failed.
    pub failed: Vec<BatchFailure>,
}

impl EmployeeSalaryCalculator<'_> {
    /// Runs every job in parallel.
    pub fn calculate_batch(&self, jobs: &[BatchJob<'_>]) -> BatchOutcome {
        let results: Vec<_> = jobs
            .par_iter()
            .map(|job| (job, self.calculate(job.package, &job.request)))
            .collect();

        let mut outcome = BatchOutcome::default();
        for (job, result) in results {
            match result {
                Ok(payroll) => outcome.succeeded.push(payroll),
                Err(error) => {
                    warn!(
                        employee_id = %job.request.employee.id,
                        error = %error,
                        "Payroll pass failed"
                    );
                    outcome.failed.push(BatchFailure {
                        employee_id: job.request.employee.id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            jobs = jobs.len(),
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Batch generation finished"
        );
        outcome
    }
}
