//! Calculation logic for the Payroll Calculation Engine.
//!
//! This module contains package ordering and the tax ordering invariant,
//! dependency resolution, day counting and pro-ration, the employee salary
//! calculator, batch generation, backdated recalculation, voluntary rebate
//! amortization and the latest-request-wins recompute guard.

mod backdated;
mod batch;
mod calculator;
mod day_count;
mod ordering;
mod rebate;
mod recompute;
mod resolver;

pub use backdated::{
    BackdatedCalculator, BackdatedOutcome, HeadingTotal, HeadingTotals, PackageSpan,
    diff_heading_totals, package_spans, sum_by_heading,
};
pub use batch::{BatchFailure, BatchJob, BatchOutcome};
pub use calculator::{
    ANNUAL_GROSS_SALARY, CalculationRequest, EmployeeSalaryCalculator, REMAINING_DAYS_IN_FY,
    REMAINING_MONTHS_IN_FY, SLOT_DAYS_COUNT,
};
pub use day_count::{DayCountPolicy, DurationSetting, Slot, payable_days, slots};
pub use ordering::{
    check_tax_ordering, move_heading, reorder, switch_order, validate_package_order,
};
pub use rebate::{RebateAmortizer, USER_VOLUNTARY_REBATE, rebate_titles, validate_rebate_amount};
pub use recompute::{
    RecomputeGuard, RecomputeHandler, RecomputeQueue, RecomputeToken, WorkItem, WorkerStats,
    run_worker,
};
pub use resolver::{DependencyResolver, ResolvedHeading, ResolvedPackage, validate_package};
