//! Backdated recalculation.
//!
//! When a package slot applies retroactively, payroll already generated
//! over the backdated window is recomputed with the packages that should
//! have applied, and the per-heading differences are stored against the
//! slot. The next payroll pass picks them up as adjustments.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::models::{
    BackdatedCalculation, EmployeeFacts, FiscalCalendar, HeadingType, Package, PackageSlot,
    ReportRowRecord, round_amount,
};
use crate::plugins::PluginRegistry;
use crate::store::PayrollRepository;

use super::calculator::{CalculationRequest, EmployeeSalaryCalculator};
use super::resolver::{ResolvedPackage, validate_package};

/// A date range evaluated with one package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageSpan {
    /// The package that applies over the span.
    pub package: Package,
    /// First day of the span (inclusive).
    pub from_date: NaiveDate,
    /// Last day of the span (inclusive).
    pub to_date: NaiveDate,
}

/// The summed amount of one heading over the backdated window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingTotal {
    /// The heading name.
    pub heading_name: String,
    /// The heading type.
    pub heading_type: HeadingType,
    /// Sum of the heading's amounts.
    pub amount: Decimal,
}

/// Heading totals keyed by heading id.
pub type HeadingTotals = BTreeMap<String, HeadingTotal>;

/// What a backdated run computed for a slot, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BackdatedOutcome {
    /// The slot the run was for.
    pub package_slot_id: String,
    /// First day of the recomputed window.
    pub window_start: NaiveDate,
    /// Last day of the recomputed window.
    pub window_end: NaiveDate,
    /// The package spans recomputed.
    pub spans: Vec<PackageSpan>,
    /// Differences per heading; unchanged headings are left out.
    pub calculations: Vec<BackdatedCalculation>,
}

/// Sums diffable rows per heading.
pub fn sum_by_heading<'a, I>(rows: I) -> HeadingTotals
where
    I: IntoIterator<Item = (&'a str, &'a str, HeadingType, Decimal)>,
{
    let mut totals = HeadingTotals::new();
    for (heading_id, heading_name, heading_type, amount) in rows {
        if !heading_type.is_backdated_diffable() {
            continue;
        }
        totals
            .entry(heading_id.to_string())
            .and_modify(|t| t.amount += amount)
            .or_insert_with(|| HeadingTotal {
                heading_name: heading_name.to_string(),
                heading_type,
                amount,
            });
    }
    totals
}

/// Differences between generated and recomputed totals.
///
/// A heading present on one side only gets `None` on the other. Headings
/// whose totals are equal produce no record.
///
/// # Example
///
/// ```
/// use payroll_engine::calculation::{HeadingTotal, diff_heading_totals};
/// use payroll_engine::models::HeadingType;
/// use rust_decimal::Decimal;
/// use std::collections::BTreeMap;
///
/// let total = |amount: i64| HeadingTotal {
///     heading_name: "Basic".to_string(),
///     heading_type: HeadingType::Addition,
///     amount: Decimal::new(amount, 0),
/// };
/// let generated = BTreeMap::from([("basic".to_string(), total(1000))]);
/// let current = BTreeMap::from([("basic".to_string(), total(1200))]);
///
/// let diffs = diff_heading_totals("slot", &generated, &current);
/// assert_eq!(diffs[0].difference(), Decimal::new(200, 0));
/// ```
pub fn diff_heading_totals(
    package_slot_id: &str,
    generated: &HeadingTotals,
    current: &HeadingTotals,
) -> Vec<BackdatedCalculation> {
    let ids: BTreeSet<&String> = generated.keys().chain(current.keys()).collect();
    ids.into_iter()
        .filter_map(|id| {
            let previous = generated.get(id);
            let recomputed = current.get(id);
            let (name, heading_type) = match (previous, recomputed) {
                (_, Some(t)) | (Some(t), None) => (t.heading_name.clone(), t.heading_type),
                (None, None) => return None,
            };
            let previous_amount = previous.map(|t| round_amount(t.amount));
            let current_amount = recomputed.map(|t| round_amount(t.amount));
            if previous_amount == current_amount {
                return None;
            }
            Some(BackdatedCalculation {
                package_slot_id: package_slot_id.to_string(),
                heading_id: id.clone(),
                heading_name: name,
                heading_type,
                previous_amount,
                current_amount,
                adjusted_payroll: None,
            })
        })
        .collect()
}

/// Builds the package spans covering `[window_start, window_end]`.
///
/// Older slots keep their package before `backdate_from`; the backdated
/// slot's package applies from `backdate_from`. Adjacent spans with the
/// same package are merged.
pub fn package_spans(
    slots: &[PackageSlot],
    backdated: &PackageSlot,
    backdate_from: NaiveDate,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Vec<PackageSpan> {
    let older: Vec<&PackageSlot> = slots
        .iter()
        .filter(|s| s.id != backdated.id && s.active_from_date < backdated.active_from_date)
        .collect();

    let mut spans: Vec<PackageSpan> = Vec::new();
    for (i, slot) in older.iter().enumerate() {
        let next_start = older.get(i + 1).map(|s| s.active_from_date);
        let start = slot.active_from_date.max(window_start);
        let mut end = window_end;
        for limit in [next_start, Some(backdate_from)].into_iter().flatten() {
            if let Some(before) = limit.pred_opt() {
                end = end.min(before);
            }
        }
        if start <= end {
            push_span(&mut spans, &slot.package, start, end);
        }
    }

    let start = backdate_from.max(window_start);
    if start <= window_end {
        push_span(&mut spans, &backdated.package, start, window_end);
    }
    spans
}

fn push_span(spans: &mut Vec<PackageSpan>, package: &Package, from: NaiveDate, to: NaiveDate) {
    if let Some(last) = spans.last_mut() {
        if last.package.id == package.id && last.to_date.succ_opt() == Some(from) {
            last.to_date = to;
            return;
        }
    }
    spans.push(PackageSpan {
        package: package.clone(),
        from_date: from,
        to_date: to,
    });
}

/// Recomputes backdated windows and stores their differences.
pub struct BackdatedCalculator<'a, R: PayrollRepository + ?Sized> {
    repository: &'a R,
    registry: &'a PluginRegistry,
    calculator: EmployeeSalaryCalculator<'a>,
}

impl<'a, R: PayrollRepository + ?Sized> BackdatedCalculator<'a, R> {
    /// Creates a backdated calculator over a repository.
    pub fn new(
        repository: &'a R,
        registry: &'a PluginRegistry,
        calculator: EmployeeSalaryCalculator<'a>,
    ) -> Self {
        Self {
            repository,
            registry,
            calculator,
        }
    }

    /// Computes the differences for a slot without storing them.
    ///
    /// # Errors
    ///
    /// - `PackageSlotNotFound` when the slot does not exist
    /// - `CalculationError` when the slot has no usable backdate
    /// - any error of the calculator passes over the window
    pub fn compute(&self, slot_id: &str) -> EngineResult<BackdatedOutcome> {
        let slot = self.repository.package_slot(slot_id)?;
        let backdate_from = slot
            .backdated_calculation_from
            .ok_or_else(|| EngineError::CalculationError {
                message: format!("Package slot {} has no backdated calculation date", slot.id),
            })?;
        if backdate_from >= slot.active_from_date {
            return Err(EngineError::CalculationError {
                message: format!(
                    "Backdated calculation date {} must be before the active from date {}",
                    backdate_from, slot.active_from_date
                ),
            });
        }

        let employee_id = slot.employee_id.as_str();
        let window_start = self
            .repository
            .payroll_start_covering(employee_id, backdate_from)?
            .map_or(backdate_from, |start| start.min(backdate_from));
        let window_end = slot
            .active_from_date
            .pred_opt()
            .ok_or_else(|| EngineError::CalculationError {
                message: format!("No day precedes {}", slot.active_from_date),
            })?;

        let generated_rows =
            self.repository
                .generated_report_rows(employee_id, window_start, window_end)?;
        let generated = sum_by_heading(generated_rows.iter().map(record_fields));

        let slots = self.repository.package_slots(employee_id)?;
        let spans = package_spans(&slots, &slot, backdate_from, window_start, window_end);
        let current = self.recompute(employee_id, &spans, &generated_rows)?;

        let calculations = diff_heading_totals(&slot.id, &generated, &current);
        debug!(
            slot_id = %slot.id,
            window_start = %window_start,
            window_end = %window_end,
            spans = spans.len(),
            diffs = calculations.len(),
            "Computed backdated differences"
        );

        Ok(BackdatedOutcome {
            package_slot_id: slot.id,
            window_start,
            window_end,
            spans,
            calculations,
        })
    }

    /// Stores a computed outcome, replacing earlier differences of the slot.
    pub fn persist(&self, outcome: BackdatedOutcome) -> EngineResult<Vec<BackdatedCalculation>> {
        let calculations = outcome.calculations;
        self.repository
            .replace_backdated_calculations(&outcome.package_slot_id, calculations.clone())?;
        info!(
            slot_id = %outcome.package_slot_id,
            diffs = calculations.len(),
            "Stored backdated calculations"
        );
        Ok(calculations)
    }

    /// Recomputes the slot's backdated window and stores the differences.
    pub fn update_or_create_backdated_payroll(
        &self,
        slot_id: &str,
    ) -> EngineResult<Vec<BackdatedCalculation>> {
        let outcome = self.compute(slot_id)?;
        self.persist(outcome)
    }

    /// Recomputes the spans one payroll period at a time.
    ///
    /// Each period is evaluated against the history that existed when it
    /// was first paid: earlier paid rows only, and the last payroll date
    /// before the period. Amounts are rounded per period, as generated
    /// payroll was.
    fn recompute(
        &self,
        employee_id: &str,
        spans: &[PackageSpan],
        generated_rows: &[ReportRowRecord],
    ) -> EngineResult<HeadingTotals> {
        let employee = self.repository.employee(employee_id)?;
        let mut facts = self.repository.employee_facts(employee_id)?;
        facts.pending_backdated.clear();

        let period_starts: BTreeSet<NaiveDate> = generated_rows
            .iter()
            .flat_map(|r| [Some(r.from_date), r.to_date.succ_opt()])
            .flatten()
            .collect();

        let mut resolved: HashMap<&str, ResolvedPackage> = HashMap::new();
        let mut totals = HeadingTotals::new();
        for span in spans {
            if !resolved.contains_key(span.package.id.as_str()) {
                let package = validate_package(&span.package, self.registry)?;
                resolved.insert(span.package.id.as_str(), package);
            }
            let Some(package) = resolved.get(span.package.id.as_str()) else {
                continue;
            };

            let periods = payroll_periods(
                self.calculator.calendar(),
                &period_starts,
                span.from_date,
                span.to_date,
            )?;
            for (from_date, to_date) in periods {
                let history = facts_before(&facts, from_date);
                let request = CalculationRequest::new(&employee, &history, from_date, to_date);
                let payroll = self.calculator.calculate(package, &request)?;
                let period_totals = sum_by_heading(payroll.rows.iter().map(|r| {
                    (r.heading_id.as_str(), r.heading_name.as_str(), r.heading_type, r.amount)
                }));
                for (id, total) in period_totals {
                    totals
                        .entry(id)
                        .and_modify(|t| t.amount += total.amount)
                        .or_insert(total);
                }
            }
        }
        Ok(totals)
    }
}

/// Splits `[from, to]` at fiscal month boundaries and at `period_starts`.
fn payroll_periods(
    calendar: &FiscalCalendar,
    period_starts: &BTreeSet<NaiveDate>,
    from: NaiveDate,
    to: NaiveDate,
) -> EngineResult<Vec<(NaiveDate, NaiveDate)>> {
    let mut periods = Vec::new();
    let mut start = from;
    while start <= to {
        let (_, month) = calendar.month_for(start)?;
        let mut end = month.end_at.min(to);
        let cut = start
            .succ_opt()
            .filter(|after| *after <= end)
            .and_then(|after| period_starts.range(after..=end).next().copied())
            .and_then(|next| next.pred_opt());
        if let Some(before) = cut {
            end = before;
        }
        periods.push((start, end));
        match end.succ_opt() {
            Some(next) => start = next,
            None => break,
        }
    }
    Ok(periods)
}

/// The employee's facts as they stood before `from` was paid.
fn facts_before(facts: &EmployeeFacts, from: NaiveDate) -> EmployeeFacts {
    let mut history = facts.clone();
    history.paid_rows.retain(|r| r.to_date < from);
    history.last_payroll_date = history
        .paid_rows
        .iter()
        .map(|r| r.to_date)
        .chain(facts.last_payroll_date.filter(|d| *d < from))
        .max();
    history
}

fn record_fields(row: &ReportRowRecord) -> (&str, &str, HeadingType, Decimal) {
    (
        row.heading_id.as_str(),
        row.heading_name.as_str(),
        row.heading_type,
        row.amount,
    )
}
