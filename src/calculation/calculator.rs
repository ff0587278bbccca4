//! Employee salary calculator.
//!
//! One pass evaluates every heading of a resolved package, in resolved
//! order, for one employee and one period. Each heading sees the amounts of
//! the headings evaluated before it, the static variables of the period,
//! the employee's attributes and the registered plugins.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, RuleError, RuleResult};
use crate::models::{
    AuditStep, AuditTrace, AuditWarning, DurationUnit, Employee, EmployeeAttribute,
    EmployeeFacts, EmployeePayroll, FiscalCalendar, FiscalYear, ReportRow, round_amount,
};
use crate::plugins::{CalculatorView, PluginRegistry};
use crate::rules::{
    Argument, EvaluationContext, FunctionValue, Reference, RuleOutcome, employee_variable,
};

use super::day_count::{DurationSetting, Slot, payable_days, slots};
use super::rebate::{RebateAmortizer, USER_VOLUNTARY_REBATE, rebate_titles};
use super::resolver::{ResolvedHeading, ResolvedPackage};

/// Days in the clipped period.
pub const SLOT_DAYS_COUNT: &str = "__SLOT_DAYS_COUNT__";
/// Fiscal months starting after the period.
pub const REMAINING_MONTHS_IN_FY: &str = "__REMAINING_MONTHS_IN_FY__";
/// Days between the period end and the fiscal year end.
pub const REMAINING_DAYS_IN_FY: &str = "__REMAINING_DAYS_IN_FY__";
/// Annualized tax-impacting income.
pub const ANNUAL_GROSS_SALARY: &str = "__ANNUAL_GROSS_SALARY__";

/// Inputs of one calculator pass.
#[derive(Debug, Clone)]
pub struct CalculationRequest<'a> {
    /// The employee to calculate.
    pub employee: &'a Employee,
    /// Attendance, rebates, history and pending adjustments.
    pub facts: &'a EmployeeFacts,
    /// First day of the requested period.
    pub from_date: NaiveDate,
    /// Last day of the requested period.
    pub to_date: NaiveDate,
    /// Evaluate tax deduction headings.
    pub calculate_tax: bool,
    /// Amounts replacing the computed value, keyed by package heading id.
    ///
    /// Carries both edited amounts and the inputs of extra headings.
    pub overrides: BTreeMap<String, Decimal>,
}

impl<'a> CalculationRequest<'a> {
    /// A request with tax enabled and no overrides.
    pub fn new(
        employee: &'a Employee,
        facts: &'a EmployeeFacts,
        from_date: NaiveDate,
        to_date: NaiveDate,
    ) -> Self {
        Self {
            employee,
            facts,
            from_date,
            to_date,
            calculate_tax: true,
            overrides: BTreeMap::new(),
        }
    }

    /// Sets whether tax deductions are evaluated.
    pub fn with_tax(mut self, calculate_tax: bool) -> Self {
        self.calculate_tax = calculate_tax;
        self
    }

    /// Replaces the computed amount of a package heading.
    pub fn with_override(mut self, package_heading_id: impl Into<String>, amount: Decimal) -> Self {
        self.overrides.insert(package_heading_id.into(), amount);
        self
    }
}

/// Evaluates resolved packages for employees.
///
/// The calculator holds only shared, read-only configuration and can be
/// used from many threads at once.
#[derive(Debug, Clone, Copy)]
pub struct EmployeeSalaryCalculator<'a> {
    calendar: &'a FiscalCalendar,
    registry: &'a PluginRegistry,
    settings: DurationSetting,
}

struct Pass<'a> {
    request: &'a CalculationRequest<'a>,
    package: &'a ResolvedPackage,
    fiscal_year: &'a FiscalYear,
    slots: Vec<Slot>,
    from_date: NaiveDate,
    to_date: NaiveDate,
    statics: BTreeMap<String, Decimal>,
    amounts: BTreeMap<String, Decimal>,
    rows: Vec<ReportRow>,
    trace: AuditTrace,
}

impl<'a> EmployeeSalaryCalculator<'a> {
    /// Creates a calculator over a fiscal calendar and plugin registry.
    pub fn new(
        calendar: &'a FiscalCalendar,
        registry: &'a PluginRegistry,
        settings: DurationSetting,
    ) -> Self {
        Self {
            calendar,
            registry,
            settings,
        }
    }

    /// The fiscal calendar passes are evaluated against.
    pub fn calendar(&self) -> &'a FiscalCalendar {
        self.calendar
    }

    /// Runs one pass and returns the employee's payroll.
    ///
    /// The period is clipped to the employee's appointment and dismissal
    /// dates; an empty clipped period yields a payroll without rows. The
    /// fiscal year containing the clipped start applies to the whole period.
    ///
    /// # Errors
    ///
    /// - `FiscalMonthNotFound` when part of the period has no fiscal month
    /// - `Rule` when a heading's rule fails to evaluate, which aborts the pass
    pub fn calculate(
        &self,
        package: &ResolvedPackage,
        request: &CalculationRequest<'_>,
    ) -> EngineResult<EmployeePayroll> {
        let start = Instant::now();
        let employee = request.employee;

        let from_date = request.from_date.max(employee.appoint_date);
        let to_date = employee
            .dismiss_date
            .map_or(request.to_date, |d| d.min(request.to_date));

        if from_date > to_date {
            info!(
                employee_id = %employee.id,
                from_date = %request.from_date,
                to_date = %request.to_date,
                "Period lies outside employment, no rows generated"
            );
            return Ok(EmployeePayroll {
                id: Uuid::new_v4(),
                employee_id: employee.id.clone(),
                package_id: package.package().id.clone(),
                from_date: request.from_date,
                to_date: request.to_date,
                rows: Vec::new(),
                audit_trace: AuditTrace {
                    steps: Vec::new(),
                    warnings: vec![AuditWarning {
                        code: "OUTSIDE_EMPLOYMENT".to_string(),
                        message: "The period does not intersect the employment dates".to_string(),
                        heading: None,
                    }],
                    duration_us: start.elapsed().as_micros() as u64,
                },
                calculated_at: Utc::now(),
            });
        }

        let (fiscal_year, _) = self.calendar.month_for(from_date)?;
        let slots = slots(self.calendar, from_date, to_date)?;

        let mut statics = BTreeMap::new();
        statics.insert(
            SLOT_DAYS_COUNT.to_string(),
            Decimal::from((to_date - from_date).num_days() + 1),
        );
        statics.insert(
            REMAINING_MONTHS_IN_FY.to_string(),
            Decimal::from(fiscal_year.remaining_months_after(to_date) as u64),
        );
        statics.insert(
            REMAINING_DAYS_IN_FY.to_string(),
            Decimal::from(fiscal_year.remaining_days_after(to_date)),
        );

        let mut pass = Pass {
            request,
            package,
            fiscal_year,
            slots,
            from_date,
            to_date,
            statics,
            amounts: BTreeMap::new(),
            rows: Vec::with_capacity(package.headings().len()),
            trace: AuditTrace::default(),
        };

        for (index, resolved) in package.headings().iter().enumerate() {
            self.evaluate_heading(&mut pass, resolved, index as u32 + 1)?;
        }

        let duration_us = start.elapsed().as_micros() as u64;
        pass.trace.duration_us = duration_us;

        info!(
            employee_id = %employee.id,
            package_id = %package.package().id,
            from_date = %from_date,
            to_date = %to_date,
            rows = pass.rows.len(),
            duration_us = duration_us,
            "Calculated employee payroll"
        );

        Ok(EmployeePayroll {
            id: Uuid::new_v4(),
            employee_id: employee.id.clone(),
            package_id: package.package().id.clone(),
            from_date,
            to_date,
            rows: pass.rows,
            audit_trace: pass.trace,
            calculated_at: Utc::now(),
        })
    }

    fn evaluate_heading(
        &self,
        pass: &mut Pass<'_>,
        resolved: &ResolvedHeading,
        step_number: u32,
    ) -> EngineResult<()> {
        let heading = &resolved.heading;
        let heading_type = heading.heading_type();
        let variable = resolved.variable();

        let mut outcome: Option<RuleOutcome> = None;
        let (unit, computed, reasoning) = if heading_type.is_tax_deduction()
            && !pass.request.calculate_tax
        {
            (
                Decimal::ZERO,
                Decimal::ZERO,
                "Tax deduction skipped for this pass".to_string(),
            )
        } else if let Some(amount) = pass.request.overrides.get(&heading.id) {
            (
                *amount,
                *amount,
                format!("Amount overridden to {}", amount.normalize()),
            )
        } else {
            let annual_gross = if reads_annual_gross(resolved) {
                Some(annual_gross_salary(pass).map_err(|e| EngineError::rule(heading.name(), e))?)
            } else {
                None
            };
            let executed = resolved
                .compiled
                .execute(&PassContext::new(self, &*pass, resolved, annual_gross))
                .map_err(|e| EngineError::rule(heading.name(), e))?;
            match executed {
                Some(result) => {
                    let unit = result.value;
                    let (amount, explanation) = self
                        .prorate(pass, resolved, unit)
                        .map_err(|e| EngineError::rule(heading.name(), e))?;
                    outcome = Some(result);
                    (unit, amount, explanation)
                }
                None => {
                    pass.trace.warnings.push(AuditWarning {
                        code: "NO_MATCHING_CONDITION".to_string(),
                        message: format!("No condition of {} holds; amount set to 0", heading.name()),
                        heading: Some(variable.clone()),
                    });
                    (Decimal::ZERO, Decimal::ZERO, "No condition matched".to_string())
                }
            }
        };

        let adjustment: Decimal = pass
            .request
            .facts
            .pending_backdated
            .iter()
            .filter(|b| b.heading_id == heading.heading.id && b.adjusted_payroll.is_none())
            .map(|b| b.difference())
            .sum();

        let amount = computed
            .checked_add(adjustment)
            .map(round_amount)
            .ok_or_else(|| EngineError::rule(heading.name(), overflow()))?;
        pass.amounts.insert(variable.clone(), amount);

        let (tds_type, provenance, rule_text, variant) = match outcome {
            Some(o) => (o.tds_type, o.provenance, o.rule_text, Some(o.variant_index)),
            None => (None, Vec::new(), String::new(), None),
        };

        debug!(heading = %heading.name(), amount = %amount, "Evaluated heading");

        pass.trace.steps.push(AuditStep {
            step_number,
            heading: variable.clone(),
            rule: rule_text,
            input: serde_json::json!({
                "heading_type": heading_type.label(),
                "duration_unit": heading.duration_unit(),
                "unit_amount": unit.normalize().to_string(),
                "variant": variant,
                "dependencies": resolved
                    .dependencies
                    .iter()
                    .map(|d| (d.clone(), pass.amounts.get(d).map(|a| a.normalize().to_string())))
                    .collect::<BTreeMap<_, _>>(),
            }),
            output: serde_json::json!({
                "amount": amount.normalize().to_string(),
                "backdated_adjustment": adjustment.normalize().to_string(),
                "tds_type": tds_type,
            }),
            reasoning: if adjustment.is_zero() {
                reasoning
            } else {
                format!("{}; backdated adjustment {}", reasoning, adjustment.normalize())
            },
        });

        pass.rows.push(ReportRow {
            employee_id: pass.request.employee.id.clone(),
            package_heading_id: heading.id.clone(),
            heading_id: heading.heading.id.clone(),
            heading_name: heading.name().to_string(),
            heading_type,
            from_date: pass.from_date,
            to_date: pass.to_date,
            amount,
            tds_type,
            provenance,
        });
        Ok(())
    }

    /// Applies the heading's duration unit to a unit amount.
    fn prorate(
        &self,
        pass: &Pass<'_>,
        resolved: &ResolvedHeading,
        unit: Decimal,
    ) -> RuleResult<(Decimal, String)> {
        let heading = &resolved.heading;
        let attendance = &pass.request.facts.attendance;
        Ok(match heading.duration_unit() {
            Some(DurationUnit::Monthly) if resolved.compiled.calls(USER_VOLUNTARY_REBATE) => {
                (unit, format!("Rebate amount {} is not pro-rated", unit.normalize()))
            }
            Some(DurationUnit::Monthly) => {
                let factor = self.settings.day_count_policy.monthly_factor(
                    &pass.slots,
                    attendance,
                    self.settings.include_holiday_offday_in_calculation,
                    heading.absent_days_impact() == Some(true),
                );
                (
                    unit.checked_mul(factor).ok_or_else(overflow)?,
                    format!(
                        "Monthly amount {} x {} month(s) worked over {} slot(s)",
                        unit.normalize(),
                        factor.round_dp(4).normalize(),
                        pass.slots.len()
                    ),
                )
            }
            Some(DurationUnit::Daily) => {
                let days = payable_days(
                    attendance,
                    pass.from_date,
                    pass.to_date,
                    heading.deduct_amount_on_leave(),
                    heading.pay_when_present_holiday_offday(),
                );
                (
                    unit.checked_mul(Decimal::from(days)).ok_or_else(overflow)?,
                    format!("Daily amount {} x {} payable day(s)", unit.normalize(), days),
                )
            }
            None => (unit, format!("Amount {} applied as-is", unit.normalize())),
        })
    }
}

fn overflow() -> RuleError {
    RuleError::Evaluation {
        message: "Amount exceeds the supported decimal range".to_string(),
    }
}

fn reads_annual_gross(resolved: &ResolvedHeading) -> bool {
    resolved
        .compiled
        .references()
        .contains(&Reference::Variable(ANNUAL_GROSS_SALARY.to_string()))
}

/// Tax-impacting income computed so far, annualized over the fiscal year.
fn annual_gross_salary(pass: &Pass<'_>) -> RuleResult<Decimal> {
    if !pass.request.calculate_tax {
        return Ok(Decimal::ZERO);
    }

    let facts = pass.request.facts;
    let fiscal_year = pass.fiscal_year;
    let remaining_months = Decimal::from(fiscal_year.remaining_months_after(pass.to_date) as u64);
    let paid_until = pass.from_date.pred_opt();
    let amortizer = RebateAmortizer::new(fiscal_year, facts.last_payroll_date);
    let current_month = fiscal_year.month_for(pass.to_date);

    let mut total = Decimal::ZERO;
    for row in &pass.rows {
        let Some(resolved) = pass.package.heading(&row.package_heading_id) else {
            continue;
        };
        let heading = &resolved.heading;
        if !heading.is_tax_impacting() {
            continue;
        }

        let paid = match paid_until {
            Some(until) if until >= fiscal_year.start_at => {
                facts.paid_amount(&row.heading_id, fiscal_year.start_at, until)
            }
            _ => Decimal::ZERO,
        };

        let projected = match (resolved.compiled.calls(USER_VOLUNTARY_REBATE), current_month) {
            (true, Some(month)) => rebate_titles(&resolved.compiled)
                .iter()
                .filter_map(|title| amortizer.entry_for(&facts.rebates, &pass.request.employee.id, title))
                .map(|entry| amortizer.remaining_amount(entry, month, true, false))
                .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
                .ok_or_else(overflow)?,
            _ => row
                .amount
                .checked_mul(remaining_months)
                .and_then(|rest| rest.checked_add(row.amount))
                .ok_or_else(overflow)?,
        };

        let annual = paid.checked_add(projected).ok_or_else(overflow)?;
        total = if heading.heading_type().is_deduction() {
            total.checked_sub(annual)
        } else {
            total.checked_add(annual)
        }
        .ok_or_else(overflow)?;
    }
    Ok(round_amount(total))
}

/// Symbol lookups for one heading of one pass.
struct PassContext<'p> {
    calculator: &'p EmployeeSalaryCalculator<'p>,
    pass: &'p Pass<'p>,
    resolved: &'p ResolvedHeading,
    /// Set when the heading reads `__ANNUAL_GROSS_SALARY__`.
    annual_gross: Option<Decimal>,
}

impl<'p> PassContext<'p> {
    fn new(
        calculator: &'p EmployeeSalaryCalculator<'p>,
        pass: &'p Pass<'p>,
        resolved: &'p ResolvedHeading,
        annual_gross: Option<Decimal>,
    ) -> Self {
        Self {
            calculator,
            pass,
            resolved,
            annual_gross,
        }
    }

    fn view(&self) -> CalculatorView<'_> {
        CalculatorView {
            employee: self.pass.request.employee,
            facts: self.pass.request.facts,
            package: self.pass.package.package(),
            fiscal_year: self.pass.fiscal_year,
            from_date: self.pass.from_date,
            to_date: self.pass.to_date,
            amounts: &self.pass.amounts,
        }
    }

    fn attribute(&self, name: &str) -> Option<&EmployeeAttribute> {
        self.pass
            .request
            .employee
            .attributes
            .iter()
            .find(|(key, _)| employee_variable(key) == name)
            .map(|(_, value)| value)
    }
}

impl EvaluationContext for PassContext<'_> {
    fn get_heading_amount(&self, name: &str) -> Option<Decimal> {
        if let Some(amount) = self.pass.amounts.get(name) {
            return Some(*amount);
        }
        if let Some(value) = self.pass.statics.get(name) {
            return Some(*value);
        }
        if name == ANNUAL_GROSS_SALARY {
            return self.annual_gross;
        }
        match self.attribute(name) {
            Some(EmployeeAttribute::Number(n)) => Some(*n),
            _ => None,
        }
    }

    fn get_text(&self, name: &str) -> Option<String> {
        match self.attribute(name) {
            Some(EmployeeAttribute::Text(t)) => Some(t.clone()),
            _ => None,
        }
    }

    fn call_function(&self, name: &str, args: &[Argument]) -> Option<RuleResult<FunctionValue>> {
        let plugin = self.calculator.registry.resolve(name)?;
        Some(plugin.call(&self.view(), &self.resolved.heading, args))
    }
}
