//! Built-in plugins: annual amount, voluntary rebate and duty station.

use rust_decimal::Decimal;

use crate::calculation::RebateAmortizer;
use crate::error::{RuleError, RuleResult};
use crate::models::{variable_name, PackageHeading, Provenance, RebateDuration, SourceRecord};
use crate::rules::{Argument, FunctionValue};

use super::{CalculatorView, PayrollPlugin};

const BUILTIN_VERSION: &str = env!("CARGO_PKG_VERSION");

fn single_text_argument(args: &[Argument], what: &str) -> Vec<String> {
    let mut messages = Vec::new();
    if args.len() != 1 {
        messages.push(format!("Exactly one {} is required.", what));
    }
    if args.iter().any(|a| a.as_text().is_none()) {
        messages.push(format!("The {} must be a string.", what));
    }
    messages
}

fn text_argument<'a>(function: &str, args: &'a [Argument]) -> RuleResult<&'a str> {
    args.first()
        .and_then(Argument::as_text)
        .ok_or_else(|| RuleError::InvalidArguments {
            function: function.to_string(),
            messages: vec!["A string argument is required.".to_string()],
        })
}

/// `__ANNUAL_AMOUNT__("<Heading Name>")`: fiscal-year-to-date total of a
/// heading, the current period included.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnualAmountPlugin;

impl PayrollPlugin for AnnualAmountPlugin {
    fn name(&self) -> &str {
        "Annual Amount"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn is_function(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &[Argument]) -> Vec<String> {
        single_text_argument(args, "heading name")
    }

    fn dependencies(&self, args: &[Argument]) -> Vec<String> {
        args.iter()
            .filter_map(Argument::as_text)
            .map(variable_name)
            .collect()
    }

    fn call(
        &self,
        view: &CalculatorView<'_>,
        _heading: &PackageHeading,
        args: &[Argument],
    ) -> RuleResult<FunctionValue> {
        let variable = self.variable();
        let title = text_argument(&variable, args)?;
        let target_variable = variable_name(title);

        let target = view
            .package
            .heading_by_variable(&target_variable)
            .ok_or_else(|| RuleError::UnresolvedReference {
                name: target_variable.clone(),
            })?;
        let current = view
            .amounts
            .get(&target_variable)
            .copied()
            .ok_or_else(|| RuleError::UnresolvedReference {
                name: target_variable.clone(),
            })?;

        let fiscal_start = view.fiscal_year.start_at;
        let (paid, sources) = match view.from_date.pred_opt() {
            Some(day_before) if day_before >= fiscal_start => {
                let rows: Vec<_> = view
                    .facts
                    .paid_rows
                    .iter()
                    .filter(|r| {
                        r.heading_id == target.heading.id
                            && r.from_date >= fiscal_start
                            && r.to_date <= day_before
                    })
                    .collect();
                let paid: Decimal = rows.iter().map(|r| r.amount).sum();
                let sources = rows
                    .iter()
                    .map(|r| SourceRecord {
                        model_name: "ReportRowRecord".to_string(),
                        instance_id: r.employee_payroll_id.clone(),
                        url: None,
                    })
                    .collect();
                (paid, sources)
            }
            _ => (Decimal::ZERO, Vec::new()),
        };

        let value = paid + current;
        Ok(FunctionValue {
            value,
            provenance: vec![Provenance {
                value,
                sources,
                used_variable_name: variable,
                registered_plugin_name: self.name().to_string(),
                registered_plugin_version: self.version().to_string(),
            }],
        })
    }
}

/// `__USER_VOLUNTARY_REBATE__("<Rebate Title>")`: the rebate amount
/// attributable to the current period.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserVoluntaryRebatePlugin;

impl PayrollPlugin for UserVoluntaryRebatePlugin {
    fn name(&self) -> &str {
        "User Voluntary Rebate"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn is_function(&self) -> bool {
        true
    }

    fn validate_args(&self, args: &[Argument]) -> Vec<String> {
        single_text_argument(args, "rebate title")
    }

    fn call(
        &self,
        view: &CalculatorView<'_>,
        _heading: &PackageHeading,
        args: &[Argument],
    ) -> RuleResult<FunctionValue> {
        let variable = self.variable();
        let title = text_argument(&variable, args)?;

        let amortizer = RebateAmortizer::new(view.fiscal_year, view.facts.last_payroll_date);
        let Some(rebate) = amortizer.entry_for(&view.facts.rebates, &view.employee.id, title)
        else {
            return Ok(FunctionValue::plain(Decimal::ZERO));
        };

        let value = match rebate.duration_unit {
            RebateDuration::Yearly if rebate.is_archived() => Decimal::ZERO,
            RebateDuration::Yearly => rebate.amount,
            RebateDuration::Monthly => {
                let month = view
                    .fiscal_year
                    .month_for(view.to_date)
                    .ok_or_else(|| RuleError::Evaluation {
                        message: format!("no fiscal month contains {}", view.to_date),
                    })?;
                amortizer
                    .remaining_fiscal_months_in_payroll(rebate, month, true, false)
                    .get(&month.display_name)
                    .copied()
                    .unwrap_or_default()
            }
        };

        Ok(FunctionValue {
            value,
            provenance: vec![Provenance {
                value,
                sources: vec![SourceRecord {
                    model_name: "UserVoluntaryRebate".to_string(),
                    instance_id: rebate.id.clone(),
                    url: None,
                }],
                used_variable_name: variable,
                registered_plugin_name: self.name().to_string(),
                registered_plugin_version: self.version().to_string(),
            }],
        })
    }
}

/// `__DUTY_STATION__`: annual duty-station allowance pro-rated over the
/// days each assignment overlaps the period.
#[derive(Debug, Clone, Copy, Default)]
pub struct DutyStationPlugin;

impl PayrollPlugin for DutyStationPlugin {
    fn name(&self) -> &str {
        "Duty Station"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn is_function(&self) -> bool {
        false
    }

    fn call(
        &self,
        view: &CalculatorView<'_>,
        _heading: &PackageHeading,
        _args: &[Argument],
    ) -> RuleResult<FunctionValue> {
        let year_days = Decimal::from((view.fiscal_year.end_at - view.fiscal_year.start_at).num_days() + 1);
        let mut total = Decimal::ZERO;
        let mut provenance = Vec::new();

        for assignment in &view.facts.duty_stations {
            let start = assignment.from_date.max(view.from_date);
            let end = assignment
                .to_date
                .map_or(view.to_date, |d| d.min(view.to_date));
            if start > end {
                continue;
            }

            let overlap = Decimal::from((end - start).num_days() + 1);
            let portion = assignment.annual_amount * overlap / year_days;
            total += portion;
            provenance.push(Provenance {
                value: portion,
                sources: vec![SourceRecord {
                    model_name: "DutyStationAssignment".to_string(),
                    instance_id: assignment.id.clone(),
                    url: None,
                }],
                used_variable_name: self.variable(),
                registered_plugin_name: self.name().to_string(),
                registered_plugin_version: self.version().to_string(),
            });
        }

        Ok(FunctionValue {
            value: total,
            provenance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DutyStationAssignment, Employee, EmployeeFacts, FiscalYear, HeadingDefinition,
        HeadingRule, HeadingType, Package, RebateSetting, RebateStatus, ReportRowRecord,
        UserVoluntaryRebate,
    };
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn heading(id: &str, name: &str) -> PackageHeading {
        PackageHeading::new(
            id,
            HeadingDefinition {
                id: id.to_string(),
                name: name.to_string(),
                organization: "org".to_string(),
                rule: HeadingRule::from("1000"),
                heading_type: HeadingType::Type2Cnst,
                duration_unit: None,
                taxable: None,
                absent_days_impact: None,
                deduct_amount_on_leave: false,
                pay_when_present_holiday_offday: false,
                is_editable: true,
            },
            1,
        )
    }

    struct Fixture {
        employee: Employee,
        facts: EmployeeFacts,
        package: Package,
        fiscal_year: FiscalYear,
        amounts: BTreeMap<String, Decimal>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                employee: Employee {
                    id: "emp_001".to_string(),
                    name: "Asha".to_string(),
                    organization: "org".to_string(),
                    appoint_date: date(2024, 1, 1),
                    dismiss_date: None,
                    attributes: BTreeMap::new(),
                },
                facts: EmployeeFacts::default(),
                package: Package {
                    id: "pkg".to_string(),
                    name: "Standard".to_string(),
                    organization: "org".to_string(),
                    headings: vec![heading("bonus", "Bonus")],
                },
                fiscal_year: FiscalYear::monthly("fy25", "2025/26", date(2025, 7, 1)).unwrap(),
                amounts: BTreeMap::new(),
            }
        }

        fn view(&self, from: NaiveDate, to: NaiveDate) -> CalculatorView<'_> {
            CalculatorView {
                employee: &self.employee,
                facts: &self.facts,
                package: &self.package,
                fiscal_year: &self.fiscal_year,
                from_date: from,
                to_date: to,
                amounts: &self.amounts,
            }
        }
    }

    fn paid_row(payroll: &str, from: NaiveDate, to: NaiveDate, amount: &str) -> ReportRowRecord {
        ReportRowRecord {
            employee_payroll_id: payroll.to_string(),
            employee_id: "emp_001".to_string(),
            package_heading_id: "bonus".to_string(),
            heading_id: "bonus".to_string(),
            heading_name: "Bonus".to_string(),
            heading_type: HeadingType::Type2Cnst,
            amount: dec(amount),
            from_date: from,
            to_date: to,
        }
    }

    #[test]
    fn test_annual_amount_adds_paid_rows_and_current() {
        let mut fixture = Fixture::new();
        fixture.facts.paid_rows = vec![
            paid_row("p1", date(2025, 7, 1), date(2025, 7, 31), "1000"),
            paid_row("p2", date(2025, 8, 1), date(2025, 8, 31), "1000"),
            paid_row("old", date(2025, 6, 1), date(2025, 6, 30), "900"),
        ];
        fixture.amounts.insert("__BONUS__".to_string(), dec("1000"));

        let args = [Argument::Text("Bonus".to_string())];
        let value = AnnualAmountPlugin
            .call(
                &fixture.view(date(2025, 9, 1), date(2025, 9, 30)),
                &fixture.package.headings[0],
                &args,
            )
            .unwrap();

        assert_eq!(value.value, dec("3000"));
        assert_eq!(value.provenance[0].sources.len(), 2);
        assert_eq!(AnnualAmountPlugin.dependencies(&args), vec!["__BONUS__".to_string()]);
    }

    #[test]
    fn test_annual_amount_requires_computed_heading() {
        let fixture = Fixture::new();
        let result = AnnualAmountPlugin.call(
            &fixture.view(date(2025, 9, 1), date(2025, 9, 30)),
            &fixture.package.headings[0],
            &[Argument::Text("Bonus".to_string())],
        );
        assert!(matches!(result, Err(RuleError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_annual_amount_argument_validation() {
        assert!(AnnualAmountPlugin
            .validate_args(&[Argument::Text("Bonus".to_string())])
            .is_empty());
        assert_eq!(AnnualAmountPlugin.validate_args(&[Argument::Number(dec("1"))]).len(), 1);
        assert_eq!(
            AnnualAmountPlugin
                .validate_args(&[
                    Argument::Text("A".to_string()),
                    Argument::Text("B".to_string())
                ])
                .len(),
            1
        );
    }

    fn rebate(duration: RebateDuration, status: RebateStatus) -> UserVoluntaryRebate {
        let mut months = BTreeMap::new();
        months.insert("July".to_string(), dec("500"));
        months.insert("August".to_string(), dec("700"));
        months.insert("September".to_string(), dec("300"));
        UserVoluntaryRebate {
            id: "uvr_1".to_string(),
            user_id: "emp_001".to_string(),
            rebate: RebateSetting {
                id: "life".to_string(),
                title: "Life Insurance".to_string(),
                amount: dec("40000"),
                duration_type: duration,
            },
            fiscal_year_id: "fy25".to_string(),
            duration_unit: duration,
            amount: dec("1500"),
            fiscal_months_amount: months,
            status,
            created_on: date(2025, 7, 1),
        }
    }

    #[test]
    fn test_monthly_rebate_returns_current_month_allocation() {
        let mut fixture = Fixture::new();
        fixture.facts.rebates = vec![rebate(RebateDuration::Monthly, RebateStatus::Created)];
        fixture.facts.last_payroll_date = Some(date(2025, 7, 31));

        let value = UserVoluntaryRebatePlugin
            .call(
                &fixture.view(date(2025, 8, 1), date(2025, 8, 31)),
                &fixture.package.headings[0],
                &[Argument::Text("Life Insurance".to_string())],
            )
            .unwrap();
        assert_eq!(value.value, dec("700"));
        assert_eq!(value.provenance[0].sources[0].model_name, "UserVoluntaryRebate");
    }

    #[test]
    fn test_archived_monthly_rebate_pays_nothing_for_unconsumed_month() {
        let mut fixture = Fixture::new();
        fixture.facts.rebates = vec![rebate(RebateDuration::Monthly, RebateStatus::Archived)];
        fixture.facts.last_payroll_date = Some(date(2025, 7, 31));

        let value = UserVoluntaryRebatePlugin
            .call(
                &fixture.view(date(2025, 8, 1), date(2025, 8, 31)),
                &fixture.package.headings[0],
                &[Argument::Text("Life Insurance".to_string())],
            )
            .unwrap();
        assert_eq!(value.value, Decimal::ZERO);
    }

    #[test]
    fn test_yearly_rebate_and_missing_rebate() {
        let mut fixture = Fixture::new();
        fixture.facts.rebates = vec![rebate(RebateDuration::Yearly, RebateStatus::Created)];
        let view = fixture.view(date(2025, 8, 1), date(2025, 8, 31));
        let heading = &fixture.package.headings[0];

        let yearly = UserVoluntaryRebatePlugin
            .call(&view, heading, &[Argument::Text("Life Insurance".to_string())])
            .unwrap();
        assert_eq!(yearly.value, dec("1500"));

        let missing = UserVoluntaryRebatePlugin
            .call(&view, heading, &[Argument::Text("Medical".to_string())])
            .unwrap();
        assert_eq!(missing.value, Decimal::ZERO);
        assert!(missing.provenance.is_empty());
    }

    #[test]
    fn test_duty_station_prorates_overlapping_assignments() {
        let mut fixture = Fixture::new();
        fixture.facts.duty_stations = vec![
            DutyStationAssignment {
                id: "ds_1".to_string(),
                station: "Jumla".to_string(),
                annual_amount: dec("36500"),
                from_date: date(2025, 6, 1),
                to_date: Some(date(2025, 7, 10)),
            },
            DutyStationAssignment {
                id: "ds_2".to_string(),
                station: "Humla".to_string(),
                annual_amount: dec("73000"),
                from_date: date(2025, 7, 11),
                to_date: None,
            },
            DutyStationAssignment {
                id: "ds_3".to_string(),
                station: "Dolpa".to_string(),
                annual_amount: dec("99999"),
                from_date: date(2025, 9, 1),
                to_date: None,
            },
        ];

        let value = DutyStationPlugin
            .call(
                &fixture.view(date(2025, 7, 1), date(2025, 7, 31)),
                &fixture.package.headings[0],
                &[],
            )
            .unwrap();

        // 36500 * 10 / 365 + 73000 * 21 / 365
        assert_eq!(value.value, dec("5200"));
        assert_eq!(value.provenance.len(), 2);
        assert_eq!(value.provenance[1].sources[0].instance_id, "ds_2");
    }
}
