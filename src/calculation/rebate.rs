//! Voluntary rebate amortization across fiscal months.
//!
//! A rebate claim allots an amount to each fiscal month. Months up to the
//! last generated payroll are consumed; the rest are still to be paid and
//! are what the calculator sees. Superseding a claim archives the previous
//! entry, zeroing whatever it had not yet consumed.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    FiscalMonth, FiscalYear, RebateSetting, RebateStatus, UserVoluntaryRebate,
};
use crate::rules::{Argument, CompiledRule};

/// Function token used by rebate headings.
pub const USER_VOLUNTARY_REBATE: &str = "__USER_VOLUNTARY_REBATE__";

/// Checks a month allocation against the rebate's annual ceiling.
///
/// A ceiling of zero means unlimited.
///
/// # Example
///
/// ```
/// use payroll_engine::calculation::validate_rebate_amount;
/// use payroll_engine::models::{RebateDuration, RebateSetting};
/// use rust_decimal::Decimal;
/// use std::collections::BTreeMap;
///
/// let setting = RebateSetting {
///     id: "life".to_string(),
///     title: "Life Insurance".to_string(),
///     amount: Decimal::new(1000, 0),
///     duration_type: RebateDuration::Monthly,
/// };
/// let mut months = BTreeMap::new();
/// months.insert("July".to_string(), Decimal::new(600, 0));
/// assert!(validate_rebate_amount(&setting, &months).is_ok());
/// months.insert("August".to_string(), Decimal::new(600, 0));
/// assert!(validate_rebate_amount(&setting, &months).is_err());
/// ```
pub fn validate_rebate_amount(
    setting: &RebateSetting,
    fiscal_months_amount: &BTreeMap<String, Decimal>,
) -> EngineResult<()> {
    let total: Decimal = fiscal_months_amount.values().copied().sum();
    if !setting.amount.is_zero() && total > setting.amount {
        return Err(EngineError::CeilingViolation {
            ceiling: setting.amount,
            total,
        });
    }
    Ok(())
}

/// Rebate titles a heading rule reads through `__USER_VOLUNTARY_REBATE__`.
pub fn rebate_titles(rule: &CompiledRule) -> Vec<String> {
    rule.calls_of(USER_VOLUNTARY_REBATE)
        .into_iter()
        .filter_map(|args| args.first().and_then(Argument::as_text).map(str::to_string))
        .collect()
}

/// Month-level view of rebate claims for one fiscal year and payroll state.
#[derive(Debug, Clone, Copy)]
pub struct RebateAmortizer<'a> {
    fiscal_year: &'a FiscalYear,
    last_payroll_date: Option<NaiveDate>,
}

impl<'a> RebateAmortizer<'a> {
    /// Creates an amortizer for `fiscal_year` given the last generated payroll date.
    pub fn new(fiscal_year: &'a FiscalYear, last_payroll_date: Option<NaiveDate>) -> Self {
        Self {
            fiscal_year,
            last_payroll_date,
        }
    }

    /// Display names of months already covered by generated payroll.
    ///
    /// Empty unless the last payroll date falls within this fiscal year.
    pub fn payroll_generated_months(&self) -> Vec<String> {
        let Some(last) = self.last_payroll_date else {
            return Vec::new();
        };
        let Some(current) = self.fiscal_year.month_for(last) else {
            return Vec::new();
        };
        self.fiscal_year
            .months
            .iter()
            .filter(|m| m.month_index <= current.month_index)
            .map(|m| m.display_name.clone())
            .collect()
    }

    /// Month allocations still to be paid.
    ///
    /// With `calculate_projected_months` the current month is dropped from
    /// the allocation. With `include_current_month` unset the current month
    /// counts as remaining even when payroll already covered it. Archived
    /// entries report zero for every remaining month.
    pub fn remaining_fiscal_months_in_payroll(
        &self,
        rebate: &UserVoluntaryRebate,
        current_month: &FiscalMonth,
        include_current_month: bool,
        calculate_projected_months: bool,
    ) -> BTreeMap<String, Decimal> {
        let mut allocation = rebate.fiscal_months_amount.clone();
        if calculate_projected_months {
            allocation.remove(&current_month.display_name);
        }

        let mut generated = self.payroll_generated_months();
        if !include_current_month {
            generated.retain(|m| *m != current_month.display_name);
        }

        allocation
            .into_iter()
            .filter(|(month, _)| !generated.contains(month))
            .map(|(month, amount)| {
                let amount = if rebate.is_archived() { Decimal::ZERO } else { amount };
                (month, amount)
            })
            .collect()
    }

    /// Sum of [`Self::remaining_fiscal_months_in_payroll`].
    pub fn remaining_amount(
        &self,
        rebate: &UserVoluntaryRebate,
        current_month: &FiscalMonth,
        include_current_month: bool,
        calculate_projected_months: bool,
    ) -> Decimal {
        self.remaining_fiscal_months_in_payroll(
            rebate,
            current_month,
            include_current_month,
            calculate_projected_months,
        )
        .values()
        .copied()
        .sum()
    }

    /// Archives an entry: unconsumed months become zero, consumed months are
    /// kept and `amount` becomes their sum.
    pub fn archive(&self, rebate: &mut UserVoluntaryRebate) {
        let generated = self.payroll_generated_months();
        for (month, amount) in rebate.fiscal_months_amount.iter_mut() {
            if !generated.contains(month) {
                *amount = Decimal::ZERO;
            }
        }
        rebate.amount = rebate.total();
        rebate.status = RebateStatus::Archived;
        info!(
            rebate_id = %rebate.id,
            user_id = %rebate.user_id,
            amount = %rebate.amount,
            "Archived voluntary rebate"
        );
    }

    /// Validates and records a new claim, archiving the active entries of
    /// the same user, rebate and fiscal year.
    ///
    /// Returns the ids of the archived entries.
    pub fn record(
        &self,
        entries: &mut Vec<UserVoluntaryRebate>,
        claim: UserVoluntaryRebate,
    ) -> EngineResult<Vec<String>> {
        validate_rebate_amount(&claim.rebate, &claim.fiscal_months_amount)?;
        if let Some(month) = claim
            .fiscal_months_amount
            .keys()
            .find(|m| self.fiscal_year.month_named(m).is_none())
        {
            return Err(EngineError::CalculationError {
                message: format!(
                    "Fiscal month '{}' is not part of fiscal year {}",
                    month, self.fiscal_year.name
                ),
            });
        }

        let mut archived = Vec::new();
        for entry in entries.iter_mut().filter(|e| {
            e.user_id == claim.user_id
                && e.rebate.id == claim.rebate.id
                && e.fiscal_year_id == claim.fiscal_year_id
                && e.id != claim.id
                && !e.is_archived()
        }) {
            self.archive(entry);
            archived.push(entry.id.clone());
        }

        entries.push(claim);
        Ok(archived)
    }

    /// The entry a rule reads for `title`: the active claim in this fiscal
    /// year, else the most recently created archived one.
    pub fn entry_for<'r>(
        &self,
        rebates: &'r [UserVoluntaryRebate],
        user_id: &str,
        title: &str,
    ) -> Option<&'r UserVoluntaryRebate> {
        let mut candidates: Vec<&UserVoluntaryRebate> = rebates
            .iter()
            .filter(|r| {
                r.user_id == user_id
                    && r.rebate.title == title
                    && r.fiscal_year_id == self.fiscal_year.id
            })
            .collect();
        candidates.sort_by_key(|r| (!r.is_archived(), r.created_on));
        candidates.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeadingRule, RebateDuration};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fiscal_year() -> FiscalYear {
        FiscalYear::monthly("fy25", "2025/26", date(2025, 7, 1)).unwrap()
    }

    fn setting(ceiling: &str) -> RebateSetting {
        RebateSetting {
            id: "life".to_string(),
            title: "Life Insurance".to_string(),
            amount: dec(ceiling),
            duration_type: RebateDuration::Monthly,
        }
    }

    fn claim(id: &str, months: &[(&str, &str)], created: NaiveDate) -> UserVoluntaryRebate {
        let fiscal_months_amount: BTreeMap<String, Decimal> = months
            .iter()
            .map(|(m, a)| (m.to_string(), dec(a)))
            .collect();
        UserVoluntaryRebate {
            id: id.to_string(),
            user_id: "emp_001".to_string(),
            rebate: setting("40000"),
            fiscal_year_id: "fy25".to_string(),
            duration_unit: RebateDuration::Monthly,
            amount: fiscal_months_amount.values().copied().sum(),
            fiscal_months_amount,
            status: RebateStatus::Created,
            created_on: created,
        }
    }

    fn months() -> Vec<(&'static str, &'static str)> {
        vec![
            ("July", "1000"),
            ("August", "1000"),
            ("September", "1000"),
            ("October", "1000"),
        ]
    }

    /// REB-001: Totals above the ceiling are rejected; zero is unlimited.
    #[test]
    fn test_ceiling() {
        let months: BTreeMap<String, Decimal> =
            [("July".to_string(), dec("30000")), ("August".to_string(), dec("20000"))].into();
        match validate_rebate_amount(&setting("40000"), &months) {
            Err(EngineError::CeilingViolation { ceiling, total }) => {
                assert_eq!(ceiling, dec("40000"));
                assert_eq!(total, dec("50000"));
            }
            other => panic!("Expected CeilingViolation, got {:?}", other),
        }
        assert!(validate_rebate_amount(&setting("0"), &months).is_ok());
    }

    #[test]
    fn test_generated_months_follow_last_payroll() {
        let fy = fiscal_year();
        let amortizer = RebateAmortizer::new(&fy, Some(date(2025, 8, 31)));
        assert_eq!(amortizer.payroll_generated_months(), vec!["July", "August"]);

        assert!(RebateAmortizer::new(&fy, Some(date(2025, 6, 30)))
            .payroll_generated_months()
            .is_empty());
        assert!(RebateAmortizer::new(&fy, None).payroll_generated_months().is_empty());
    }

    #[test]
    fn test_remaining_months() {
        let fy = fiscal_year();
        let amortizer = RebateAmortizer::new(&fy, Some(date(2025, 8, 31)));
        let rebate = claim("uvr_1", &months(), date(2025, 7, 1));
        let september = fy.month_named("September").unwrap();
        let august = fy.month_named("August").unwrap();

        let remaining = amortizer.remaining_fiscal_months_in_payroll(&rebate, september, true, false);
        assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["October", "September"]);
        assert_eq!(amortizer.remaining_amount(&rebate, september, true, true), dec("1000"));

        let reopened = amortizer.remaining_fiscal_months_in_payroll(&rebate, august, false, false);
        assert!(reopened.contains_key("August"));
        assert_eq!(amortizer.remaining_amount(&rebate, august, false, false), dec("3000"));
    }

    /// REB-002: Archival zeroes unconsumed months and keeps consumed ones.
    #[test]
    fn test_archive_zeroes_unconsumed_months() {
        let fy = fiscal_year();
        let amortizer = RebateAmortizer::new(&fy, Some(date(2025, 8, 31)));
        let mut rebate = claim("uvr_1", &months(), date(2025, 7, 1));

        amortizer.archive(&mut rebate);

        assert!(rebate.is_archived());
        assert_eq!(rebate.amount, dec("2000"));
        assert_eq!(rebate.fiscal_months_amount["July"], dec("1000"));
        assert_eq!(rebate.fiscal_months_amount["September"], Decimal::ZERO);

        let september = fy.month_named("September").unwrap();
        assert_eq!(amortizer.remaining_amount(&rebate, september, true, false), Decimal::ZERO);
    }

    /// REB-003: A new claim supersedes the active one.
    #[test]
    fn test_record_supersedes_previous_claim() {
        let fy = fiscal_year();
        let amortizer = RebateAmortizer::new(&fy, Some(date(2025, 7, 31)));
        let mut entries = vec![claim("uvr_1", &months(), date(2025, 7, 1))];

        let archived = amortizer
            .record(&mut entries, claim("uvr_2", &[("August", "2000")], date(2025, 8, 5)))
            .unwrap();

        assert_eq!(archived, vec!["uvr_1".to_string()]);
        assert_eq!(entries[0].amount, dec("1000"));
        assert!(entries[0].is_archived());
        assert_eq!(
            amortizer.entry_for(&entries, "emp_001", "Life Insurance").unwrap().id,
            "uvr_2"
        );
    }

    #[test]
    fn test_record_rejects_unknown_month() {
        let fy = fiscal_year();
        let amortizer = RebateAmortizer::new(&fy, None);
        let mut entries = Vec::new();
        assert!(amortizer
            .record(&mut entries, claim("uvr_1", &[("Baisakh", "10")], date(2025, 7, 1)))
            .is_err());
        assert!(entries.is_empty());
    }

    #[test]
    fn test_rebate_titles_from_rule() {
        let rule = CompiledRule::compile(&HeadingRule::from(
            "__USER_VOLUNTARY_REBATE__(\"Life Insurance\") + __USER_VOLUNTARY_REBATE__('Medical')",
        ))
        .unwrap();
        assert_eq!(rebate_titles(&rule), vec!["Life Insurance", "Medical"]);
    }
}
