//! Packages and the headings bound into them.

use serde::{Deserialize, Serialize};

use super::heading::{
    check_type_fields, variable_name, DurationUnit, HeadingDefinition, HeadingRule, HeadingType,
};
use crate::error::EngineResult;

/// A heading bound into a package with a package-local order.
///
/// Every `Option` field overrides the corresponding field of the bound
/// [`HeadingDefinition`] when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageHeading {
    /// Unique identifier for the package heading.
    pub id: String,
    /// The bound heading definition.
    pub heading: HeadingDefinition,
    /// Package-local order, ascending.
    pub order: i32,
    /// Package-level rule override.
    #[serde(default)]
    pub rule: Option<HeadingRule>,
    /// Package-level type override.
    #[serde(default, rename = "type")]
    pub heading_type: Option<HeadingType>,
    /// Package-level duration override.
    #[serde(default)]
    pub duration_unit: Option<DurationUnit>,
    /// Package-level taxable override.
    #[serde(default)]
    pub taxable: Option<bool>,
    /// Package-level absence impact override.
    #[serde(default)]
    pub absent_days_impact: Option<bool>,
    /// Package-level leave deduction override.
    #[serde(default)]
    pub deduct_amount_on_leave: Option<bool>,
    /// Package-level holiday/off-day presence override.
    #[serde(default)]
    pub pay_when_present_holiday_offday: Option<bool>,
}

impl PackageHeading {
    /// Binds a heading at the given order without overrides.
    pub fn new(id: impl Into<String>, heading: HeadingDefinition, order: i32) -> Self {
        Self {
            id: id.into(),
            heading,
            order,
            rule: None,
            heading_type: None,
            duration_unit: None,
            taxable: None,
            absent_days_impact: None,
            deduct_amount_on_leave: None,
            pay_when_present_holiday_offday: None,
        }
    }

    /// The heading's display name.
    pub fn name(&self) -> &str {
        &self.heading.name
    }

    /// The heading's variable token.
    pub fn variable_name(&self) -> String {
        variable_name(&self.heading.name)
    }

    /// The effective rule.
    pub fn rule(&self) -> &HeadingRule {
        self.rule.as_ref().unwrap_or(&self.heading.rule)
    }

    /// The effective type.
    pub fn heading_type(&self) -> HeadingType {
        self.heading_type.unwrap_or(self.heading.heading_type)
    }

    /// The effective duration unit.
    pub fn duration_unit(&self) -> Option<DurationUnit> {
        self.duration_unit.or(self.heading.duration_unit)
    }

    /// The effective taxable flag.
    pub fn taxable(&self) -> Option<bool> {
        self.taxable.or(self.heading.taxable)
    }

    /// The effective absence impact flag.
    pub fn absent_days_impact(&self) -> Option<bool> {
        self.absent_days_impact.or(self.heading.absent_days_impact)
    }

    /// The effective leave deduction flag.
    pub fn deduct_amount_on_leave(&self) -> bool {
        self.deduct_amount_on_leave
            .unwrap_or(self.heading.deduct_amount_on_leave)
    }

    /// The effective holiday/off-day presence flag.
    pub fn pay_when_present_holiday_offday(&self) -> bool {
        self.pay_when_present_holiday_offday
            .unwrap_or(self.heading.pay_when_present_holiday_offday)
    }

    /// True when the heading is explicitly taxable.
    pub fn is_taxable(&self) -> bool {
        self.taxable() == Some(true)
    }

    /// True when the heading must be ordered before every tax deduction.
    ///
    /// That covers explicitly taxable non-tax headings and non-taxable
    /// regular deductions, which reduce taxable income.
    pub fn is_tax_impacting(&self) -> bool {
        let heading_type = self.heading_type();
        if heading_type.is_tax_deduction() {
            return false;
        }
        self.is_taxable() || (heading_type == HeadingType::Deduction && !self.is_taxable())
    }

    /// Checks the effective fields against the effective type.
    pub fn validate_fields(&self) -> EngineResult<()> {
        check_type_fields(
            self.name(),
            self.heading_type(),
            self.duration_unit(),
            self.taxable(),
            self.absent_days_impact(),
        )
    }
}

/// An ordered set of headings assigned to employees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Unique identifier for the package.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Organization owning the package.
    #[serde(default)]
    pub organization: String,
    /// The bound headings.
    pub headings: Vec<PackageHeading>,
}

impl Package {
    /// Headings sorted by their package order (stable).
    pub fn ordered_headings(&self) -> Vec<&PackageHeading> {
        let mut headings: Vec<&PackageHeading> = self.headings.iter().collect();
        headings.sort_by_key(|h| h.order);
        headings
    }

    /// Finds a package heading by its id.
    pub fn heading(&self, id: &str) -> Option<&PackageHeading> {
        self.headings.iter().find(|h| h.id == id)
    }

    /// Finds a package heading by its variable token.
    pub fn heading_by_variable(&self, variable: &str) -> Option<&PackageHeading> {
        self.headings.iter().find(|h| h.variable_name() == variable)
    }
}
