//! Heading definitions and their rule shapes.
//!
//! A heading is one named salary component (Basic Salary, Tax Deduction, ...)
//! described by a rule, a type tag, a duration unit and the flags that control
//! how attendance affects it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The type tag of a heading.
///
/// Accepts both the snake_case form and the display form used by stored
/// configuration (`"Extra Addition"`, `"Tax Deduction"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingType {
    /// Regular earning, pro-rated by attendance.
    #[serde(alias = "Addition")]
    Addition,
    /// Regular deduction, pro-rated by attendance.
    #[serde(alias = "Deduction")]
    Deduction,
    /// Constant value that may carry a duration unit.
    #[serde(alias = "Type1Cnst")]
    Type1Cnst,
    /// Constant value without a duration unit.
    #[serde(alias = "Type2Cnst")]
    Type2Cnst,
    /// One-off earning applied after the primary pass.
    #[serde(alias = "Extra Addition")]
    ExtraAddition,
    /// One-off deduction applied after the primary pass.
    #[serde(alias = "Extra Deduction")]
    ExtraDeduction,
    /// Tax withheld for the period.
    #[serde(alias = "Tax Deduction")]
    TaxDeduction,
}

impl HeadingType {
    /// Returns the display label used in stored configuration.
    pub fn label(&self) -> &'static str {
        match self {
            HeadingType::Addition => "Addition",
            HeadingType::Deduction => "Deduction",
            HeadingType::Type1Cnst => "Type1Cnst",
            HeadingType::Type2Cnst => "Type2Cnst",
            HeadingType::ExtraAddition => "Extra Addition",
            HeadingType::ExtraDeduction => "Extra Deduction",
            HeadingType::TaxDeduction => "Tax Deduction",
        }
    }

    /// True for `Addition` and `Deduction`.
    pub fn is_addition_or_deduction(&self) -> bool {
        matches!(self, HeadingType::Addition | HeadingType::Deduction)
    }

    /// True for the constant types.
    pub fn is_constant(&self) -> bool {
        matches!(self, HeadingType::Type1Cnst | HeadingType::Type2Cnst)
    }

    /// True for `ExtraAddition` and `ExtraDeduction`.
    pub fn is_extra(&self) -> bool {
        matches!(self, HeadingType::ExtraAddition | HeadingType::ExtraDeduction)
    }

    /// True for `TaxDeduction`.
    pub fn is_tax_deduction(&self) -> bool {
        matches!(self, HeadingType::TaxDeduction)
    }

    /// True for the types corrected by backdated calculations.
    pub fn is_backdated_diffable(&self) -> bool {
        matches!(
            self,
            HeadingType::Addition
                | HeadingType::Deduction
                | HeadingType::ExtraAddition
                | HeadingType::ExtraDeduction
        )
    }

    /// True for types that add to the employee's earnings.
    pub fn is_earning(&self) -> bool {
        matches!(self, HeadingType::Addition | HeadingType::ExtraAddition)
    }

    /// True for types that reduce the employee's earnings (tax excluded).
    pub fn is_deduction(&self) -> bool {
        matches!(self, HeadingType::Deduction | HeadingType::ExtraDeduction)
    }

    /// Fields that must stay empty for this type.
    pub fn null_fields(&self) -> &'static [HeadingField] {
        match self {
            HeadingType::Addition | HeadingType::Deduction => &[],
            HeadingType::ExtraAddition | HeadingType::ExtraDeduction => {
                &[HeadingField::DurationUnit, HeadingField::AbsentDaysImpact]
            }
            HeadingType::TaxDeduction => &[
                HeadingField::DurationUnit,
                HeadingField::Taxable,
                HeadingField::AbsentDaysImpact,
            ],
            HeadingType::Type1Cnst => &[HeadingField::Taxable, HeadingField::AbsentDaysImpact],
            HeadingType::Type2Cnst => &[
                HeadingField::DurationUnit,
                HeadingField::Taxable,
                HeadingField::AbsentDaysImpact,
            ],
        }
    }

    /// Whether this type requires a duration unit.
    pub fn requires_duration_unit(&self) -> bool {
        matches!(
            self,
            HeadingType::Addition | HeadingType::Deduction | HeadingType::Type1Cnst
        )
    }
}

/// Nullable heading fields constrained by [`HeadingType::null_fields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingField {
    /// `duration_unit`
    DurationUnit,
    /// `taxable`
    Taxable,
    /// `absent_days_impact`
    AbsentDaysImpact,
}

impl HeadingField {
    /// The serialized field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HeadingField::DurationUnit => "duration_unit",
            HeadingField::Taxable => "taxable",
            HeadingField::AbsentDaysImpact => "absent_days_impact",
        }
    }
}

/// How a heading's rule value relates to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    /// The rule value is a monthly figure.
    #[serde(alias = "Monthly")]
    Monthly,
    /// The rule value is paid per payable day.
    #[serde(alias = "Daily")]
    Daily,
}

/// Optional numeric constraint attached to a rule variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericRuleValidator {
    /// The rule must be a plain number.
    #[serde(default)]
    pub number_only: bool,
    /// The number must fall within `[min, max]`.
    #[serde(default)]
    pub has_range: bool,
    /// Lower bound when `has_range` is set.
    #[serde(default)]
    pub min: Option<Decimal>,
    /// Upper bound when `has_range` is set.
    #[serde(default)]
    pub max: Option<Decimal>,
}

/// One `{condition, rule, tds_type}` variant of a conditional rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRule {
    /// Condition expression; `None` marks the unconditional default.
    #[serde(default)]
    pub condition: Option<String>,
    /// Rule expression executed when the condition holds.
    pub rule: String,
    /// Tax slab label recorded on tax rows.
    #[serde(default)]
    pub tds_type: Option<String>,
    /// Optional numeric constraint checked at definition time.
    #[serde(default)]
    pub rule_validator: Option<NumericRuleValidator>,
}

/// The stored form of a heading rule.
///
/// # Example
///
/// ```
/// use payroll_engine::models::HeadingRule;
///
/// let rule: HeadingRule = serde_json::from_str(r#""__BASIC_SALARY__ * 0.1""#).unwrap();
/// assert_eq!(rule.variants().len(), 1);
///
/// let rule: HeadingRule = serde_json::from_str(
///     r#"[{"condition": "__BASIC_SALARY__ > 1000", "rule": "100"}, {"rule": "0"}]"#,
/// )
/// .unwrap();
/// assert_eq!(rule.variants().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeadingRule {
    /// A single arithmetic expression.
    Expression(String),
    /// An ordered list of conditional variants.
    Conditional(Vec<ConditionalRule>),
}

impl HeadingRule {
    /// Returns the rule as a list of variants.
    ///
    /// A plain expression becomes a single unconditional variant.
    pub fn variants(&self) -> Vec<ConditionalRule> {
        match self {
            HeadingRule::Expression(rule) => vec![ConditionalRule {
                condition: None,
                rule: rule.clone(),
                tds_type: None,
                rule_validator: None,
            }],
            HeadingRule::Conditional(variants) => variants.clone(),
        }
    }

    /// Every expression text in the rule, conditions included.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            HeadingRule::Expression(rule) => vec![rule.as_str()],
            HeadingRule::Conditional(variants) => variants
                .iter()
                .flat_map(|v| v.condition.as_deref().into_iter().chain([v.rule.as_str()]))
                .collect(),
        }
    }
}

impl From<&str> for HeadingRule {
    fn from(rule: &str) -> Self {
        HeadingRule::Expression(rule.to_string())
    }
}

/// Converts a heading name to its calculator variable token.
///
/// The name is uppercased and every run of non-alphanumeric characters is
/// collapsed to a single `_`.
///
/// # Example
///
/// ```
/// use payroll_engine::models::variable_name;
///
/// assert_eq!(variable_name("Basic Salary"), "__BASIC_SALARY__");
/// assert_eq!(variable_name("Dearness - allowance"), "__DEARNESS_ALLOWANCE__");
/// ```
pub fn variable_name(name: &str) -> String {
    let words: Vec<String> = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect();
    format!("__{}__", words.join("_"))
}

/// A configured salary component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingDefinition {
    /// Unique identifier for the heading.
    pub id: String,
    /// Human-readable name; its variable token is derived from it.
    pub name: String,
    /// Organization owning the heading.
    #[serde(default)]
    pub organization: String,
    /// The heading's rule.
    #[serde(alias = "rules")]
    pub rule: HeadingRule,
    /// The heading's type tag.
    #[serde(rename = "type")]
    pub heading_type: HeadingType,
    /// How the rule value relates to time.
    #[serde(default)]
    pub duration_unit: Option<DurationUnit>,
    /// Whether the heading contributes to taxable income.
    #[serde(default)]
    pub taxable: Option<bool>,
    /// Whether absences reduce the heading.
    #[serde(default)]
    pub absent_days_impact: Option<bool>,
    /// Daily headings skip paid leave days.
    #[serde(default)]
    pub deduct_amount_on_leave: bool,
    /// Daily headings pay holidays and off-days only when present.
    #[serde(default)]
    pub pay_when_present_holiday_offday: bool,
    /// Whether the heading's identity may still change.
    #[serde(default = "default_editable")]
    pub is_editable: bool,
}

fn default_editable() -> bool {
    true
}

impl HeadingDefinition {
    /// Returns the variable token for this heading.
    pub fn variable_name(&self) -> String {
        variable_name(&self.name)
    }

    /// Checks the type-dependent null and required fields.
    pub fn validate_fields(&self) -> EngineResult<()> {
        check_type_fields(
            &self.name,
            self.heading_type,
            self.duration_unit,
            self.taxable,
            self.absent_days_impact,
        )
    }
}

/// Validates nullable fields against a heading type.
pub(crate) fn check_type_fields(
    name: &str,
    heading_type: HeadingType,
    duration_unit: Option<DurationUnit>,
    taxable: Option<bool>,
    absent_days_impact: Option<bool>,
) -> EngineResult<()> {
    for field in heading_type.null_fields() {
        let is_set = match field {
            HeadingField::DurationUnit => duration_unit.is_some(),
            HeadingField::Taxable => taxable.is_some(),
            HeadingField::AbsentDaysImpact => absent_days_impact.is_some(),
        };
        if is_set {
            return Err(EngineError::InvalidHeading {
                heading: name.to_string(),
                field: field.as_str().to_string(),
                message: format!("must be empty for {} headings", heading_type.label()),
            });
        }
    }

    if heading_type.requires_duration_unit() && duration_unit.is_none() {
        return Err(EngineError::InvalidHeading {
            heading: name.to_string(),
            field: HeadingField::DurationUnit.as_str().to_string(),
            message: format!("is required for {} headings", heading_type.label()),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(heading_type: HeadingType) -> HeadingDefinition {
        HeadingDefinition {
            id: "h1".to_string(),
            name: "Basic Salary".to_string(),
            organization: "org".to_string(),
            rule: HeadingRule::from("15000"),
            heading_type,
            duration_unit: None,
            taxable: None,
            absent_days_impact: None,
            deduct_amount_on_leave: false,
            pay_when_present_holiday_offday: false,
            is_editable: true,
        }
    }

    #[test]
    fn test_variable_name_collapses_separators() {
        assert_eq!(variable_name("basic salary"), "__BASIC_SALARY__");
        assert_eq!(variable_name("  Basic   Salary "), "__BASIC_SALARY__");
        assert_eq!(variable_name("Tax-Deduction 2"), "__TAX_DEDUCTION_2__");
    }

    #[test]
    fn test_heading_type_accepts_display_labels() {
        let t: HeadingType = serde_json::from_str("\"Extra Addition\"").unwrap();
        assert_eq!(t, HeadingType::ExtraAddition);
        let t: HeadingType = serde_json::from_str("\"tax_deduction\"").unwrap();
        assert_eq!(t, HeadingType::TaxDeduction);
    }

    #[test]
    fn test_backdated_diffable_types() {
        assert!(HeadingType::Addition.is_backdated_diffable());
        assert!(HeadingType::ExtraDeduction.is_backdated_diffable());
        assert!(!HeadingType::Type1Cnst.is_backdated_diffable());
        assert!(!HeadingType::TaxDeduction.is_backdated_diffable());
    }

    #[test]
    fn test_tax_deduction_rejects_taxable_flag() {
        let mut h = heading(HeadingType::TaxDeduction);
        h.taxable = Some(true);
        match h.validate_fields().unwrap_err() {
            EngineError::InvalidHeading { field, .. } => assert_eq!(field, "taxable"),
            other => panic!("Expected InvalidHeading, got {:?}", other),
        }
    }

    #[test]
    fn test_addition_requires_duration_unit() {
        let h = heading(HeadingType::Addition);
        match h.validate_fields().unwrap_err() {
            EngineError::InvalidHeading { field, message, .. } => {
                assert_eq!(field, "duration_unit");
                assert!(message.contains("required"));
            }
            other => panic!("Expected InvalidHeading, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_addition_without_duration_is_valid() {
        let mut h = heading(HeadingType::ExtraAddition);
        h.taxable = Some(true);
        assert!(h.validate_fields().is_ok());
    }

    #[test]
    fn test_conditional_rule_texts_include_conditions() {
        let rule = HeadingRule::Conditional(vec![
            ConditionalRule {
                condition: Some("__A__ > 1".to_string()),
                rule: "__B__".to_string(),
                tds_type: None,
                rule_validator: None,
            },
            ConditionalRule {
                condition: None,
                rule: "0".to_string(),
                tds_type: None,
                rule_validator: None,
            },
        ]);
        assert_eq!(rule.texts(), vec!["__A__ > 1", "__B__", "0"]);
    }

    #[test]
    fn test_heading_deserializes_from_stored_shape() {
        let json = r#"{
            "id": "h2",
            "name": "Tax",
            "rules": "2000",
            "type": "Tax Deduction"
        }"#;
        let h: HeadingDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(h.heading_type, HeadingType::TaxDeduction);
        assert!(h.is_editable);
        assert_eq!(h.variable_name(), "__TAX__");
    }
}
