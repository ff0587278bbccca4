//! Definition-time validation of heading rules.
//!
//! Rules are checked when a heading is saved, not when payroll runs:
//! syntax, symbol availability, function arguments and the optional
//! numeric constraint of each variant.

use std::collections::BTreeSet;

use crate::calculation::{
    ANNUAL_GROSS_SALARY, REMAINING_DAYS_IN_FY, REMAINING_MONTHS_IN_FY, SLOT_DAYS_COUNT,
};
use crate::error::{EngineError, EngineResult, RuleError};
use crate::models::{variable_name, HeadingRule, NumericRuleValidator};
use crate::plugins::PluginRegistry;

use super::ast::Reference;
use super::compiled::CompiledRule;

/// Variables every pass defines besides headings and employee attributes.
pub const STATIC_VARIABLES: [&str; 4] = [
    SLOT_DAYS_COUNT,
    REMAINING_DAYS_IN_FY,
    REMAINING_MONTHS_IN_FY,
    ANNUAL_GROSS_SALARY,
];

const EMPLOYEE_PREFIX: &str = "__EMPLOYEE_";

/// The token an employee attribute is exposed as.
///
/// ```
/// use payroll_engine::rules::employee_variable;
///
/// assert_eq!(employee_variable("marital_status"), "__EMPLOYEE_MARITAL_STATUS__");
/// ```
pub fn employee_variable(attribute: &str) -> String {
    variable_name(&format!("employee {}", attribute))
}

/// Returns true for `__EMPLOYEE_<ATTRIBUTE>__` tokens.
pub fn is_employee_variable(token: &str) -> bool {
    token.starts_with(EMPLOYEE_PREFIX) && token.len() > EMPLOYEE_PREFIX.len() + 2
}

/// Validates heading rules against the symbols available to a package.
#[derive(Debug)]
pub struct RuleValidator<'a> {
    registry: &'a PluginRegistry,
    variables: BTreeSet<String>,
}

impl<'a> RuleValidator<'a> {
    /// A validator knowing the static variables and the registry's plugins.
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self {
            registry,
            variables: STATIC_VARIABLES.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Adds heading tokens the rules may reference.
    pub fn with_variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Validates a heading rule and returns it compiled.
    pub fn validate(&self, heading: &str, rule: &HeadingRule) -> EngineResult<CompiledRule> {
        let compiled = CompiledRule::compile(rule).map_err(|e| EngineError::rule(heading, e))?;

        for reference in compiled.references() {
            self.check_reference(&compiled, &reference)
                .map_err(|e| EngineError::rule(heading, e))?;
        }

        for variant in rule.variants() {
            if let Some(validator) = &variant.rule_validator {
                let messages = numeric_messages(validator, &variant.rule);
                if !messages.is_empty() {
                    return Err(EngineError::InvalidHeading {
                        heading: heading.to_string(),
                        field: "rule".to_string(),
                        message: messages.join("; "),
                    });
                }
            }
        }

        Ok(compiled)
    }

    fn check_reference(&self, compiled: &CompiledRule, reference: &Reference) -> Result<(), RuleError> {
        match reference {
            Reference::Variable(name) => {
                if self.variables.contains(name) || is_employee_variable(name) {
                    return Ok(());
                }
                match self.registry.resolve(name) {
                    Some(plugin) if plugin.is_function() => Err(RuleError::InvalidArguments {
                        function: name.clone(),
                        messages: vec!["At least one argument is required.".to_string()],
                    }),
                    Some(_) => Ok(()),
                    None => Err(RuleError::UnresolvedReference { name: name.clone() }),
                }
            }
            Reference::Function { name, .. } => {
                let plugin = self
                    .registry
                    .resolve(name)
                    .ok_or_else(|| RuleError::UnresolvedReference { name: name.clone() })?;
                if !plugin.is_function() {
                    return Err(RuleError::InvalidArguments {
                        function: name.clone(),
                        messages: vec![format!("{} does not accept arguments", name)],
                    });
                }
                for args in compiled.calls_of(name) {
                    let messages = plugin.validate_args(&args);
                    if !messages.is_empty() {
                        return Err(RuleError::InvalidArguments {
                            function: name.clone(),
                            messages,
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

fn numeric_messages(validator: &NumericRuleValidator, rule: &str) -> Vec<String> {
    let mut messages = Vec::new();
    if !validator.number_only {
        return messages;
    }

    let value = rule.trim().parse::<rust_decimal::Decimal>().ok();
    if value.is_none() {
        messages.push("Please provide float type input".to_string());
    }

    if validator.has_range {
        match (validator.min, validator.max, value) {
            (Some(min), Some(max), Some(value)) => {
                if value < min || value > max {
                    messages.push("Number out of given range".to_string());
                }
            }
            (Some(_), Some(_), None) => {}
            _ => messages.push("Please provide minimum and maximum range.".to_string()),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionalRule;
    use rust_decimal::Decimal;

    fn validator(registry: &PluginRegistry) -> RuleValidator<'_> {
        RuleValidator::new(registry).with_variables(["__BASIC_SALARY__", "__BONUS__"])
    }

    fn numeric_rule(rule: &str, numeric: NumericRuleValidator) -> HeadingRule {
        HeadingRule::Conditional(vec![ConditionalRule {
            condition: None,
            rule: rule.to_string(),
            tds_type: None,
            rule_validator: Some(numeric),
        }])
    }

    fn rule_error(result: EngineResult<CompiledRule>) -> RuleError {
        match result {
            Err(EngineError::Rule { source, .. }) => source,
            Err(other) => panic!("Expected Rule error, got {:?}", other),
            Ok(_) => panic!("Expected Rule error, got a compiled rule"),
        }
    }

    #[test]
    fn test_accepts_known_symbols() {
        let registry = PluginRegistry::standard();
        let v = validator(&registry);
        assert!(v
            .validate(
                "Allowance",
                &HeadingRule::from(
                    "__BASIC_SALARY__ * 0.1 + __DUTY_STATION__ + __ANNUAL_AMOUNT__(\"Bonus\")"
                )
            )
            .is_ok());
        assert!(v
            .validate("Tax", &HeadingRule::from("__ANNUAL_GROSS_SALARY__ * 0.01"))
            .is_ok());
        assert!(v
            .validate("Grade", &HeadingRule::from("__EMPLOYEE_GRADE__ * 100"))
            .is_ok());
    }

    #[test]
    fn test_rejects_unknown_symbol() {
        let registry = PluginRegistry::standard();
        match rule_error(validator(&registry).validate("Allowance", &HeadingRule::from("__HOUSE__ + 1"))) {
            RuleError::UnresolvedReference { name } => assert_eq!(name, "__HOUSE__"),
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_syntax_errors() {
        let registry = PluginRegistry::standard();
        assert!(matches!(
            rule_error(validator(&registry).validate("Allowance", &HeadingRule::from("__BONUS__ +"))),
            RuleError::Syntax { .. }
        ));
    }

    #[test]
    fn test_function_used_as_variable_needs_arguments() {
        let registry = PluginRegistry::standard();
        match rule_error(validator(&registry).validate("A", &HeadingRule::from("__ANNUAL_AMOUNT__"))) {
            RuleError::InvalidArguments { messages, .. } => {
                assert_eq!(messages, vec!["At least one argument is required.".to_string()])
            }
            other => panic!("Expected InvalidArguments, got {:?}", other),
        }
    }

    #[test]
    fn test_plugin_argument_validator_runs() {
        let registry = PluginRegistry::standard();
        assert!(matches!(
            rule_error(validator(&registry).validate("A", &HeadingRule::from("__ANNUAL_AMOUNT__(12)"))),
            RuleError::InvalidArguments { .. }
        ));
        assert!(matches!(
            rule_error(validator(&registry).validate("A", &HeadingRule::from("__DUTY_STATION__(1)"))),
            RuleError::InvalidArguments { .. }
        ));
    }

    #[test]
    fn test_numeric_rule_validator_messages() {
        let registry = PluginRegistry::standard();
        let v = validator(&registry);
        let ranged = NumericRuleValidator {
            number_only: true,
            has_range: true,
            min: Some(Decimal::new(10, 0)),
            max: Some(Decimal::new(100, 0)),
        };

        assert!(v.validate("Fixed", &numeric_rule("50", ranged.clone())).is_ok());

        let message = |result: EngineResult<CompiledRule>| match result {
            Err(EngineError::InvalidHeading { message, .. }) => message,
            other => panic!("Expected InvalidHeading, got {:?}", other.map(|_| ())),
        };

        assert_eq!(
            message(v.validate("Fixed", &numeric_rule("500", ranged.clone()))),
            "Number out of given range"
        );
        assert_eq!(
            message(v.validate("Fixed", &numeric_rule("__BONUS__", ranged))),
            "Please provide float type input"
        );
        assert_eq!(
            message(v.validate(
                "Fixed",
                &numeric_rule(
                    "5",
                    NumericRuleValidator {
                        number_only: true,
                        has_range: true,
                        min: None,
                        max: None,
                    }
                )
            )),
            "Please provide minimum and maximum range."
        );
    }
}
