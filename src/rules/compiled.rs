//! Heading rules parsed once and executed many times.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::error::RuleResult;
use crate::models::{HeadingRule, Provenance};

use super::ast::{Argument, Expr, Reference};
use super::evaluator::{evaluate, evaluate_condition, EvaluationContext};
use super::parser::{parse_condition, parse_rule};

/// One parsed `{condition, rule, tds_type}` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledVariant {
    /// Parsed condition; `None` for the unconditional default.
    pub condition: Option<Expr>,
    /// Parsed rule expression.
    pub rule: Expr,
    /// Tax slab label.
    pub tds_type: Option<String>,
    /// The rule text as stored.
    pub rule_text: String,
}

/// The value produced by the first matching variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// The numeric result, before any pro-ration.
    pub value: Decimal,
    /// Provenance of plugin values read by the condition and the rule.
    pub provenance: Vec<Provenance>,
    /// Tax slab label of the variant.
    pub tds_type: Option<String>,
    /// Zero-based index of the variant that matched.
    pub variant_index: usize,
    /// The rule text of the variant that matched.
    pub rule_text: String,
}

/// A heading rule with every expression parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    variants: Vec<CompiledVariant>,
}

impl CompiledRule {
    /// Parses every condition and rule of a stored heading rule.
    ///
    /// # Example
    ///
    /// ```
    /// use payroll_engine::models::HeadingRule;
    /// use payroll_engine::rules::CompiledRule;
    ///
    /// let compiled = CompiledRule::compile(&HeadingRule::from("__BASIC__ * 0.1")).unwrap();
    /// assert_eq!(compiled.variants().len(), 1);
    /// assert!(CompiledRule::compile(&HeadingRule::from("__BASIC__ *")).is_err());
    /// ```
    pub fn compile(rule: &HeadingRule) -> RuleResult<Self> {
        let variants = rule
            .variants()
            .into_iter()
            .map(|variant| {
                let condition = match variant.condition.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => Some(parse_condition(text)?),
                    _ => None,
                };
                Ok(CompiledVariant {
                    condition,
                    rule: parse_rule(&variant.rule)?,
                    tds_type: variant.tds_type,
                    rule_text: variant.rule,
                })
            })
            .collect::<RuleResult<Vec<_>>>()?;
        Ok(Self { variants })
    }

    /// The parsed variants in stored order.
    pub fn variants(&self) -> &[CompiledVariant] {
        &self.variants
    }

    /// Executes the first variant whose condition holds.
    ///
    /// Returns `None` when no condition holds and there is no default.
    pub fn execute<C: EvaluationContext + ?Sized>(
        &self,
        ctx: &C,
    ) -> RuleResult<Option<RuleOutcome>> {
        for (index, variant) in self.variants.iter().enumerate() {
            let mut provenance = Vec::new();
            if let Some(condition) = &variant.condition {
                let (holds, used) = evaluate_condition(condition, ctx)?;
                if !holds {
                    continue;
                }
                provenance.extend(used);
            }

            let evaluated = evaluate(&variant.rule, ctx)?;
            provenance.extend(evaluated.provenance);
            return Ok(Some(RuleOutcome {
                value: evaluated.value,
                provenance,
                tds_type: variant.tds_type.clone(),
                variant_index: index,
                rule_text: variant.rule_text.clone(),
            }));
        }
        Ok(None)
    }

    /// Every symbol read by any condition or rule.
    pub fn references(&self) -> BTreeSet<Reference> {
        self.variants
            .iter()
            .flat_map(|v| {
                let mut refs = v.rule.references();
                if let Some(condition) = &v.condition {
                    refs.extend(condition.references());
                }
                refs
            })
            .collect()
    }

    /// Every call of `function` with its literal arguments.
    pub fn calls_of(&self, function: &str) -> Vec<Vec<Argument>> {
        let mut calls = Vec::new();
        for variant in &self.variants {
            collect_calls(&variant.rule, function, &mut calls);
            if let Some(condition) = &variant.condition {
                collect_calls(condition, function, &mut calls);
            }
        }
        calls
    }

    /// Returns true if any variant calls `function`.
    pub fn calls(&self, function: &str) -> bool {
        self.variants.iter().any(|v| {
            v.rule.calls(function) || v.condition.as_ref().is_some_and(|c| c.calls(function))
        })
    }
}

fn collect_calls(expr: &Expr, function: &str, calls: &mut Vec<Vec<Argument>>) {
    match expr {
        Expr::FuncCall { name, args } if name == function => calls.push(args.clone()),
        Expr::Unary { operand, .. } => collect_calls(operand, function, calls),
        Expr::BinOp { lhs, rhs, .. } => {
            collect_calls(lhs, function, calls);
            collect_calls(rhs, function, calls);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionalRule;
    use crate::rules::FunctionValue;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct Salary(Decimal);

    impl EvaluationContext for Salary {
        fn get_heading_amount(&self, name: &str) -> Option<Decimal> {
            (name == "__BASIC__").then_some(self.0)
        }

        fn call_function(&self, _: &str, _: &[Argument]) -> Option<RuleResult<FunctionValue>> {
            None
        }
    }

    fn slab_rule() -> HeadingRule {
        let variant = |condition: Option<&str>, rule: &str, tds: &str| ConditionalRule {
            condition: condition.map(str::to_string),
            rule: rule.to_string(),
            tds_type: Some(tds.to_string()),
            rule_validator: None,
        };
        HeadingRule::Conditional(vec![
            variant(Some("__BASIC__ > 50000"), "__BASIC__ * 0.2", "high"),
            variant(Some("__BASIC__ > 20000"), "__BASIC__ * 0.1", "mid"),
            variant(None, "0", "none"),
        ])
    }

    /// RULE-001: The first variant whose condition holds wins.
    #[test]
    fn test_first_matching_variant_wins() {
        let compiled = CompiledRule::compile(&slab_rule()).unwrap();

        let outcome = compiled.execute(&Salary(dec("60000"))).unwrap().unwrap();
        assert_eq!(outcome.value, dec("12000.0"));
        assert_eq!(outcome.tds_type.as_deref(), Some("high"));
        assert_eq!(outcome.variant_index, 0);

        let outcome = compiled.execute(&Salary(dec("30000"))).unwrap().unwrap();
        assert_eq!(outcome.tds_type.as_deref(), Some("mid"));

        let outcome = compiled.execute(&Salary(dec("100"))).unwrap().unwrap();
        assert_eq!(outcome.value, Decimal::ZERO);
        assert_eq!(outcome.variant_index, 2);
    }

    /// RULE-002: No match and no default yields no outcome.
    #[test]
    fn test_no_match_without_default() {
        let rule = HeadingRule::Conditional(vec![ConditionalRule {
            condition: Some("__BASIC__ > 50000".to_string()),
            rule: "1".to_string(),
            tds_type: None,
            rule_validator: None,
        }]);
        let compiled = CompiledRule::compile(&rule).unwrap();
        assert_eq!(compiled.execute(&Salary(dec("10"))).unwrap(), None);
    }

    #[test]
    fn test_blank_condition_is_default() {
        let rule = HeadingRule::Conditional(vec![ConditionalRule {
            condition: Some("  ".to_string()),
            rule: "7".to_string(),
            tds_type: None,
            rule_validator: None,
        }]);
        let compiled = CompiledRule::compile(&rule).unwrap();
        assert_eq!(compiled.execute(&Salary(dec("10"))).unwrap().unwrap().value, dec("7"));
    }

    #[test]
    fn test_references_and_calls() {
        let compiled = CompiledRule::compile(&HeadingRule::from(
            "__ANNUAL_AMOUNT__(\"Bonus\") + __BASIC__",
        ))
        .unwrap();
        assert!(compiled.calls("__ANNUAL_AMOUNT__"));
        assert_eq!(
            compiled.calls_of("__ANNUAL_AMOUNT__"),
            vec![vec![Argument::Text("Bonus".to_string())]]
        );
        assert!(compiled
            .references()
            .contains(&Reference::Variable("__BASIC__".to_string())));
    }
}
