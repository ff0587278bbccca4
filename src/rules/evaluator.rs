//! Expression evaluation against a typed context.
//!
//! The evaluator is a pure function of its context: it never mutates state
//! and returns the provenance of every plugin value it consumed next to the
//! numeric result.

use rust_decimal::Decimal;

use crate::error::{RuleError, RuleResult};
use crate::models::Provenance;

use super::ast::{Argument, BinaryOp, Expr, UnaryOp};

/// The value a function or plugin variable resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionValue {
    /// The numeric result.
    pub value: Decimal,
    /// Records the value was derived from.
    pub provenance: Vec<Provenance>,
}

impl FunctionValue {
    /// A value without provenance.
    pub fn plain(value: Decimal) -> Self {
        Self {
            value,
            provenance: Vec::new(),
        }
    }
}

/// Symbol lookups available to the evaluator.
///
/// `None` always means "unresolved"; the evaluator turns it into
/// [`RuleError::UnresolvedReference`] instead of defaulting to zero.
pub trait EvaluationContext {
    /// Amount of a heading, static variable or numeric employee variable.
    fn get_heading_amount(&self, name: &str) -> Option<Decimal>;

    /// Text value of a variable, used by condition comparisons.
    fn get_text(&self, _name: &str) -> Option<String> {
        None
    }

    /// Calls a function token. Plugin variables are called with no arguments.
    fn call_function(&self, name: &str, args: &[Argument]) -> Option<RuleResult<FunctionValue>>;
}

/// The result of evaluating an arithmetic expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluated {
    /// The numeric result.
    pub value: Decimal,
    /// Provenance of plugin values used.
    pub provenance: Vec<Provenance>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Number(Decimal),
    Text(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => !n.is_zero(),
            Value::Text(t) => !t.is_empty(),
        }
    }
}

/// Evaluates an arithmetic expression to a number.
///
/// # Example
///
/// ```
/// use payroll_engine::rules::{evaluate, parse_rule, Argument, EvaluationContext, FunctionValue};
/// use payroll_engine::error::RuleResult;
/// use rust_decimal::Decimal;
///
/// struct Basic;
/// impl EvaluationContext for Basic {
///     fn get_heading_amount(&self, name: &str) -> Option<Decimal> {
///         (name == "__BASIC__").then(|| Decimal::new(15000, 0))
///     }
///     fn call_function(&self, _: &str, _: &[Argument]) -> Option<RuleResult<FunctionValue>> {
///         None
///     }
/// }
///
/// let expr = parse_rule("__BASIC__ + 2000").unwrap();
/// assert_eq!(evaluate(&expr, &Basic).unwrap().value, Decimal::new(17000, 0));
/// ```
pub fn evaluate<C: EvaluationContext + ?Sized>(expr: &Expr, ctx: &C) -> RuleResult<Evaluated> {
    let mut provenance = Vec::new();
    match eval(expr, ctx, &mut provenance)? {
        Value::Number(value) => Ok(Evaluated { value, provenance }),
        Value::Text(_) => Err(evaluation_error("rule produced text instead of a number")),
    }
}

/// Evaluates a condition; non-zero numbers and non-empty text are truthy.
pub fn evaluate_condition<C: EvaluationContext + ?Sized>(
    expr: &Expr,
    ctx: &C,
) -> RuleResult<(bool, Vec<Provenance>)> {
    let mut provenance = Vec::new();
    let value = eval(expr, ctx, &mut provenance)?;
    Ok((value.truthy(), provenance))
}

fn eval<C: EvaluationContext + ?Sized>(
    expr: &Expr,
    ctx: &C,
    provenance: &mut Vec<Provenance>,
) -> RuleResult<Value> {
    match expr {
        Expr::Literal(n) => Ok(Value::Number(*n)),
        Expr::Text(t) => Ok(Value::Text(t.clone())),
        Expr::HeadingRef(name) => {
            if let Some(amount) = ctx.get_heading_amount(name) {
                return Ok(Value::Number(amount));
            }
            if let Some(text) = ctx.get_text(name) {
                return Ok(Value::Text(text));
            }
            call(ctx, name, &[], provenance).map(Value::Number)
        }
        Expr::FuncCall { name, args } => call(ctx, name, args, provenance).map(Value::Number),
        Expr::Unary { op, operand } => {
            let value = eval(operand, ctx, provenance)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-number(value)?)),
                UnaryOp::Not => Ok(boolean(!value.truthy())),
            }
        }
        Expr::BinOp { op, lhs, rhs } => {
            match op {
                BinaryOp::And => {
                    let left = eval(lhs, ctx, provenance)?;
                    if !left.truthy() {
                        return Ok(boolean(false));
                    }
                    let right = eval(rhs, ctx, provenance)?;
                    return Ok(boolean(right.truthy()));
                }
                BinaryOp::Or => {
                    let left = eval(lhs, ctx, provenance)?;
                    if left.truthy() {
                        return Ok(boolean(true));
                    }
                    let right = eval(rhs, ctx, provenance)?;
                    return Ok(boolean(right.truthy()));
                }
                _ => {}
            }

            let left = eval(lhs, ctx, provenance)?;
            let right = eval(rhs, ctx, provenance)?;

            if op.is_arithmetic() {
                return arithmetic(*op, number(left)?, number(right)?).map(Value::Number);
            }

            compare(*op, left, right).map(boolean)
        }
    }
}

fn call<C: EvaluationContext + ?Sized>(
    ctx: &C,
    name: &str,
    args: &[Argument],
    provenance: &mut Vec<Provenance>,
) -> RuleResult<Decimal> {
    let result = ctx
        .call_function(name, args)
        .ok_or_else(|| RuleError::UnresolvedReference {
            name: name.to_string(),
        })??;
    provenance.extend(result.provenance);
    Ok(result.value)
}

fn arithmetic(op: BinaryOp, lhs: Decimal, rhs: Decimal) -> RuleResult<Decimal> {
    let result = match op {
        BinaryOp::Add => lhs.checked_add(rhs),
        BinaryOp::Sub => lhs.checked_sub(rhs),
        BinaryOp::Mul => lhs.checked_mul(rhs),
        BinaryOp::Div => {
            if rhs.is_zero() {
                return Err(evaluation_error("division by zero"));
            }
            lhs.checked_div(rhs)
        }
        BinaryOp::Pow => return power(lhs, rhs),
        _ => None,
    };
    result.ok_or_else(|| evaluation_error(format!("arithmetic overflow in '{}'", op.symbol())))
}

/// Integer exponentiation by squaring.
fn power(base: Decimal, exponent: Decimal) -> RuleResult<Decimal> {
    if !exponent.fract().is_zero() {
        return Err(evaluation_error("fractional exponents are not supported"));
    }
    let overflow = || evaluation_error("arithmetic overflow in '^'");

    let mut remaining = exponent.abs().trunc().mantissa().unsigned_abs();
    let mut factor = base;
    let mut result = Decimal::ONE;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.checked_mul(factor).ok_or_else(overflow)?;
        }
        remaining >>= 1;
        if remaining > 0 {
            factor = factor.checked_mul(factor).ok_or_else(overflow)?;
        }
    }

    if exponent.is_sign_negative() {
        if result.is_zero() {
            return Err(evaluation_error("division by zero"));
        }
        return Decimal::ONE.checked_div(result).ok_or_else(overflow);
    }
    Ok(result)
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> RuleResult<bool> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => Ok(match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            _ => false,
        }),
        (Value::Text(a), Value::Text(b)) => match op {
            BinaryOp::Eq => Ok(a == b),
            BinaryOp::Ne => Ok(a != b),
            _ => Err(evaluation_error(format!(
                "operator '{}' cannot compare text",
                op.symbol()
            ))),
        },
        _ => Err(evaluation_error("cannot compare text with a number")),
    }
}

fn number(value: Value) -> RuleResult<Decimal> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Text(t) => Err(evaluation_error(format!(
            "text \"{}\" used in arithmetic",
            t
        ))),
    }
}

fn boolean(value: bool) -> Value {
    Value::Number(if value { Decimal::ONE } else { Decimal::ZERO })
}

fn evaluation_error(message: impl Into<String>) -> RuleError {
    RuleError::Evaluation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceRecord;
    use crate::rules::{parse_condition, parse_rule};
    use std::collections::HashMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    struct MapContext {
        amounts: HashMap<&'static str, Decimal>,
        texts: HashMap<&'static str, &'static str>,
    }

    impl MapContext {
        fn new() -> Self {
            let mut amounts = HashMap::new();
            amounts.insert("__BASIC__", dec("15000"));
            amounts.insert("__ZERO__", Decimal::ZERO);
            let mut texts = HashMap::new();
            texts.insert("__EMPLOYEE_MARITAL_STATUS__", "Married");
            Self { amounts, texts }
        }
    }

    impl EvaluationContext for MapContext {
        fn get_heading_amount(&self, name: &str) -> Option<Decimal> {
            self.amounts.get(name).copied()
        }

        fn get_text(&self, name: &str) -> Option<String> {
            self.texts.get(name).map(|t| t.to_string())
        }

        fn call_function(&self, name: &str, args: &[Argument]) -> Option<RuleResult<FunctionValue>> {
            match name {
                "__TEST_PLUG_TITLE__" => Some(Ok(FunctionValue {
                    value: dec("100"),
                    provenance: vec![Provenance {
                        value: dec("100"),
                        sources: vec![SourceRecord {
                            model_name: "Test".to_string(),
                            instance_id: "1".to_string(),
                            url: None,
                        }],
                        used_variable_name: name.to_string(),
                        registered_plugin_name: "Test Plug Title".to_string(),
                        registered_plugin_version: "1".to_string(),
                    }],
                })),
                "__DOUBLE__" => Some(match args.first().and_then(Argument::as_number) {
                    Some(n) => Ok(FunctionValue::plain(n * dec("2"))),
                    None => Err(RuleError::InvalidArguments {
                        function: name.to_string(),
                        messages: vec!["number expected".to_string()],
                    }),
                }),
                _ => None,
            }
        }
    }

    fn eval_rule(rule: &str) -> RuleResult<Evaluated> {
        evaluate(&parse_rule(rule).unwrap(), &MapContext::new())
    }

    fn eval_condition(condition: &str) -> RuleResult<bool> {
        evaluate_condition(&parse_condition(condition).unwrap(), &MapContext::new()).map(|r| r.0)
    }

    #[test]
    fn test_heading_reference_arithmetic() {
        assert_eq!(eval_rule("__BASIC__ + 2000").unwrap().value, dec("17000"));
        assert_eq!(eval_rule("__BASIC__ * 0.1").unwrap().value, dec("1500.0"));
        assert_eq!(eval_rule("-(__BASIC__ - 20000) / 2").unwrap().value, dec("2500"));
    }

    #[test]
    fn test_plugin_variable_records_provenance() {
        let result = eval_rule("__TEST_PLUG_TITLE__ * 10").unwrap();
        assert_eq!(result.value, dec("1000"));
        assert_eq!(result.provenance.len(), 1);
        assert_eq!(result.provenance[0].used_variable_name, "__TEST_PLUG_TITLE__");
    }

    #[test]
    fn test_function_call_passes_arguments() {
        assert_eq!(eval_rule("__DOUBLE__(21)").unwrap().value, dec("42"));
        assert!(matches!(
            eval_rule("__DOUBLE__(\"x\")").unwrap_err(),
            RuleError::InvalidArguments { .. }
        ));
    }

    #[test]
    fn test_unknown_token_is_unresolved() {
        match eval_rule("__BONUS__ + 1").unwrap_err() {
            RuleError::UnresolvedReference { name } => assert_eq!(name, "__BONUS__"),
            other => panic!("Expected UnresolvedReference, got {:?}", other),
        }
        assert!(matches!(
            eval_rule("__NOPE__(1)").unwrap_err(),
            RuleError::UnresolvedReference { .. }
        ));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert!(matches!(
            eval_rule("__BASIC__ / __ZERO__").unwrap_err(),
            RuleError::Evaluation { .. }
        ));
    }

    #[test]
    fn test_power() {
        assert_eq!(eval_rule("2 ^ 10").unwrap().value, dec("1024"));
        assert_eq!(eval_rule("2 ^ -2").unwrap().value, dec("0.25"));
        assert_eq!(eval_rule("5 ^ 0").unwrap().value, dec("1"));
        assert!(eval_rule("2 ^ 0.5").is_err());
    }

    #[test]
    fn test_conditions() {
        assert!(eval_condition("__BASIC__ > 10000").unwrap());
        assert!(!eval_condition("__BASIC__ > 10000 and __ZERO__").unwrap());
        assert!(eval_condition("__ZERO__ or __BASIC__ == 15000").unwrap());
        assert!(eval_condition("not __ZERO__").unwrap());
        assert!(eval_condition("__EMPLOYEE_MARITAL_STATUS__ == \"Married\"").unwrap());
        assert!(eval_condition("__EMPLOYEE_MARITAL_STATUS__ != 'Single'").unwrap());
    }

    #[test]
    fn test_short_circuit_skips_unresolved_right_side() {
        assert!(!eval_condition("__ZERO__ and __MISSING__").unwrap());
        assert!(eval_condition("__BASIC__ or __MISSING__").unwrap());
    }

    #[test]
    fn test_text_cannot_be_ordered_or_mixed() {
        assert!(eval_condition("__EMPLOYEE_MARITAL_STATUS__ > 'A'").is_err());
        assert!(eval_condition("__EMPLOYEE_MARITAL_STATUS__ == 1").is_err());
    }
}
