//! The heading rule language.
//!
//! Rules are arithmetic over heading tokens (`__BASIC_SALARY__ * 0.1`),
//! function tokens (`__ANNUAL_AMOUNT__("Bonus")`) and decimal literals.
//! Conditions extend the grammar with comparisons and `and`/`or`/`not`.
//! Text is parsed once into an [`Expr`] tree and evaluated against an
//! [`EvaluationContext`].

mod ast;
mod compiled;
mod evaluator;
mod lexer;
mod parser;
mod validator;

pub use ast::{Argument, BinaryOp, Expr, Reference, UnaryOp};
pub use compiled::{CompiledRule, CompiledVariant, RuleOutcome};
pub use evaluator::{EvaluationContext, Evaluated, FunctionValue, evaluate, evaluate_condition};
pub use parser::{Grammar, parse, parse_condition, parse_rule};
pub use validator::{RuleValidator, STATIC_VARIABLES, employee_variable, is_employee_variable};
