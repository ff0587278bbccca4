//! Tagged syntax tree for heading rules and conditions.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A literal argument passed to a function token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    /// A numeric literal.
    Number(Decimal),
    /// A quoted string literal.
    Text(String),
}

impl Argument {
    /// The argument as text, if it is a string literal.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Argument::Text(text) => Some(text),
            Argument::Number(_) => None,
        }
    }

    /// The argument as a number, if it is a numeric literal.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Argument::Number(n) => Some(*n),
            Argument::Text(_) => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Number(n) => write!(f, "{}", n),
            Argument::Text(t) => write!(f, "\"{}\"", t),
        }
    }
}

/// Binary operators, arithmetic first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinaryOp {
    /// True for `+ - * / ^`.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow
        )
    }

    /// The operator as written in rule text.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation (conditions only).
    Not,
}

/// A parsed rule or condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A decimal literal.
    Literal(Decimal),
    /// A string literal (conditions only).
    Text(String),
    /// A `__NAME__` token: heading, static or employee variable, or plugin variable.
    HeadingRef(String),
    /// A `__NAME__(args)` function token.
    FuncCall {
        /// The function token, sentinels included.
        name: String,
        /// Literal arguments.
        args: Vec<Argument>,
    },
    /// A prefix operator.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// Its operand.
        operand: Box<Expr>,
    },
    /// An infix operator.
    BinOp {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

/// A symbol an expression reads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    /// A `__NAME__` variable token.
    Variable(String),
    /// A `__NAME__(...)` call, with its arguments rendered for ordering.
    Function {
        /// The function token.
        name: String,
        /// The call's arguments.
        args: Vec<String>,
    },
}

impl Expr {
    /// Every variable and function the expression reads.
    pub fn references(&self) -> BTreeSet<Reference> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut BTreeSet<Reference>) {
        match self {
            Expr::Literal(_) | Expr::Text(_) => {}
            Expr::HeadingRef(name) => {
                refs.insert(Reference::Variable(name.clone()));
            }
            Expr::FuncCall { name, args } => {
                refs.insert(Reference::Function {
                    name: name.clone(),
                    args: args.iter().map(|a| match a {
                        Argument::Text(t) => t.clone(),
                        Argument::Number(n) => n.to_string(),
                    }).collect(),
                });
            }
            Expr::Unary { operand, .. } => operand.collect_references(refs),
            Expr::BinOp { lhs, rhs, .. } => {
                lhs.collect_references(refs);
                rhs.collect_references(refs);
            }
        }
    }

    /// Returns true if the expression calls the named function.
    pub fn calls(&self, function: &str) -> bool {
        self.references()
            .iter()
            .any(|r| matches!(r, Reference::Function { name, .. } if name == function))
    }

    /// The literal value, if the expression is a plain (possibly negated) number.
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Expr::Literal(n) => Some(*n),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.as_number().map(|n| -n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_collects_variables_and_functions() {
        let expr = Expr::BinOp {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::HeadingRef("__BASIC__".to_string())),
            rhs: Box::new(Expr::FuncCall {
                name: "__ANNUAL_AMOUNT__".to_string(),
                args: vec![Argument::Text("Bonus".to_string())],
            }),
        };
        let refs = expr.references();
        assert!(refs.contains(&Reference::Variable("__BASIC__".to_string())));
        assert!(expr.calls("__ANNUAL_AMOUNT__"));
        assert!(!expr.calls("__DUTY_STATION__"));
    }

    #[test]
    fn test_as_number_handles_negation() {
        let expr = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(Expr::Literal(Decimal::new(5, 0))),
        };
        assert_eq!(expr.as_number(), Some(Decimal::new(-5, 0)));
        assert_eq!(Expr::HeadingRef("__A__".into()).as_number(), None);
    }
}
