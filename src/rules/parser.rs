//! Recursive-descent parser for rules and conditions.
//!
//! Rules accept arithmetic only (`+ - * / ^`, parentheses, numbers and
//! tokens). Conditions additionally accept comparisons, `and`, `or`, `not`
//! and string literals.

use crate::error::{RuleError, RuleResult};

use super::ast::{Argument, BinaryOp, Expr, UnaryOp};
use super::lexer::{tokenize, Keyword, Token, TokenKind};

/// Which flavor of the grammar to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// Arithmetic rule.
    Rule,
    /// Boolean condition.
    Condition,
}

/// Parses an arithmetic rule.
///
/// # Example
///
/// ```
/// use payroll_engine::rules::{parse_rule, Expr};
///
/// let expr = parse_rule("__BASIC__ + 2000").unwrap();
/// assert!(matches!(expr, Expr::BinOp { .. }));
/// assert!(parse_rule("__BASIC__ > 2000").is_err());
/// ```
pub fn parse_rule(input: &str) -> RuleResult<Expr> {
    parse(input, Grammar::Rule)
}

/// Parses a condition.
pub fn parse_condition(input: &str) -> RuleResult<Expr> {
    parse(input, Grammar::Condition)
}

/// Parses `input` with the given grammar.
pub fn parse(input: &str, grammar: Grammar) -> RuleResult<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        grammar,
        end: input.len(),
    };

    if parser.tokens.is_empty() {
        return Err(RuleError::Syntax {
            position: 0,
            message: "empty expression".to_string(),
        });
    }

    let expr = match grammar {
        Grammar::Rule => parser.additive()?,
        Grammar::Condition => parser.or()?,
    };

    if let Some(token) = parser.peek() {
        return Err(parser.unexpected(token));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    grammar: Grammar,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, token: &Token) -> RuleError {
        let is_condition_only = matches!(
            token.kind,
            TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::Keyword(_)
        );
        let message = if self.grammar == Grammar::Rule && is_condition_only {
            format!("{} is only allowed in conditions", token.kind.describe())
        } else {
            format!("unexpected {}", token.kind.describe())
        };
        RuleError::Syntax {
            position: token.position,
            message,
        }
    }

    fn end_of_input(&self) -> RuleError {
        RuleError::Syntax {
            position: self.end,
            message: "unexpected end of expression".to_string(),
        }
    }

    fn or(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&TokenKind::Keyword(Keyword::Or)) {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.not()?;
        while self.eat(&TokenKind::Keyword(Keyword::And)) {
            let rhs = self.not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> RuleResult<Expr> {
        if self.eat(&TokenKind::Keyword(Keyword::Not)) {
            let operand = self.not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> RuleResult<Expr> {
        let lhs = self.additive()?;
        let Some(op) = self.peek_kind().and_then(comparison_op) else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.additive()?;

        if let Some(token) = self.peek() {
            if comparison_op(&token.kind).is_some() {
                return Err(RuleError::Syntax {
                    position: token.position,
                    message: "chained comparisons are not supported".to_string(),
                });
            }
        }

        Ok(binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> RuleResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> RuleResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> RuleResult<Expr> {
        let base = self.primary()?;
        if self.eat(&TokenKind::Caret) {
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> RuleResult<Expr> {
        let token = self.advance().ok_or_else(|| self.end_of_input())?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(n)),
            TokenKind::Text(text) => {
                if self.grammar == Grammar::Rule {
                    return Err(RuleError::Syntax {
                        position: token.position,
                        message: "string literals are only allowed as function arguments"
                            .to_string(),
                    });
                }
                Ok(Expr::Text(text))
            }
            TokenKind::Variable(name) => {
                if self.eat(&TokenKind::LParen) {
                    let args = self.arguments(&name)?;
                    Ok(Expr::FuncCall { name, args })
                } else {
                    Ok(Expr::HeadingRef(name))
                }
            }
            TokenKind::LParen => {
                let inner = match self.grammar {
                    Grammar::Rule => self.additive()?,
                    Grammar::Condition => self.or()?,
                };
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(self.unexpected(&other)),
                    None => Err(self.end_of_input()),
                }
            }
            _ => Err(self.unexpected(&token)),
        }
    }

    fn arguments(&mut self, function: &str) -> RuleResult<Vec<Argument>> {
        let invalid = |message: &str| RuleError::InvalidArguments {
            function: function.to_string(),
            messages: vec![message.to_string()],
        };

        if self.eat(&TokenKind::RParen) {
            return Err(invalid("At least one argument is required."));
        }

        let mut args = Vec::new();
        loop {
            let negative = self.eat(&TokenKind::Minus);
            let token = self.advance().ok_or_else(|| self.end_of_input())?;
            let arg = match token.kind {
                TokenKind::Number(n) => Argument::Number(if negative { -n } else { n }),
                TokenKind::Text(text) if !negative => Argument::Text(text),
                TokenKind::Variable(_) if self.peek_kind() == Some(&TokenKind::LParen) => {
                    return Err(invalid("Argument as function not supported"));
                }
                _ => return Err(invalid("Only string and numerical arguments are supported")),
            };
            args.push(arg);

            match self.advance() {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return Ok(args),
                Some(other) => return Err(self.unexpected(&other)),
                None => return Err(self.end_of_input()),
            }
        }
    }
}

fn comparison_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::Le => Some(BinaryOp::Le),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::Ge => Some(BinaryOp::Ge),
        TokenKind::EqEq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::Ne),
        _ => None,
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::BinOp {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
