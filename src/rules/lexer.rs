//! Tokenizer for rule text.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{RuleError, RuleResult};

/// A lexical token with its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Number(Decimal),
    Text(String),
    Variable(String),
    Keyword(Keyword),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    And,
    Or,
    Not,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Text(t) => format!("string \"{}\"", t),
            TokenKind::Variable(v) => format!("token {}", v),
            TokenKind::Keyword(Keyword::And) => "'and'".to_string(),
            TokenKind::Keyword(Keyword::Or) => "'or'".to_string(),
            TokenKind::Keyword(Keyword::Not) => "'not'".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Caret => "'^'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
        }
    }
}

/// Splits rule text into tokens.
pub(crate) fn tokenize(input: &str) -> RuleResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let kind = match c {
            b'+' => single(&mut pos, TokenKind::Plus),
            b'-' => single(&mut pos, TokenKind::Minus),
            b'*' => single(&mut pos, TokenKind::Star),
            b'/' => single(&mut pos, TokenKind::Slash),
            b'^' => single(&mut pos, TokenKind::Caret),
            b'(' => single(&mut pos, TokenKind::LParen),
            b')' => single(&mut pos, TokenKind::RParen),
            b',' => single(&mut pos, TokenKind::Comma),
            b'<' | b'>' | b'=' | b'!' => {
                let followed_by_eq = bytes.get(pos + 1) == Some(&b'=');
                pos += if followed_by_eq { 2 } else { 1 };
                match (c, followed_by_eq) {
                    (b'<', false) => TokenKind::Lt,
                    (b'<', true) => TokenKind::Le,
                    (b'>', false) => TokenKind::Gt,
                    (b'>', true) => TokenKind::Ge,
                    (b'=', true) => TokenKind::EqEq,
                    (b'!', true) => TokenKind::NotEq,
                    _ => {
                        return Err(syntax(start, format!("unexpected character '{}'", c as char)));
                    }
                }
            }
            b'"' | b'\'' => {
                let quote = c;
                pos += 1;
                let text_start = pos;
                while pos < bytes.len() && bytes[pos] != quote {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err(syntax(start, "unterminated string literal"));
                }
                let text = input[text_start..pos].to_string();
                pos += 1;
                TokenKind::Text(text)
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                let literal = &input[start..pos];
                let number = Decimal::from_str(literal)
                    .map_err(|_| syntax(start, format!("invalid number '{}'", literal)))?;
                TokenKind::Number(number)
            }
            b'_' | b'A'..=b'Z' | b'a'..=b'z' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                let word = &input[start..pos];
                match word {
                    "and" => TokenKind::Keyword(Keyword::And),
                    "or" => TokenKind::Keyword(Keyword::Or),
                    "not" => TokenKind::Keyword(Keyword::Not),
                    _ if is_variable_token(word) => TokenKind::Variable(word.to_string()),
                    _ => return Err(syntax(start, format!("unknown identifier '{}'", word))),
                }
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{}'", ch)));
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

/// Returns true for `__NAME__` tokens with an uppercase alphanumeric body.
pub(crate) fn is_variable_token(word: &str) -> bool {
    word.len() > 4
        && word.starts_with("__")
        && word.ends_with("__")
        && word[2..word.len() - 2]
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        && word[2..word.len() - 2]
            .bytes()
            .any(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn single(pos: &mut usize, kind: TokenKind) -> TokenKind {
    *pos += 1;
    kind
}

fn syntax(position: usize, message: impl Into<String>) -> RuleError {
    RuleError::Syntax {
        position,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenizes_arithmetic_with_variables() {
        assert_eq!(
            kinds("__BASIC_SALARY__ * 0.1 + 2000"),
            vec![
                TokenKind::Variable("__BASIC_SALARY__".to_string()),
                TokenKind::Star,
                TokenKind::Number(Decimal::new(1, 1)),
                TokenKind::Plus,
                TokenKind::Number(Decimal::new(2000, 0)),
            ]
        );
    }

    #[test]
    fn test_tokenizes_comparisons_and_keywords() {
        assert_eq!(
            kinds("__A__ >= 1 and not __B__ != 'x'"),
            vec![
                TokenKind::Variable("__A__".to_string()),
                TokenKind::Ge,
                TokenKind::Number(Decimal::ONE),
                TokenKind::Keyword(Keyword::And),
                TokenKind::Keyword(Keyword::Not),
                TokenKind::Variable("__B__".to_string()),
                TokenKind::NotEq,
                TokenKind::Text("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejects_lowercase_identifiers() {
        match tokenize("basic + 1").unwrap_err() {
            RuleError::Syntax { position, message } => {
                assert_eq!(position, 0);
                assert!(message.contains("basic"));
            }
            other => panic!("Expected Syntax, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unterminated_string() {
        assert!(matches!(
            tokenize("__F__(\"abc").unwrap_err(),
            RuleError::Syntax { position: 6, .. }
        ));
    }

    #[test]
    fn test_rejects_malformed_number() {
        assert!(tokenize("1.2.3").is_err());
    }

    #[test]
    fn test_variable_token_shape() {
        assert!(is_variable_token("__A__"));
        assert!(is_variable_token("__TAX_2__"));
        assert!(!is_variable_token("____"));
        assert!(!is_variable_token("__a__"));
        assert!(!is_variable_token("_A_"));
    }
}
