//! Expressions evaluated against events.
//!
//! The redelivery policy uses expressions to derive message ids, filters use
//! them as predicates and the OAuth authenticator decides whether to refresh
//! and retry with them.
//!
//! [`DefaultExpressionResolver`] understands a small language:
//!
//! - paths: `payload`, `payload.a.b`, `attributes.name`, `variables.name`
//!   (or `vars.name`), `correlationId`, `id`; numeric segments index arrays
//! - literals: `'text'`, `"text"`, numbers, `true`, `false`, `null`
//! - operators: `==`, `!=`, `&&` (`and`), `||` (`or`), `!`, parentheses
//!
//! An expression may be wrapped in `#[...]`.

use serde_json::{Number, Value};
use sluice_core::Event;
use thiserror::Error;

/// Errors raised while evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The expression is blank.
    #[error("expression is empty")]
    Empty,

    /// The expression could not be parsed.
    #[error("malformed expression `{expression}`: {message}")]
    Syntax {
        /// The expression.
        expression: String,
        /// What is wrong.
        message: String,
    },

    /// A path starts with an unknown root.
    #[error("unknown expression root `{0}`")]
    UnknownRoot(String),

    /// The payload has no JSON view.
    #[error("an opaque payload cannot be navigated")]
    OpaquePayload,

    /// A string result was expected but the expression evaluated to null.
    #[error("`{0}` evaluated to null")]
    Null(String),

    /// A boolean result was expected.
    #[error("`{expression}` evaluated to `{value}`, not a boolean")]
    NotBoolean {
        /// The expression.
        expression: String,
        /// Its value.
        value: String,
    },
}

/// Resolves expressions against events.
pub trait ExpressionResolver: Send + Sync {
    /// Evaluates `expression` to a JSON value.
    fn evaluate(&self, expression: &str, event: &Event) -> Result<Value, ExpressionError>;

    /// Evaluates `expression` to a string. Null is an error.
    fn resolve(&self, expression: &str, event: &Event) -> Result<String, ExpressionError> {
        match self.evaluate(expression, event)? {
            Value::Null => Err(ExpressionError::Null(expression.to_owned())),
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    /// Evaluates `expression` to a boolean. Null is `false`.
    fn resolve_bool(&self, expression: &str, event: &Event) -> Result<bool, ExpressionError> {
        match self.evaluate(expression, event)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(ExpressionError::NotBoolean {
                expression: expression.to_owned(),
                value: other.to_string(),
            }),
        }
    }
}

/// The built-in expression language.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExpressionResolver;

impl ExpressionResolver for DefaultExpressionResolver {
    fn evaluate(&self, expression: &str, event: &Event) -> Result<Value, ExpressionError> {
        let source = strip_delimiters(expression);
        if source.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let tokens = tokenize(source).map_err(|message| syntax(expression, message))?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            event,
        };
        let value = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(syntax(expression, "unexpected trailing input".into()));
        }
        Ok(value)
    }
}

fn strip_delimiters(expression: &str) -> &str {
    let trimmed = expression.trim();
    trimmed
        .strip_prefix("#[")
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(trimmed)
        .trim()
}

fn syntax(expression: &str, message: String) -> ExpressionError {
    ExpressionError::Syntax {
        expression: expression.to_owned(),
        message,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Path(String),
    Eq,
    Ne,
    And,
    Or,
    Not,
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '=' | '!' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let token = match (c, next) {
                    ('=', Some('=')) => Token::Eq,
                    ('!', Some('=')) => Token::Ne,
                    ('&', Some('&')) => Token::And,
                    ('|', Some('|')) => Token::Or,
                    ('!', _) => {
                        tokens.push(Token::Not);
                        i += 1;
                        continue;
                    }
                    _ => return Err(format!("unexpected `{c}` at {i}")),
                };
                tokens.push(token);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".into()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                text.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || matches!(chars[i], '.' | 'e' | 'E' | '+' | '-'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number: Number = text
                    .parse()
                    .map_err(|_| format!("invalid number `{text}`"))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Path(word),
                });
            }
            other => return Err(format!("unexpected `{other}` at {i}")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    event: &'a Event,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Value, ExpressionError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, ExpressionError> {
        let mut left = self.comparison()?;
        while self.eat(&Token::And) {
            let right = self.comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Value, ExpressionError> {
        let left = self.unary()?;
        if self.eat(&Token::Eq) {
            let right = self.unary()?;
            return Ok(Value::Bool(loose_eq(&left, &right)));
        }
        if self.eat(&Token::Ne) {
            let right = self.unary()?;
            return Ok(Value::Bool(!loose_eq(&left, &right)));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, ExpressionError> {
        if self.eat(&Token::Not) {
            let value = self.unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, ExpressionError> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        match token {
            Some(Token::Literal(value)) => Ok(value),
            Some(Token::Path(path)) => self.lookup(&path),
            Some(Token::Open) => {
                let value = self.or()?;
                if !self.eat(&Token::Close) {
                    return Err(self.error("missing `)`"));
                }
                Ok(value)
            }
            Some(other) => Err(self.error(&format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn error(&self, message: &str) -> ExpressionError {
        ExpressionError::Syntax {
            expression: format!("{:?}", self.tokens),
            message: message.to_owned(),
        }
    }

    fn lookup(&self, path: &str) -> Result<Value, ExpressionError> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let base = match root {
            "payload" => self
                .event
                .payload()
                .to_json()
                .ok_or(ExpressionError::OpaquePayload)?,
            "attributes" => return Ok(lookup_map(self.event.attributes(), segments)),
            "variables" | "vars" => return Ok(lookup_map(self.event.variables(), segments)),
            "correlationId" => Value::String(self.event.context().correlation_id().to_string()),
            "id" => Value::String(self.event.context().id().to_string()),
            other => return Err(ExpressionError::UnknownRoot(other.to_owned())),
        };
        Ok(descend(&base, segments).cloned().unwrap_or(Value::Null))
    }
}

fn lookup_map<'a>(
    map: &std::collections::HashMap<String, Value>,
    mut segments: impl Iterator<Item = &'a str>,
) -> Value {
    let Some(first) = segments.next() else {
        return Value::Object(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    };
    map.get(first)
        .and_then(|value| descend(value, segments))
        .cloned()
        .unwrap_or(Value::Null)
}

fn descend<'v, 'a>(value: &'v Value, segments: impl Iterator<Item = &'a str>) -> Option<&'v Value> {
    segments.fold(Some(value), |current, segment| match current? {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        _ => left == right,
    }
}
