//! `${...}` placeholder grammar and its recursive parser
//!
//! A value is a sequence of literal runs and variable references. A variable
//! reference is `${name}`, `${name:default}`, `${name:?}` (required key) or
//! `${name:!}` (required key, non-empty value). Defaults are themselves
//! expressions and may nest to arbitrary depth. Names run to the first `:`
//! or `}`; a `${` inside a name is a parse error; dynamic names are
//! deliberately unsupported.
//!
//! The scanner walks Unicode scalar values with a byte cursor so multi-byte
//! literal text survives round trips untouched.

mod resolver;

pub use resolver::Resolver;

use crate::error::{ConfigError, Result};
use crate::snapshot::ResolvedEntry;

/// Lookup contract the resolution step runs against. Settings reference
/// each other through this, not only already-resolved constants.
pub trait ExpressionResolver {
    fn resolve_by_name(&self, name: &str) -> Result<ResolvedEntry>;
}

/// A parsed value expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// A literal run of text
    Literal(String),
    /// Adjacent parts concatenated in order
    Concat(Vec<Expression>),
    /// A `${...}` variable reference
    Variable(VariableExpression),
}

/// One `${name...}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableExpression {
    pub name: String,
    pub default: Option<Box<Expression>>,
    pub required_key: bool,
    pub required_value: bool,
}

impl Expression {
    /// Parse a raw value. Values without `${` short-circuit to a literal.
    pub fn parse(value: &str) -> Result<Expression> {
        if !value.contains("${") {
            return Ok(Expression::Literal(value.to_string()));
        }

        let scanner = Scanner::new(value);
        let (expr, _) = parse_at_depth(scanner, 0)?;
        Ok(expr)
    }

    /// Expand the expression against `resolver`
    pub fn resolve(&self, resolver: &dyn ExpressionResolver) -> Result<String> {
        match self {
            Expression::Literal(text) => Ok(text.clone()),
            Expression::Concat(parts) => {
                let mut result = String::new();
                for part in parts {
                    result.push_str(&part.resolve(resolver)?);
                }
                Ok(result)
            }
            Expression::Variable(var) => var.resolve(resolver),
        }
    }
}

impl VariableExpression {
    fn resolve(&self, resolver: &dyn ExpressionResolver) -> Result<String> {
        match resolver.resolve_by_name(&self.name) {
            Ok(entry) => {
                let resolved = entry.resolved_value.into_string();
                if resolved.is_empty() && self.required_value {
                    return Err(ConfigError::EmptyValue {
                        key: self.name.clone(),
                    });
                }
                Ok(resolved)
            }
            Err(err) if err.is_not_found() => {
                if let Some(default) = &self.default {
                    default.resolve(resolver)
                } else if self.required_key {
                    Err(err)
                } else {
                    // Soft interpolation: an unmarked missing reference
                    // yields an empty string rather than failing.
                    Ok(String::new())
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Byte-position cursor over the input, advancing by whole code points
#[derive(Debug, Clone, Copy)]
struct Scanner<'a> {
    value: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(value: &'a str) -> Self {
        Self { value, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.value[self.pos..]
    }

    fn current(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn matches(&self, other: &str) -> bool {
        self.remaining().starts_with(other)
    }

    /// Advance past the current code point
    fn skip(mut self) -> Self {
        if let Some(c) = self.current() {
            self.pos += c.len_utf8();
        }
        self
    }

    fn skip_over(mut self, other: &str) -> Result<Self> {
        if !self.matches(other) {
            return Err(ConfigError::parse_error(format!(
                "Found: {:?}, Expected: {:?}",
                self.remaining(),
                other
            )));
        }
        self.pos += other.len();
        Ok(self)
    }

    fn slice_from(&self, start: Self) -> &'a str {
        &self.value[start.pos..self.pos]
    }
}

fn parse_at_depth(start: Scanner<'_>, depth: usize) -> Result<(Expression, Scanner<'_>)> {
    let mut s = start;
    let mut parts = Vec::new();

    while let Some(c) = s.current() {
        if s.matches("${") {
            let (var, next) = parse_variable(s, depth + 1)?;
            parts.push(Expression::Variable(var));
            s = next;
        } else if c == '}' && depth > 0 {
            break;
        } else {
            let (lit, next) = parse_literal(s, depth);
            parts.push(Expression::Literal(lit.to_string()));
            s = next;
        }
    }

    let expr = match parts.len() {
        0 => Expression::Literal(String::new()),
        1 => parts.remove(0),
        _ => Expression::Concat(parts),
    };

    Ok((expr, s))
}

fn parse_variable(start: Scanner<'_>, depth: usize) -> Result<(VariableExpression, Scanner<'_>)> {
    let mut s = start.skip_over("${")?;

    let name;
    (name, s) = parse_key_name(s)?;

    let mut default = None;
    let mut required_key = false;
    let mut required_value = false;

    if s.matches(":?}") {
        s = s.skip().skip();
        required_key = true;
    } else if s.matches(":!}") {
        s = s.skip().skip();
        required_key = true;
        required_value = true;
    } else if s.matches(":") {
        s = s.skip();
        let expr;
        (expr, s) = parse_at_depth(s, depth)?;
        default = Some(Box::new(expr));
    }

    s = s.skip_over("}")?;

    Ok((
        VariableExpression {
            name: name.to_string(),
            default,
            required_key,
            required_value,
        },
        s,
    ))
}

fn parse_literal(start: Scanner<'_>, depth: usize) -> (&str, Scanner<'_>) {
    let mut s = start;
    while let Some(c) = s.current() {
        if s.matches("${") || (c == '}' && depth > 0) {
            return (s.slice_from(start), s);
        }
        s = s.skip();
    }
    (s.slice_from(start), s)
}

fn parse_key_name(start: Scanner<'_>) -> Result<(&str, Scanner<'_>)> {
    let mut s = start;
    while let Some(c) = s.current() {
        match c {
            ':' | '}' => return Ok((s.slice_from(start), s)),
            _ => {}
        }
        if s.matches("${") {
            return Err(ConfigError::parse_error(format!(
                "Variable reference inside name: {:?}",
                start.remaining()
            )));
        }
        s = s.skip();
    }
    Ok((s.slice_from(start), s))
}
