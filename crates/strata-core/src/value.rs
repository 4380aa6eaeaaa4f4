//! Typed view over one resolved setting value

use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// A fully-resolved setting value with type-coercion helpers.
///
/// Values are always strings on the wire; coercion happens at the access
/// site so that one setting can be read as different types by different
/// consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Value(String);

impl Value {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn int(&self) -> Result<i64> {
        self.0
            .trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::invalid_value(format!("{:?} is not an integer: {e}", self.0)))
    }

    pub fn uint(&self) -> Result<u64> {
        self.0.trim().parse::<u64>().map_err(|e| {
            ConfigError::invalid_value(format!("{:?} is not an unsigned integer: {e}", self.0))
        })
    }

    pub fn float(&self) -> Result<f64> {
        self.0
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::invalid_value(format!("{:?} is not a float: {e}", self.0)))
    }

    pub fn bool(&self) -> Result<bool> {
        match self.0.trim().to_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => Ok(true),
            "0" | "f" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid_value(format!(
                "{:?} is not a boolean",
                self.0
            ))),
        }
    }

    /// Parse a duration like `15s`, `90m` or `1h30m`
    pub fn duration(&self) -> Result<Duration> {
        humantime::parse_duration(self.0.trim())
            .map_err(|e| ConfigError::invalid_value(format!("{:?} is not a duration: {e}", self.0)))
    }

    /// Split the value on `separator`, trimming each element. An empty
    /// value yields an empty list rather than one empty element.
    pub fn string_slice(&self, separator: char) -> Vec<String> {
        if self.0.trim().is_empty() {
            return Vec::new();
        }
        self.0
            .split(separator)
            .map(|s| s.trim().to_string())
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
