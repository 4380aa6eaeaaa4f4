//! Error types for the configuration engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main error type for configuration resolution and population
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An accessor was called before `Config::load` completed
    #[error("Configuration not loaded")]
    NotLoaded,

    /// A required setting key is absent from the resolved set
    #[error("Missing required setting: {key}")]
    NotFound { key: String },

    /// A layer produced an entry whose normalized name is empty
    #[error("Empty normalized key in {description}")]
    EmptyKey { description: String },

    /// Two entries in one layer collapse to the same normalized name
    #[error("Duplicate normalized name {normalized:?} detected: {first:?} vs {second:?}")]
    DuplicateKey {
        normalized: String,
        first: String,
        second: String,
    },

    /// A `${name:!}` reference resolved to an empty string
    #[error("Empty value for required setting: {key}")]
    EmptyValue { key: String },

    /// Expression resolution re-entered a name that is still being resolved
    #[error("Circular reference detected: {}", chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    /// A resolved value could not be coerced to the requested type
    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    /// Expression grammar violation
    #[error("Expression parse error: {message}")]
    Parse { message: String },

    /// The populator has no decoding strategy for the target shape
    #[error("No populator for type {type_name}")]
    NoPopulator { type_name: &'static str },

    /// A field-level population failure, wrapped with the dotted path
    #[error("Failed to populate {path:?}")]
    Populate {
        path: String,
        #[source]
        source: Box<ConfigError>,
    },

    /// A source failed to load or parse its backing data
    #[error("Source {description}: {message}")]
    Source { description: String, message: String },

    /// File system I/O failure
    #[error("IO error for path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotLoaded,
    NotFound,
    Validation,
    CircularReference,
    InvalidValue,
    Parse,
    Populate,
    Source,
    Io,
}

impl ConfigError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::NotLoaded => ErrorKind::NotLoaded,
            ConfigError::NotFound { .. } => ErrorKind::NotFound,
            ConfigError::EmptyKey { .. } => ErrorKind::Validation,
            ConfigError::DuplicateKey { .. } => ErrorKind::Validation,
            ConfigError::EmptyValue { .. } => ErrorKind::NotFound,
            ConfigError::CircularReference { .. } => ErrorKind::CircularReference,
            ConfigError::InvalidValue { .. } => ErrorKind::InvalidValue,
            ConfigError::Parse { .. } => ErrorKind::Parse,
            ConfigError::NoPopulator { .. } => ErrorKind::Populate,
            ConfigError::Populate { .. } => ErrorKind::Populate,
            ConfigError::Source { .. } => ErrorKind::Source,
            ConfigError::Io { .. } => ErrorKind::Io,
        }
    }

    /// True for key-absent errors that `*_or` accessors and optional fields recover from
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::NotFound { .. })
    }

    /// Create a not-found error for a key
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a type-coercion error
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Create an expression parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a source load error
    pub fn source_error(description: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            description: description.into(),
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap this error with the dotted path at which it occurred
    pub fn at_path(self, path: impl Into<String>) -> Self {
        Self::Populate {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
