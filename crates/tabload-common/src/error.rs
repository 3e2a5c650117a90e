//! Error types for tabload

use std::path::Path;
use thiserror::Error;

/// Result type alias for tabload operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Main error type for tabload
///
/// `Parse`, `Normalization`, `Materialization` and `Constraint` are scoped to a single file or
/// constraint and never abort a run. `Connection` and `Config` are fatal.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Failed to normalize table '{table}': {message}")]
    Normalization { table: String, message: String },

    #[error("Failed to materialize table '{table}': {message}")]
    Materialization { table: String, message: String },

    #[error("Constraint on {table}.{column} failed: {message}")]
    Constraint {
        table: String,
        column: String,
        message: String,
    },

    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// Create a parse error for a file
    pub fn parse(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Create a normalization error for a table
    pub fn normalization(table: &str, message: impl Into<String>) -> Self {
        Self::Normalization {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create a materialization error for a table
    pub fn materialization(table: &str, message: impl Into<String>) -> Self {
        Self::Materialization {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Create a constraint error for a table column
    pub fn constraint(table: &str, column: &str, message: impl Into<String>) -> Self {
        Self::Constraint {
            table: table.to_string(),
            column: column.to_string(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the error must halt the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Config(_))
    }

    /// Short kind label used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::Normalization { .. } => "normalization",
            Self::Materialization { .. } => "materialization",
            Self::Constraint { .. } => "constraint",
            Self::Connection(_) => "connection",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
