//! Centralized error types for threatsync.

use thiserror::Error;

/// Main error type for core operations (configuration and snapshot loading).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Why a single graph record could not be turned into a destination row.
///
/// These never abort a phase; the migrator records them against the row.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("missing required property '{0}'")]
    MissingField(&'static str),

    #[error("property '{field}' has the wrong type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("property '{field}' is not a valid timestamp: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("property '{field}' is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("'{start}' is after '{end}'")]
    InvertedWindow {
        start: &'static str,
        end: &'static str,
    },

    #[error("unknown sophistication level '{0}'")]
    UnknownSophistication(String),

    #[error("malformed STIX identifier '{0}'")]
    MalformedStixId(String),
}
