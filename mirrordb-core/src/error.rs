//! Error types for MirrorDB operations

use std::fmt;
use thiserror::Error;

/// The durable operation an adapter failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Open,
    Scan,
    Get,
    Put,
    Delete,
    Clear,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Open => "open",
            OperationKind::Scan => "scan",
            OperationKind::Get => "get",
            OperationKind::Put => "put",
            OperationKind::Delete => "delete",
            OperationKind::Clear => "clear",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all MirrorDB errors.
///
/// Absent keys are never errors: reads return `Option::None` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backing container could not be opened. The store keeps serving
    /// reads from the mirror but nothing new survives a restart.
    #[error("Storage adapter unavailable: {reason}")]
    AdapterUnavailable { reason: String },

    /// A single adapter call was rejected.
    #[error("{op} failed{}: {reason}", describe_key(.key))]
    OperationFailed {
        op: OperationKind,
        key: Option<String>,
        reason: String,
    },

    /// The write queue shut down before acknowledging a submitted operation.
    #[error("Write queue closed before acknowledging the operation")]
    WriterClosed,

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

fn describe_key(key: &Option<String>) -> String {
    match key {
        Some(key) => format!(" for key '{}'", key),
        None => String::new(),
    }
}

impl StoreError {
    /// Build an `AdapterUnavailable` error from any displayable cause.
    pub fn unavailable(reason: impl fmt::Display) -> Self {
        StoreError::AdapterUnavailable {
            reason: reason.to_string(),
        }
    }

    /// Build an `OperationFailed` error from any displayable cause.
    pub fn operation_failed(op: OperationKind, key: Option<&str>, reason: impl fmt::Display) -> Self {
        StoreError::OperationFailed {
            op,
            key: key.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the store is running cache-only.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::AdapterUnavailable { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Result type alias for MirrorDB operations.
pub type StoreResult<T> = Result<T, StoreError>;
