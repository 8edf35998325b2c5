//! Error types for agrupar operations.
//!
//! One crate-wide enum so callers can distinguish "upstream must re-run"
//! failures (missing inputs) from data-quality failures (validation gates).

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for agrupar operations.
///
/// # Examples
///
/// ```
/// use agrupar::error::AgruparError;
///
/// let err = AgruparError::InsufficientData { n_stores: 12, min_required: 60 };
/// assert!(err.to_string().contains("12"));
/// ```
#[derive(Debug, Error)]
pub enum AgruparError {
    /// A required input matrix file could not be located. Fatal, no retry.
    #[error("missing required input: {}", .path.display())]
    MissingInput {
        /// Path that was probed
        path: PathBuf,
    },

    /// Normalized and original matrices disagree beyond what later joins can
    /// absorb (e.g. no overlapping store ids at all).
    #[error("structural mismatch between input matrices: {message}")]
    StructuralMismatch {
        /// What disagreed
        message: String,
    },

    /// Too few stores for meaningful clustering.
    #[error("insufficient data: {n_stores} stores, need at least {min_required}")]
    InsufficientData {
        /// Stores actually present
        n_stores: usize,
        /// Configured minimum
        min_required: usize,
    },

    /// Matrix/vector dimensions don't match for the operation.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions description
        expected: String,
        /// Actual dimensions found
        actual: String,
    },

    /// Invalid hyperparameter value provided.
    #[error("invalid hyperparameter: {param} = {value}, expected {constraint}")]
    InvalidHyperparameter {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A result-validation gate failed. Always propagated to the caller.
    #[error("validation failed: {message}")]
    Validation {
        /// Which gate failed and why
        message: String,
    },

    /// I/O error (file not found mid-write, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse/write error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic error with string message.
    #[error("{0}")]
    Other(String),
}

impl From<csv::Error> for AgruparError {
    fn from(err: csv::Error) -> Self {
        AgruparError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for AgruparError {
    fn from(err: serde_json::Error) -> Self {
        AgruparError::Serialization(err.to_string())
    }
}

impl From<&str> for AgruparError {
    fn from(msg: &str) -> Self {
        AgruparError::Other(msg.to_string())
    }
}

impl From<String> for AgruparError {
    fn from(msg: String) -> Self {
        AgruparError::Other(msg)
    }
}

impl AgruparError {
    /// Create a validation error with a gate-specific message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Result type alias for agrupar operations.
pub type Result<T> = std::result::Result<T, AgruparError>;
