//! # Centralized Error Handling
//!
//! Unified error types for the crate using `thiserror`.
//!
//! Capacity and contract violations (marker index past the 128-marker packed
//! layout) are programming errors and panic at the codec boundary instead of
//! surfacing here. Statistical conditions (uninformative candidate markers,
//! EM non-convergence, degenerate predictions) are statuses carried in
//! return values, not errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for attribag operations
#[derive(Error, Debug)]
pub enum AttribagError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data errors (matrix shape mismatch, unknown type label)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Configuration errors (invalid CLI arguments or parameter ranges)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Model file errors (malformed or incompatible persisted model)
    #[error("Model error: {message}")]
    Model { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Parse errors in matrix/label files
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Type alias for Results using AttribagError
pub type Result<T> = std::result::Result<T, AttribagError>;

impl AttribagError {
    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AttribagError {
    fn from(err: serde_json::Error) -> Self {
        Self::Model {
            message: err.to_string(),
        }
    }
}
