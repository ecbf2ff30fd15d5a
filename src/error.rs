//! Error types for quad-curves operations.
//!
//! The numeric core never fails: solver degradation, capacity exhaustion and
//! malformed curve input are absorbed and reported through warnings and clamp
//! diagnostics. These errors only surface at the edges (parsing, IO, config
//! validation).

use thiserror::Error;

/// Result type alias for quad-curves operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing inputs for curve synthesis.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Target or measurement data cannot be used.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A channel definition is unusable.
    #[error("Invalid channel {channel}: {reason}")]
    InvalidChannel {
        /// Channel name.
        channel: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid config: {field}: {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Reason for the failure.
        reason: String,
    },

    /// Interpolation type string not recognised.
    #[error("Unknown interpolation type: {0} (expected cubic, catmull, smooth, pchip or linear)")]
    UnknownInterpolation(String),

    /// Weighting mode string not recognised.
    #[error("Unknown weighting mode: {0} (expected normalized, equal, momentum or isolated)")]
    UnknownWeightingMode(String),

    /// Error importing CSV data.
    #[error("CSV import error at line {line}: {reason}")]
    CsvImport {
        /// Line number where the error occurred.
        line: usize,
        /// Reason for the failure.
        reason: String,
    },

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
