//! Custom error types for the Vigil posture engine.
//!
//! Provides a structured error hierarchy for better error handling
//! and more informative error messages.

use std::path::PathBuf;

/// The main error type for Vigil operations.
#[derive(Debug, thiserror::Error)]
pub enum VigilError {
    /// Generic validation failure (bad input rejected synchronously)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A control result was recorded against a control id the framework
    /// does not define
    #[error("Unknown control '{control_id}' for framework {framework}")]
    UnknownControl {
        framework: String,
        control_id: String,
    },

    /// An alert rule that cannot be evaluated
    #[error("Invalid alert rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Scoring weights that do not form a convex combination
    #[error("Risk weights must sum to 1.0 (got {sum})")]
    InvalidWeights { sum: f64 },

    /// A finding state transition that is not allowed
    #[error("Finding {finding_id} is already {status}; cannot transition again")]
    FindingAlreadyTerminal { finding_id: String, status: String },

    /// Telemetry sink failure after the retry budget is exhausted
    #[error("Sink '{context}' failed after {attempts} attempt(s): {message}")]
    Sink {
        context: String,
        attempts: u32,
        message: String,
    },

    /// I/O error (snapshot read, telemetry file write, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tokio task join error
    #[error("Async task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type alias using VigilError
pub type VigilResult<T> = Result<T, VigilError>;

impl VigilError {
    /// Create a generic validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a sink error with context and attempt count
    pub fn sink(context: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Sink {
            context: context.into(),
            attempts,
            message: message.into(),
        }
    }

    /// Create an invalid-rule error
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for VigilError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_control_display() {
        let err = VigilError::UnknownControl {
            framework: "SOC2".to_string(),
            control_id: "CC6.1".to_string(),
        };
        assert!(err.to_string().contains("CC6.1"));
        assert!(err.to_string().contains("SOC2"));
    }

    #[test]
    fn test_sink_error_display() {
        let err = VigilError::sink("telemetry", 3, "connection refused");
        assert!(err.to_string().contains("3 attempt"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let vigil_err: VigilError = io_err.into();
        assert!(matches!(vigil_err, VigilError::Io { path: None, .. }));
    }
}
