use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// BackendError
// ---------------------------------------------------------------------------

/// A rejection returned by the backend for a single call.
///
/// Carried unchanged up to the caller; the client never retries on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Rejection used when a callback-style request is dropped unanswered.
    pub fn dropped() -> Self {
        Self::new("request-dropped", "backend dropped the request without responding")
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for BackendError {}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Unknown {kind} modifier: \"{name}\"")]
    InvalidModifier { kind: &'static str, name: String },

    #[error("\"{0}\" requires a child key")]
    MissingChildKey(String),

    #[error("Invalid limit {value} for \"{name}\": must be a non-negative integer")]
    InvalidLimit { name: String, value: String },

    #[error("Unknown event type: \"{0}\"")]
    InvalidEventType(String),
}

// ---------------------------------------------------------------------------
// DatabaseError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Backend rejected request: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Convenience alias: the default error type is `DatabaseError`.
pub type Result<T, E = DatabaseError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
