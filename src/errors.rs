//! Error types for the risk engine
//!
//! Every fallible engine operation returns [`EngineResult`]. Per-row and
//! per-table failures inside long-running operations are not errors: they are
//! captured in the operation's summary (`CheckResult`, `ImportSummary`), whose
//! `status` reports a partial failure.
//!
//! # Examples
//!
//! ```rust
//! use robot_risk::errors::EngineError;
//!
//! let err = EngineError::not_found("risk_event", 42);
//! assert!(err.is_not_found());
//! assert_eq!(err.code(), "not_found");
//!
//! let err = EngineError::Removed { endpoint: "weekly-results/sync".to_string() };
//! assert!(err.is_client_error());
//! ```

use thiserror::Error;

/// Risk engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown identifier
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `risk_event`
        entity: &'static str,
        /// Identifier as given by the caller
        id: String,
    },

    /// Illegal lifecycle transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed input row or configuration
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Chart computation lacks source data
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Permanently retired endpoint
    #[error("Endpoint '{endpoint}' has been removed with no replacement")]
    Removed {
        /// Name of the retired endpoint
        endpoint: String,
    },

    /// Long-running operation exceeded its budget
    #[error("{operation} timed out after {completed} completed units")]
    Timeout {
        /// Operation name (`execute`, `import_components`)
        operation: &'static str,
        /// Tables or rows fully applied before the deadline
        completed: usize,
    },

    /// Caller lacks the required role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this is a client error (400-series)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound { .. }
                | EngineError::InvalidState(_)
                | EngineError::Validation(_)
                | EngineError::DataUnavailable(_)
                | EngineError::Removed { .. }
                | EngineError::Forbidden(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::Validation(_) => "validation_error",
            EngineError::DataUnavailable(_) => "data_unavailable",
            EngineError::Removed { .. } => "removed",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Database(_) => "database_error",
            EngineError::Internal(_) => "internal_error",
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Internal(format!("background task failed: {}", err))
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
