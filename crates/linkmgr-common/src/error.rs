//! Error types for linkmgrd operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Errors are
//! split into startup-fatal conditions and conditions the daemon degrades
//! through while it keeps observing.

use thiserror::Error;

/// Result type alias for linkmgrd operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Errors that can occur during linkmgrd operations.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Mandatory configuration missing at startup.
    #[error("Mandatory configuration not found: {what}")]
    ConfigNotFound {
        /// What was missing (e.g. "ToR MAC address").
        what: String,
    },

    /// Malformed input from the fabric (bad IP, unknown cable type, ...).
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Redis/database operation failed.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g. "hget", "subscribe").
        operation: String,
        /// Error message.
        message: String,
    },

    /// A toggle or probe deadline elapsed without confirmation.
    #[error("Timed out waiting for {what}")]
    Timeout {
        /// What was being waited on.
        what: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl MuxError {
    /// Creates a config-not-found error.
    pub fn config_not_found(what: impl Into<String>) -> Self {
        Self::ConfigNotFound { what: what.into() }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error must abort process startup.
    ///
    /// Fatal errors are only raised before any port supervisor exists;
    /// everything else is logged and the daemon continues observing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MuxError::ConfigNotFound { .. })
    }

    /// Returns true if the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MuxError::Database { .. } | MuxError::Timeout { .. })
    }
}
