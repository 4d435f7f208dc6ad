//! Error types for buffer model operations.
//!
//! The variants follow the failure taxonomy of the model: inconsistencies
//! between the model and the device, convergence timeouts, checks that are
//! unsupported on a device class, and plain configuration problems.
//! All errors implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// Result type alias for buffer model operations.
pub type BufferModelResult<T> = Result<T, BufferModelError>;

/// Errors that can occur while predicting or verifying buffer state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferModelError {
    /// The model and the observed device state disagree in a way that no
    /// amount of waiting can fix (non-integral pool size, non-monotonic xoff,
    /// ambiguous hardware objects).
    #[error("Model inconsistency in {what}: expected {expected}, observed {observed}")]
    ModelInconsistency {
        /// What was being checked.
        what: String,
        /// The value the model predicted.
        expected: String,
        /// The value actually observed or computed.
        observed: String,
    },

    /// An external layer never reached the predicted value.
    #[error("{what} did not converge after {attempts} attempts: expected '{expected}', last observed '{observed}'")]
    ConvergenceTimeout {
        /// What was being polled.
        what: String,
        /// The value the model predicted.
        expected: String,
        /// The last value read from the layer.
        observed: String,
        /// How many times the layer was read.
        attempts: u32,
    },

    /// The device class lacks what a check needs; the check is skipped.
    #[error("Check '{check}' unsupported on this device: {reason}")]
    Unsupported {
        /// The skipped check.
        check: String,
        /// Why it cannot run.
        reason: String,
    },

    /// A buffer profile cannot be removed while PGs still reference it.
    #[error("Buffer profile '{profile}' is still referenced by {references} priority group(s)")]
    ProfileInUse {
        /// The profile name.
        profile: String,
        /// Current reference count.
        references: u32,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Table entry not found.
    #[error("Table entry not found: {table}:{key}")]
    EntryNotFound {
        /// The table name.
        table: String,
        /// The key.
        key: String,
    },

    /// Reading a state layer failed.
    #[error("Database operation failed: {operation}: {message}")]
    Database {
        /// The operation that failed (e.g., "get", "keys").
        operation: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl BufferModelError {
    /// Creates a model inconsistency error.
    pub fn model_inconsistency(
        what: impl Into<String>,
        expected: impl ToString,
        observed: impl ToString,
    ) -> Self {
        Self::ModelInconsistency {
            what: what.into(),
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }

    /// Creates an unsupported-check error.
    pub fn unsupported(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            check: check.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an entry not found error.
    pub fn entry_not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::EntryNotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if the affected check should be skipped rather than failed.
    pub fn is_skip(&self) -> bool {
        matches!(self, BufferModelError::Unsupported { .. })
    }

    /// Returns true if this error ends the current scenario.
    pub fn is_fatal(&self) -> bool {
        !self.is_skip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_inconsistency_display() {
        let err = BufferModelError::model_inconsistency("pool size", 1024, "1023.5");
        assert_eq!(
            err.to_string(),
            "Model inconsistency in pool size: expected 1024, observed 1023.5"
        );
    }

    #[test]
    fn test_convergence_timeout_display() {
        let err = BufferModelError::ConvergenceTimeout {
            what: "BUFFER_PG_TABLE:Ethernet0:3-4".to_string(),
            expected: "pg_lossless_50000_40m_profile".to_string(),
            observed: "pg_lossless_100000_5m_profile".to_string(),
            attempts: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("after 10 attempts"));
        assert!(msg.contains("pg_lossless_100000_5m_profile"));
    }

    #[test]
    fn test_profile_in_use_display() {
        let err = BufferModelError::ProfileInUse {
            profile: "headroom-override".to_string(),
            references: 2,
        };
        assert_eq!(
            err.to_string(),
            "Buffer profile 'headroom-override' is still referenced by 2 priority group(s)"
        );
    }

    #[test]
    fn test_skip_classification() {
        assert!(BufferModelError::unsupported("headroom override", "no parameters").is_skip());
        assert!(!BufferModelError::internal("bug").is_skip());
        assert!(BufferModelError::model_inconsistency("xoff", 1, 2).is_fatal());
        assert!(BufferModelError::database("get", "timeout").is_fatal());
    }
}
