//! Error types for the database layer

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    /// `SQLite` error from underlying driver
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Connection pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Database connection pool exhausted (all connections in use, timeout expired).
    #[error("Database connection pool exhausted: {message}")]
    PoolExhausted {
        message: String,
        pool_size: usize,
        max_overflow: usize,
    },

    /// Resource is temporarily busy (lock contention, `SQLITE_BUSY`).
    #[error("Resource temporarily busy: {0}")]
    ResourceBusy(String),

    /// Record not found
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    /// Invalid argument
    #[error("Invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// Caller precondition violation (missing viewer identity, missing
    /// tenant scope). Fails fast; never silently defaulted.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Create a not found error
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Whether this error indicates a retryable lock/busy condition.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sqlite(msg) | Self::Pool(msg) | Self::ResourceBusy(msg) => is_lock_error(msg),
            Self::PoolExhausted { .. } => true,
            _ => false,
        }
    }

    /// Whether callers at the API boundary should surface this as absence
    /// (empty result) rather than an error, to avoid leaking existence.
    #[must_use]
    pub const fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The stable error code string for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PoolExhausted { .. } => "DATABASE_POOL_EXHAUSTED",
            Self::ResourceBusy(_) => "RESOURCE_BUSY",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Precondition(_) => "PRECONDITION_FAILED",
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Check whether an error message indicates a database lock/busy condition.
#[must_use]
pub fn is_lock_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database is busy")
        || lower.contains("locked")
        || lower.contains("unable to open database")
        || lower.contains("disk i/o error")
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<threadline_core::CoreError> for DbError {
    fn from(e: threadline_core::CoreError) -> Self {
        if e.is_precondition() {
            Self::Precondition(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_errors_are_retryable() {
        assert!(DbError::Sqlite("database is locked".into()).is_retryable());
        assert!(
            DbError::PoolExhausted {
                message: "timeout".into(),
                pool_size: 5,
                max_overflow: 10,
            }
            .is_retryable()
        );
        assert!(!DbError::not_found("Thread", "42").is_retryable());
    }

    #[test]
    fn not_found_is_absence() {
        assert!(DbError::not_found("Thread", "42").is_absence());
        assert!(!DbError::Internal("boom".into()).is_absence());
    }

    #[test]
    fn precondition_errors_map_from_core() {
        let e: DbError = threadline_core::CoreError::MissingOrgScope.into();
        assert_eq!(e.error_code(), "PRECONDITION_FAILED");

        let e: DbError = threadline_core::CoreError::Internal("x".into()).into();
        assert_eq!(e.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            DbError::invalid("limit", "must be positive").error_code(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            DbError::ResourceBusy("busy".into()).error_code(),
            "RESOURCE_BUSY"
        );
    }
}
