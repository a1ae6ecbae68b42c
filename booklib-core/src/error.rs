//! Structured error types for booklib-core.
//!
//! Uses `thiserror` so the server crate gets composable errors; the
//! binary wraps everything in `anyhow` at the process boundary.

use std::time::Duration;

use thiserror::Error;

/// Main error type for booklib-core operations
#[derive(Error, Debug)]
pub enum BooklibError {
    /// No pooled connection became available before the acquire timeout
    #[error("no database connection available within {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// Establishing a new database session failed
    #[error("failed to establish database connection: {source}")]
    Connection {
        #[source]
        source: sqlx::Error,
    },

    /// The pool was already shut down; acquiring after shutdown is a
    /// programming error in the caller
    #[error("connection pool is closed")]
    PoolClosed,

    /// A query failed after the connection was established
    #[error("database query failed: {source}")]
    Query {
        #[source]
        source: sqlx::Error,
    },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for booklib-core operations
pub type Result<T> = std::result::Result<T, BooklibError>;

impl BooklibError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True for failures that may clear on their own (callers surface
    /// these as service-unavailable rather than fatal)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BooklibError::PoolExhausted {
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "no database connection available within 2s");

        let err = BooklibError::config("DB_PORT must be numeric");
        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(BooklibError::PoolExhausted {
            timeout: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!BooklibError::PoolClosed.is_transient());
        assert!(!BooklibError::config("bad").is_transient());
    }
}
