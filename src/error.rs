//! Error types for the database client.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Introspection results such as "composite key" or "empty table" are never
//! reported through these errors; they are ordinary return values.

use thiserror::Error;

/// Why a connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The server rejected the credentials.
    Authentication,
    /// The host could not be reached (DNS, refused, network timeout).
    Unreachable,
    /// The server answered but runs a version this client does not support.
    UnsupportedVersion,
    /// Anything else reported while establishing the session.
    Other,
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication failed"),
            Self::Unreachable => write!(f, "host unreachable"),
            Self::UnsupportedVersion => write!(f, "unsupported server version"),
            Self::Other => write!(f, "connection failed"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed ({kind}): {message}")]
    Connection {
        kind: ConnectFailure,
        message: String,
        suggestion: String,
    },

    #[error("Connection is not connected. Call connect() first.")]
    NotConnected,

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Invalid connection state: {message}")]
    InvalidState { message: String },

    #[error("Timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Query error: {message} (object: {object})")]
    Query { message: String, object: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        kind: ConnectFailure,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            kind,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Fill in the bound of a timeout raised where it was not known.
    ///
    /// Pool acquire timeouts come out of the driver error conversions with a
    /// zero bound; the caller that owns the deadline supplies the real one.
    pub fn with_timeout_bound(self, timeout_ms: u64) -> Self {
        match self {
            Self::Timeout {
                operation,
                timeout_ms: 0,
            } => Self::Timeout {
                operation,
                timeout_ms,
            },
            other => other,
        }
    }

    /// Create a query error for a malformed table, column, sort or filter reference.
    pub fn query(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::NotConnected => Some("Call connect() before issuing operations"),
            _ => None,
        }
    }

    /// The connect failure kind, for connection errors.
    pub fn connect_failure(&self) -> Option<ConnectFailure> {
        match self {
            Self::Connection { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Connection { kind, .. } => {
                matches!(kind, ConnectFailure::Unreachable | ConnectFailure::Other)
            }
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // Bound unknown here; filled in by the caller's deadline
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 0),
            sqlx::Error::PoolClosed => DbError::ConnectionClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                ConnectFailure::Unreachable,
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                ConnectFailure::Other,
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                ConnectFailure::Other,
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found in result row: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert tiberius (SQL Server) errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => DbError::database(
                token.message().to_string(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            tiberius::error::Error::Io { kind, message } => DbError::connection(
                ConnectFailure::Unreachable,
                format!("I/O error ({:?}): {}", kind, message),
                "Check network connectivity and database server status",
            ),
            tiberius::error::Error::Conversion(msg) => {
                DbError::internal(format!("Conversion error: {}", msg))
            }
            other => DbError::internal(format!("SQL Server driver error: {}", other)),
        }
    }
}

/// Convert bb8 pool errors (SQL Server) to DbError.
impl From<bb8::RunError<bb8_tiberius::Error>> for DbError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => DbError::connection(
                ConnectFailure::Other,
                format!("Failed to acquire SQL Server session: {}", e),
                "Check that the SQL Server instance is running and accessible",
            ),
            bb8::RunError::TimedOut => DbError::timeout("connection pool acquire", 0),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection(
            ConnectFailure::Authentication,
            "Failed to connect",
            "Check credentials",
        );
        let text = err.to_string();
        assert!(text.contains("Connection failed"));
        assert!(text.contains("authentication failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::NotConnected.suggestion().is_some());
        assert_eq!(DbError::ConnectionClosed.suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30_000).is_retryable());
        assert!(DbError::connection(ConnectFailure::Unreachable, "err", "sugg").is_retryable());
        assert!(
            !DbError::connection(ConnectFailure::Authentication, "err", "sugg").is_retryable()
        );
        assert!(
            !DbError::connection(ConnectFailure::UnsupportedVersion, "err", "sugg")
                .is_retryable()
        );
        assert!(!DbError::query("unknown table", "nope").is_retryable());
    }

    #[test]
    fn test_connect_failure_kind() {
        let err = DbError::connection(ConnectFailure::UnsupportedVersion, "too old", "upgrade");
        assert_eq!(
            err.connect_failure(),
            Some(ConnectFailure::UnsupportedVersion)
        );
        assert_eq!(DbError::NotConnected.connect_failure(), None);
    }

    #[test]
    fn test_timeout_bound_fills_only_unknown() {
        let err = DbError::from(sqlx::Error::PoolTimedOut).with_timeout_bound(5_000);
        assert!(matches!(err, DbError::Timeout { timeout_ms: 5_000, .. }));

        let err = DbError::timeout("select_top", 250).with_timeout_bound(5_000);
        assert!(matches!(err, DbError::Timeout { timeout_ms: 250, .. }));

        let err = DbError::NotConnected.with_timeout_bound(5_000);
        assert!(matches!(err, DbError::NotConnected));
    }

    #[test]
    fn test_sqlx_pool_closed_maps_to_connection_closed() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::ConnectionClosed));
    }

    #[test]
    fn test_sqlx_io_maps_to_unreachable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: DbError = sqlx::Error::Io(io).into();
        assert_eq!(err.connect_failure(), Some(ConnectFailure::Unreachable));
    }

    #[test]
    fn test_query_error_display_names_object() {
        let err = DbError::query("Unknown sort column", "nope");
        assert!(err.to_string().contains("nope"));
    }
}
