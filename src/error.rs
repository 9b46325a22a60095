//! Error types for the SQL gateway.
//!
//! Every failure a request can hit maps to one [`GatewayError`] variant. The
//! variant decides the HTTP status, and the response body always carries the
//! original message so callers see what the database engine said.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Unauthorized: {reason}")]
    Authorization { reason: String },

    #[error("Connection pool error: {message}")]
    Pool { message: String, suggestion: String },

    /// Engine-side failure. Display is the engine message unchanged.
    #[error("{message}")]
    Query {
        message: String,
        /// e.g., "23000" for an integrity constraint violation
        sql_state: Option<String>,
    },

    #[error("Invalid request: {message}")]
    Validation { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse error category, used for status mapping and rollback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authorization,
    Pool,
    Query,
    Validation,
    Timeout,
    Internal,
}

impl GatewayError {
    /// Create an authorization error.
    pub fn authorization(reason: impl Into<String>) -> Self {
        Self::Authorization {
            reason: reason.into(),
        }
    }

    /// Create a pool error with a helpful suggestion.
    pub fn pool(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Pool {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::Pool { .. } => ErrorKind::Pool,
            Self::Query { .. } => ErrorKind::Query,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Pool { suggestion, .. } => Some(suggestion),
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or optimizing the statement")
            }
            _ => None,
        }
    }

    /// SQLSTATE reported by the engine, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Whether a failure in the middle of an open transaction leaves work that
    /// must be rolled back.
    ///
    /// Errors raised before any statement reached the engine do not qualify.
    pub fn requires_rollback(&self) -> bool {
        matches!(
            self,
            Self::Query { .. } | Self::Timeout { .. } | Self::Internal { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Authorization => StatusCode::UNAUTHORIZED,
            ErrorKind::Pool => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Query | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert sqlx errors to GatewayError.
impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => GatewayError::pool(
                msg.to_string(),
                "Check the database host, port and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                GatewayError::query(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => GatewayError::pool(
                "Timed out waiting for a pooled connection",
                "Raise --max-connections or --acquire-timeout, or reduce concurrent load",
            ),
            sqlx::Error::PoolClosed => {
                GatewayError::pool("Connection pool is closed", "The server is shutting down")
            }
            sqlx::Error::Io(io_err) => GatewayError::query(format!("I/O error: {}", io_err), None),
            sqlx::Error::Tls(tls_err) => GatewayError::pool(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => {
                GatewayError::query(format!("Protocol error: {}", msg), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                GatewayError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                GatewayError::internal(format!("Decode error: {}", source))
            }
            sqlx::Error::WorkerCrashed => GatewayError::internal("Database worker crashed"),
            _ => GatewayError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    sql_state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            sql_state: self.sql_state(),
            suggestion: self.suggestion(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_is_engine_message() {
        let err = GatewayError::query(
            "Duplicate entry '1' for key 'PRIMARY'",
            Some("23000".to_string()),
        );
        assert_eq!(err.to_string(), "Duplicate entry '1' for key 'PRIMARY'");
        assert_eq!(err.sql_state(), Some("23000"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = GatewayError::pool("refused", "Check the host");
        assert_eq!(err.suggestion(), Some("Check the host"));
        assert!(GatewayError::validation("bad").suggestion().is_none());
    }

    #[test]
    fn test_requires_rollback() {
        assert!(GatewayError::query("boom", None).requires_rollback());
        assert!(GatewayError::timeout("statement", 100).requires_rollback());
        assert!(GatewayError::internal("decode").requires_rollback());
        assert!(!GatewayError::validation("bad").requires_rollback());
        assert!(!GatewayError::pool("down", "retry").requires_rollback());
        assert!(!GatewayError::authorization("no token").requires_rollback());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::authorization("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::pool("x", "y").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::query("x", None).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::validation("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::timeout("x", 1).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pool_timeout_maps_to_pool_kind() {
        let err: GatewayError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Pool);
        let err: GatewayError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.kind(), ErrorKind::Pool);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let v = serde_json::to_value(ErrorKind::Authorization).unwrap();
        assert_eq!(v, "authorization");
    }
}
