//! Error types for the DB Steward MCP server.
//!
//! Three layers of error live here:
//! - [`NativeError`]: a driver error captured as plain data (SQLSTATE, vendor
//!   code, message) so dialects can classify it without touching driver types.
//! - [`CanonicalError`]: the engine-independent `{kind, message, engine_detail}`
//!   shape that is allowed to cross the tool boundary.
//! - [`DbError`]: the `thiserror` enum used with `?` everywhere inside the crate.

use crate::safety::RiskTier;
use schemars::JsonSchema;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Canonical error taxonomy shared by every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    PolicyDenied,
    ConnectionFailed,
    AuthFailed,
    Timeout,
    SyntaxError,
    PermissionDenied,
    ConstraintViolation,
    NotFound,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::PolicyDenied => "policy_denied",
            Self::ConnectionFailed => "connection_failed",
            Self::AuthFailed => "auth_failed",
            Self::Timeout => "timeout",
            Self::SyntaxError => "syntax_error",
            Self::PermissionDenied => "permission_denied",
            Self::ConstraintViolation => "constraint_violation",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-independent error returned to the tool caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CanonicalError {
    pub kind: ErrorKind,
    pub message: String,
    /// Redacted engine code and message, e.g. `SQLSTATE 42P01` or `ORA-00942`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_detail: Option<String>,
}

impl CanonicalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            engine_detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.engine_detail = Some(detail.into());
        self
    }

    /// Replace every occurrence of `secret` in the message and detail.
    pub fn redact(mut self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        self.message = self.message.replace(secret, "****");
        self.engine_detail = self.engine_detail.map(|d| d.replace(secret, "****"));
        self
    }
}

/// Broad origin of a driver error, independent of the driver crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorCategory {
    /// The server answered with an error (SQLSTATE / vendor code present).
    Database,
    Io,
    Tls,
    Configuration,
    Protocol,
    /// Driver-side timeout (connect or call timeout).
    Timeout,
    Decode,
    /// Client library problems (missing Oracle client, worker crash).
    Driver,
    Other,
}

/// A driver error reduced to the fields dialects need for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub category: NativeErrorCategory,
    /// SQLSTATE as reported by the server, if any.
    pub sql_state: Option<String>,
    /// Vendor error number (MySQL error number, ORA-/DPI- number).
    pub vendor_code: Option<i64>,
    pub message: String,
}

impl NativeError {
    pub fn new(category: NativeErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            sql_state: None,
            vendor_code: None,
            message: message.into(),
        }
    }

    pub fn database(
        sql_state: Option<String>,
        vendor_code: Option<i64>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category: NativeErrorCategory::Database,
            sql_state,
            vendor_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sql_state, self.vendor_code) {
            (Some(state), _) => write!(f, "{} (SQLSTATE {})", self.message, state),
            (None, Some(code)) => write!(f, "{} (code {})", self.message, code),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl From<sqlx::Error> for NativeError {
    fn from(err: sqlx::Error) -> Self {
        use NativeErrorCategory as C;
        match err {
            sqlx::Error::Database(db_err) => {
                let vendor_code = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| i64::from(e.number()));
                NativeError::database(
                    db_err.code().map(|c| c.to_string()),
                    vendor_code,
                    db_err.message(),
                )
            }
            sqlx::Error::Configuration(msg) => NativeError::new(C::Configuration, msg.to_string()),
            sqlx::Error::Io(io_err) => NativeError::new(C::Io, format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => NativeError::new(C::Tls, format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                NativeError::new(C::Protocol, format!("Protocol error: {}", msg))
            }
            sqlx::Error::PoolTimedOut => NativeError::new(C::Timeout, "Timed out acquiring connection"),
            sqlx::Error::ColumnDecode { index, source } => NativeError::new(
                C::Decode,
                format!("Failed to decode column {}: {}", index, source),
            ),
            sqlx::Error::Decode(source) => NativeError::new(C::Decode, format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => NativeError::new(C::Driver, "Database worker crashed"),
            other => NativeError::new(C::Other, other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Policy denied {tier} statement: {reason}")]
    PolicyDenied {
        tier: RiskTier,
        reason: String,
        /// Configuration change that would permit the statement, if any.
        remedy: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        engine_detail: Option<String>,
    },

    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        engine_detail: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    /// Errors reported by the engine while running a statement, including
    /// server-side statement timeouts.
    #[error("{kind}: {message}")]
    Database {
        kind: ErrorKind,
        message: String,
        engine_detail: Option<String>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a bad request error (malformed input, raised before any DB contact).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a policy denial for the given tier.
    pub fn policy_denied(
        tier: RiskTier,
        reason: impl Into<String>,
        remedy: Option<String>,
    ) -> Self {
        Self::PolicyDenied {
            tier,
            reason: reason.into(),
            remedy,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            engine_detail: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a not-found error raised by this crate rather than the engine.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Database {
            kind: ErrorKind::NotFound,
            message: message.into(),
            engine_detail: None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            Self::Connection { .. } => ErrorKind::ConnectionFailed,
            Self::Auth { .. } => ErrorKind::AuthFailed,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Database { kind, .. } => *kind,
            Self::Internal { .. } => ErrorKind::Unknown,
        }
    }

    /// Render as the canonical `{kind, message, engine_detail}` shape.
    pub fn to_canonical(&self) -> CanonicalError {
        let engine_detail = match self {
            Self::Connection { engine_detail, .. }
            | Self::Auth { engine_detail, .. }
            | Self::Database { engine_detail, .. } => engine_detail.clone(),
            _ => None,
        };
        CanonicalError {
            kind: self.kind(),
            message: self.to_string(),
            engine_detail,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::PolicyDenied { remedy, .. } => remedy.as_deref(),
            Self::Connection { .. } => Some("Check host, port, database name and ssl_mode"),
            Self::Auth { .. } => Some("Check the user name and password"),
            Self::Timeout { .. } => {
                Some("Narrow the query or ask the operator to raise the statement timeout")
            }
            Self::Database {
                kind: ErrorKind::SyntaxError,
                ..
            } => Some("Check the SQL syntax for this engine"),
            Self::Database {
                kind: ErrorKind::NotFound,
                ..
            } => Some("Use db_list_tables or db_schema to find existing objects"),
            _ => None,
        }
    }
}

impl From<CanonicalError> for DbError {
    fn from(err: CanonicalError) -> Self {
        let CanonicalError {
            kind,
            message,
            engine_detail,
        } = err;
        match kind {
            ErrorKind::BadRequest => DbError::BadRequest { message },
            ErrorKind::ConnectionFailed => DbError::Connection {
                message,
                engine_detail,
            },
            ErrorKind::AuthFailed => DbError::Auth {
                message,
                engine_detail,
            },
            // Policy denials are never produced by an engine.
            ErrorKind::PolicyDenied => DbError::Database {
                kind: ErrorKind::Unknown,
                message,
                engine_detail,
            },
            kind => DbError::Database {
                kind,
                message,
                engine_detail,
            },
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build the `data` payload carried by MCP errors.
fn error_data(err: &DbError) -> serde_json::Value {
    let mut data = serde_json::json!(err.to_canonical());
    if let DbError::PolicyDenied { tier, remedy, .. } = err {
        data["tier"] = serde_json::json!(tier);
        if let Some(remedy) = remedy {
            data["remedy"] = serde_json::json!(remedy);
        }
    }
    if let Some(suggestion) = err.suggestion() {
        data["suggestion"] = serde_json::json!(suggestion);
    }
    data
}

/// Convert DbError to MCP ErrorData, keeping the canonical error in `data`.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = Some(error_data(&err));
        match err.kind() {
            ErrorKind::BadRequest
            | ErrorKind::PolicyDenied
            | ErrorKind::SyntaxError
            | ErrorKind::PermissionDenied
            | ErrorKind::ConstraintViolation => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }
            ErrorKind::NotFound => rmcp::ErrorData::resource_not_found(err.to_string(), data),
            ErrorKind::ConnectionFailed
            | ErrorKind::AuthFailed
            | ErrorKind::Timeout
            | ErrorKind::Unknown => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ConstraintViolation).unwrap();
        assert_eq!(json, "\"constraint_violation\"");
        assert_eq!(ErrorKind::PolicyDenied.to_string(), "policy_denied");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(DbError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(DbError::connection("x").kind(), ErrorKind::ConnectionFailed);
        assert_eq!(DbError::timeout("query", 30).kind(), ErrorKind::Timeout);
        assert_eq!(DbError::not_found("t").kind(), ErrorKind::NotFound);
        assert_eq!(DbError::internal("x").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_canonical_redaction() {
        let err = CanonicalError::new(ErrorKind::AuthFailed, "password s3cret rejected")
            .with_detail("user=bob password=s3cret");
        let redacted = err.redact("s3cret");
        assert!(!redacted.message.contains("s3cret"));
        assert_eq!(redacted.engine_detail.as_deref(), Some("user=bob password=****"));
    }

    #[test]
    fn test_redact_empty_secret_is_noop() {
        let err = CanonicalError::new(ErrorKind::Unknown, "abc");
        assert_eq!(err.clone().redact(""), err);
    }

    #[test]
    fn test_canonical_round_trip_into_db_error() {
        let canonical = CanonicalError::new(ErrorKind::SyntaxError, "near FROM")
            .with_detail("SQLSTATE 42601");
        let err: DbError = canonical.into();
        assert_eq!(err.kind(), ErrorKind::SyntaxError);
        assert_eq!(
            err.to_canonical().engine_detail.as_deref(),
            Some("SQLSTATE 42601")
        );
    }

    #[test]
    fn test_policy_denied_maps_to_invalid_params() {
        let err = DbError::policy_denied(
            RiskTier::Write,
            "writes are disabled",
            Some("start with --allow-writes".to_string()),
        );
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        let data = mcp_err.data.unwrap();
        assert_eq!(data["kind"], "policy_denied");
        assert_eq!(data["tier"], "WRITE");
        assert_eq!(data["remedy"], "start with --allow-writes");
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::not_found("no table").into();
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = DbError::connection("refused").into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["kind"], "connection_failed");
    }

    #[test]
    fn test_native_error_display() {
        let err = NativeError::database(Some("42P01".into()), None, "relation missing");
        assert_eq!(err.to_string(), "relation missing (SQLSTATE 42P01)");
        let err = NativeError::database(None, Some(942), "table or view does not exist");
        assert_eq!(err.to_string(), "table or view does not exist (code 942)");
    }

    #[test]
    fn test_native_error_from_sqlx_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let native: NativeError = sqlx::Error::Io(io).into();
        assert_eq!(native.category, NativeErrorCategory::Io);
        assert!(native.message.contains("refused"));
    }
}
