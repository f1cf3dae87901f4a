//! Connection-related data models.
//!
//! A [`DbConfig`] describes one target database and is supplied fresh with
//! every tool call. It is never persisted and its password never reaches logs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[serde(alias = "postgres")]
    PostgreSQL,
    /// Includes MariaDB
    #[serde(alias = "mariadb")]
    MySQL,
    Oracle,
}

impl DatabaseType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::Oracle => "Oracle",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::PostgreSQL => 5432,
            Self::MySQL => 3306,
            Self::Oracle => 1521,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = ConnectionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "oracle" => Ok(Self::Oracle),
            other => Err(ConnectionConfigError::UnknownDatabaseType(other.to_string())),
        }
    }
}

/// TLS negotiation mode, using PostgreSQL's vocabulary for every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[serde(alias = "disabled")]
    Disable,
    Allow,
    #[default]
    Prefer,
    #[serde(alias = "required")]
    Require,
    #[serde(alias = "verify_ca")]
    VerifyCa,
    #[serde(alias = "verify_full", alias = "verify-identity")]
    VerifyFull,
}

impl SslMode {
    /// Whether the connection must be encrypted.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Require | Self::VerifyCa | Self::VerifyFull)
    }
}

impl FromStr for SslMode {
    type Err = ConnectionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" | "preferred" => Ok(Self::Prefer),
            "require" | "required" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" | "verify-identity" => Ok(Self::VerifyFull),
            other => Err(ConnectionConfigError::InvalidSslMode(other.to_string())),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        };
        f.write_str(s)
    }
}

/// Connection settings for one request.
///
/// `Debug` and `Display` never print the password.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    /// Database name; the service name on Oracle.
    pub database: String,
    pub user: String,
    pub password: String,
    pub ssl_mode: Option<SslMode>,
    /// PostgreSQL search path, MySQL catalog schema or Oracle owner.
    pub schema: Option<String>,
    /// Per-request connect timeout; the server caps it.
    pub connect_timeout: Option<Duration>,
}

impl DbConfig {
    /// Create a configuration with the engine's default port and no options.
    pub fn new(
        db_type: DatabaseType,
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            db_type,
            host: host.into(),
            port: db_type.default_port(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            ssl_mode: None,
            schema: None,
            connect_timeout: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = Some(ssl_mode);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Effective SSL mode (engines default to `prefer`).
    pub fn ssl_mode_or_default(&self) -> SslMode {
        self.ssl_mode.unwrap_or_default()
    }

    /// Replace the password wherever it appears in `text`.
    pub fn redact(&self, text: &str) -> String {
        if self.password.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.password, "****")
        }
    }

    /// Get a display-safe description (credentials masked).
    pub fn masked_target(&self) -> String {
        format!(
            "{}://{}:****@{}:{}/{}",
            self.db_type.to_string().to_lowercase(),
            self.user,
            self.host,
            self.port,
            self.database
        )
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"****")
            .field("ssl_mode", &self.ssl_mode)
            .field("schema", &self.schema)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked_target())
    }
}

/// Errors raised while building a [`DbConfig`] from tool input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionConfigError {
    #[error("missing required connection field '{0}'")]
    MissingField(&'static str),
    #[error("unknown database engine '{0}' (expected postgresql, mysql or oracle)")]
    UnknownDatabaseType(String),
    #[error("invalid ssl_mode '{0}' (expected disable, allow, prefer, require, verify-ca or verify-full)")]
    InvalidSslMode(String),
    #[error("invalid port {0} (expected 1-65535)")]
    InvalidPort(i64),
}
