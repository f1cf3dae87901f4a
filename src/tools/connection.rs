//! Connection input and the `db_test_connection` tool.

use crate::db::{Connection, Connector, Dialect};
use crate::error::{DbError, DbResult};
use crate::models::{BoundStatement, ConnectionConfigError, DatabaseType, DbConfig, SslMode};
use crate::tools::ToolContext;
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Target database. Supplied with every call; never stored.
#[derive(Clone, Default, Deserialize, JsonSchema)]
pub struct ConnectionInput {
    /// Database engine: "postgresql", "mysql" or "oracle"
    #[serde(default, alias = "db_type", alias = "type")]
    pub engine: Option<String>,
    /// Server host name or address
    #[serde(default)]
    pub host: Option<String>,
    /// Server port. Default: 5432 (PostgreSQL), 3306 (MySQL), 1521 (Oracle)
    #[serde(default)]
    pub port: Option<i64>,
    /// Database name (the service name on Oracle)
    #[serde(default, alias = "database_name", alias = "dbname", alias = "service_name")]
    pub database: Option<String>,
    /// User name
    #[serde(default, alias = "username")]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// disable, allow, prefer (default), require, verify-ca or verify-full
    #[serde(default, alias = "sslmode")]
    pub ssl_mode: Option<String>,
    /// PostgreSQL search path, MySQL schema or Oracle owner used by catalog tools
    #[serde(default)]
    pub schema: Option<String>,
    /// Connect timeout in seconds; capped by the server setting
    #[serde(default)]
    pub connect_timeout: Option<u64>,
}

impl fmt::Debug for ConnectionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInput")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("ssl_mode", &self.ssl_mode)
            .field("schema", &self.schema)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn present(value: &Option<String>, field: &'static str) -> Result<String, ConnectionConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConnectionConfigError::MissingField(field)),
    }
}

impl ConnectionInput {
    /// Build a [`DbConfig`]; missing or malformed fields are reported by name.
    pub fn to_config(&self) -> Result<DbConfig, ConnectionConfigError> {
        let engine: DatabaseType = present(&self.engine, "config.engine")?.parse()?;
        let host = present(&self.host, "config.host")?;
        let database = present(&self.database, "config.database")?;
        let user = present(&self.user, "config.user")?;
        // An empty password is a value; only absence is an error.
        let password = self
            .password
            .clone()
            .ok_or(ConnectionConfigError::MissingField("config.password"))?;

        let mut config = DbConfig::new(engine, host, database, user, password);
        if let Some(port) = self.port {
            let port = u16::try_from(port)
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ConnectionConfigError::InvalidPort(port))?;
            config = config.with_port(port);
        }
        if let Some(mode) = self.ssl_mode.as_deref().filter(|m| !m.trim().is_empty()) {
            config = config.with_ssl_mode(mode.parse::<SslMode>()?);
        }
        if let Some(schema) = self.schema.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            config = config.with_schema(schema);
        }
        config.connect_timeout = self.connect_timeout.map(|secs| Duration::from_secs(secs.max(1)));
        Ok(config)
    }
}

/// Resolve the required `config` object of a tool input.
pub(crate) fn require_config(input: &Option<ConnectionInput>) -> DbResult<DbConfig> {
    input
        .as_ref()
        .ok_or_else(|| DbError::bad_request("missing required field 'config'"))?
        .to_config()
        .map_err(|e| DbError::bad_request(e.to_string()))
}

/// Input for the test_connection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TestConnectionInput {
    /// Target database connection settings
    #[serde(default)]
    pub config: Option<ConnectionInput>,
}

/// Output from the test_connection tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TestConnectionOutput {
    pub success: bool,
    pub engine: DatabaseType,
    /// Connection target with credentials masked
    pub target: String,
    /// Time to connect, probe and close, in milliseconds
    pub elapsed_ms: u64,
}

/// Handler for `db_test_connection`.
pub struct ConnectionToolHandler<C: Connector> {
    ctx: Arc<ToolContext<C>>,
}

impl<C: Connector> ConnectionToolHandler<C> {
    pub fn new(ctx: Arc<ToolContext<C>>) -> Self {
        Self { ctx }
    }

    /// Open, probe with `SELECT 1` and close. Never returns rows.
    pub async fn test_connection(&self, input: TestConnectionInput) -> DbResult<TestConnectionOutput> {
        let config = require_config(&input.config)?;
        let dialect = Dialect::for_config(&config);
        let timeout = Duration::from_secs(u64::from(self.ctx.policy().timeout_seconds()));
        let probe = BoundStatement::plain(dialect.probe_sql());
        let start = Instant::now();

        self.ctx
            .manager()
            .with_connection(&config, &dialect, timeout, move |conn| {
                async move { conn.fetch(&probe, 1).await.map(|_| ()) }.boxed()
            })
            .await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            engine = %config.db_type,
            target = %config.masked_target(),
            elapsed_ms,
            "Connection test succeeded"
        );
        Ok(TestConnectionOutput {
            success: true,
            engine: config.db_type,
            target: config.masked_target(),
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn full_input() -> ConnectionInput {
        serde_json::from_str(
            r#"{
                "engine": "postgresql",
                "host": "db.local",
                "database_name": "sales",
                "username": "analyst",
                "password": "s3cret",
                "ssl_mode": "disabled",
                "schema": "reporting"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_to_config_with_aliases() {
        let config = full_input().to_config().unwrap();
        assert_eq!(config.db_type, DatabaseType::PostgreSQL);
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "sales");
        assert_eq!(config.user, "analyst");
        assert_eq!(config.ssl_mode, Some(SslMode::Disable));
        assert_eq!(config.schema.as_deref(), Some("reporting"));
    }

    #[test]
    fn test_missing_fields_are_named() {
        for field in ["engine", "host", "database", "user", "password"] {
            let mut input = full_input();
            match field {
                "engine" => input.engine = None,
                "host" => input.host = None,
                "database" => input.database = None,
                "user" => input.user = None,
                _ => input.password = None,
            }
            let err = input.to_config().unwrap_err();
            assert!(err.to_string().contains(field), "{}", err);
        }
    }

    #[test]
    fn test_invalid_port_and_engine() {
        let mut input = full_input();
        input.port = Some(70000);
        assert_eq!(input.to_config().unwrap_err(), ConnectionConfigError::InvalidPort(70000));
        let mut input = full_input();
        input.engine = Some("mssql".into());
        assert!(matches!(
            input.to_config(),
            Err(ConnectionConfigError::UnknownDatabaseType(_))
        ));
    }

    #[test]
    fn test_require_config_missing() {
        let err = require_config(&None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", full_input());
        assert!(!rendered.contains("s3cret"));
    }
}
