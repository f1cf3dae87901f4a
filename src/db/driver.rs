//! Production connector over `sqlx` (PostgreSQL, MySQL) and `oracle`.
//!
//! Each variant is a single connection, not a pool. Engine dispatch happens
//! with one `match` per operation.

use crate::db::connection::{Connection, Connector, SessionSettings};
use crate::db::params::{bind_mysql_param, bind_postgres_param};
use crate::db::types;
use crate::error::NativeError;
use crate::models::{BoundStatement, DatabaseType, DbConfig, FetchedRows, NativeParams, SslMode};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, MySqlConnection, PgConnection};
use tracing::{debug, warn};

/// Reported to PostgreSQL as `application_name`.
const APPLICATION_NAME: &str = "db-steward-mcp";

/// Opens real database connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

/// A single open connection to one of the supported engines.
#[derive(Debug)]
pub enum DriverConnection {
    Postgres(PgConnection),
    MySql(MySqlConnection),
    #[cfg(feature = "oracle")]
    Oracle(crate::db::oracle::OracleConnection),
}

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

fn mysql_ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Allow | SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
    }
}

/// PostgreSQL startup options: server-side timeout, literal lexing that
/// matches the classifier, and optional search path.
fn pg_options(config: &DbConfig, session: &SessionSettings) -> PgConnectOptions {
    let mut startup = vec![
        (
            "statement_timeout",
            session.statement_timeout.as_millis().to_string(),
        ),
        ("standard_conforming_strings", "on".to_string()),
    ];
    if let Some(schema) = &config.schema {
        startup.push(("search_path", schema.clone()));
    }
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(pg_ssl_mode(config.ssl_mode_or_default()))
        .application_name(APPLICATION_NAME)
        .options(startup)
}

fn mysql_options(config: &DbConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .ssl_mode(mysql_ssl_mode(config.ssl_mode_or_default()))
        .charset("utf8mb4");
    if !config.database.is_empty() {
        options = options.database(&config.database);
    }
    options
}

impl Connector for DriverConnector {
    type Connection = DriverConnection;

    async fn connect(
        &self,
        config: &DbConfig,
        session: &SessionSettings,
    ) -> Result<DriverConnection, NativeError> {
        match config.db_type {
            DatabaseType::PostgreSQL => {
                let conn = pg_options(config, session).connect().await?;
                Ok(DriverConnection::Postgres(conn))
            }
            DatabaseType::MySQL => {
                let mut conn = mysql_options(config).connect().await?;
                pin_mysql_sql_mode(&mut conn).await?;
                set_mysql_timeout(&mut conn, session).await;
                Ok(DriverConnection::MySql(conn))
            }
            #[cfg(feature = "oracle")]
            DatabaseType::Oracle => {
                let conn = crate::db::oracle::OracleConnection::connect(config, session).await?;
                Ok(DriverConnection::Oracle(conn))
            }
            #[cfg(not(feature = "oracle"))]
            DatabaseType::Oracle => Err(NativeError::new(
                crate::error::NativeErrorCategory::Configuration,
                "Oracle support is not compiled in; rebuild with --features oracle",
            )),
        }
    }
}

/// `sql_mode` flags that change where a string literal or identifier ends.
/// The combination modes imply `ANSI_QUOTES`.
const LEXICAL_SQL_MODES: &[&str] = &[
    "NO_BACKSLASH_ESCAPES",
    "ANSI_QUOTES",
    "ANSI",
    "DB2",
    "MAXDB",
    "MSSQL",
    "ORACLE",
    "POSTGRESQL",
];

/// `current` without the flags in [`LEXICAL_SQL_MODES`].
fn strip_lexical_modes(current: &str) -> String {
    current
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .filter(|m| !LEXICAL_SQL_MODES.iter().any(|l| m.eq_ignore_ascii_case(l)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Backslashes escape and `"` quotes strings, whatever the server default.
async fn pin_mysql_sql_mode(conn: &mut MySqlConnection) -> Result<(), NativeError> {
    let current: String = sqlx::query_scalar("SELECT CAST(@@SESSION.sql_mode AS CHAR)")
        .fetch_one(&mut *conn)
        .await?;
    let pinned = strip_lexical_modes(&current);
    if pinned != current {
        debug!(from = %current, to = %pinned, "Adjusting sql_mode");
        sqlx::query("SET SESSION sql_mode = ?")
            .bind(pinned)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// `max_execution_time` bounds SELECTs on MySQL; MariaDB names it differently.
async fn set_mysql_timeout(conn: &mut MySqlConnection, session: &SessionSettings) {
    use sqlx::Executor;

    let millis = session.statement_timeout.as_millis();
    let mysql = format!("SET SESSION max_execution_time = {}", millis);
    if conn.execute(mysql.as_str()).await.is_ok() {
        return;
    }
    let mariadb = format!(
        "SET SESSION max_statement_time = {}",
        session.statement_timeout.as_secs_f64()
    );
    if let Err(e) = conn.execute(mariadb.as_str()).await {
        warn!(error = %e, "Could not set a server-side statement timeout");
    }
}

impl Connection for DriverConnection {
    async fn fetch(
        &mut self,
        stmt: &BoundStatement,
        max_rows: usize,
    ) -> Result<FetchedRows, NativeError> {
        debug!(sql = %stmt.sql, params = stmt.params.len(), max_rows, "Executing statement");
        match self {
            Self::Postgres(conn) => postgres::fetch(conn, stmt, max_rows).await,
            Self::MySql(conn) => mysql::fetch(conn, stmt, max_rows).await,
            #[cfg(feature = "oracle")]
            Self::Oracle(conn) => conn.fetch(stmt, max_rows).await,
        }
    }

    async fn check_syntax(&mut self, stmt: &BoundStatement) -> Result<(), NativeError> {
        debug!(sql = %stmt.sql, "Checking syntax");
        match self {
            Self::Postgres(conn) => postgres::fetch(conn, stmt, usize::MAX).await.map(|_| ()),
            Self::MySql(conn) => mysql::fetch(conn, stmt, usize::MAX).await.map(|_| ()),
            #[cfg(feature = "oracle")]
            Self::Oracle(conn) => conn.check_syntax(stmt).await,
        }
    }

    async fn close(self) -> Result<(), NativeError> {
        match self {
            Self::Postgres(conn) => sqlx::Connection::close(conn).await.map_err(Into::into),
            Self::MySql(conn) => sqlx::Connection::close(conn).await.map_err(Into::into),
            #[cfg(feature = "oracle")]
            Self::Oracle(conn) => conn.close().await,
        }
    }

    async fn abort(self) {
        match self {
            Self::Postgres(conn) => {
                let _ = sqlx::Connection::close_hard(conn).await;
            }
            Self::MySql(conn) => {
                let _ = sqlx::Connection::close_hard(conn).await;
            }
            #[cfg(feature = "oracle")]
            Self::Oracle(conn) => conn.abort().await,
        }
    }
}

fn positional(params: &NativeParams) -> &[crate::models::ScalarValue] {
    match params {
        NativeParams::Positional(values) => values,
        _ => &[],
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Both modules stream rows and stop after `max_rows`. Statements always go
// through the prepared path, even without parameters: neither engine prepares
// more than one statement, so a stray separator fails instead of running.

mod postgres {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::{Column, Executor, Statement};

    pub async fn fetch(
        conn: &mut PgConnection,
        stmt: &BoundStatement,
        max_rows: usize,
    ) -> Result<FetchedRows, NativeError> {
        let values = positional(&stmt.params);
        let mut columns = Vec::new();
        let mut rows = Vec::new();
        {
            let mut query = sqlx::query(&stmt.sql);
            for value in values {
                query = bind_postgres_param(query, value);
            }
            let mut stream = query.fetch(&mut *conn);
            while rows.len() < max_rows {
                let Some(row) = stream.try_next().await? else {
                    break;
                };
                if columns.is_empty() {
                    columns = types::pg_columns(&row);
                }
                rows.push(types::pg_row(&row));
            }
        }
        if rows.is_empty() {
            columns = describe(conn, &stmt.sql).await;
        }
        Ok(FetchedRows { columns, rows })
    }

    /// Column names of a statement that returned no rows.
    async fn describe(conn: &mut PgConnection, sql: &str) -> Vec<String> {
        match (&mut *conn).prepare(sql).await {
            Ok(prepared) => prepared
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(e) => {
                debug!(error = %e, "Could not describe empty result");
                Vec::new()
            }
        }
    }
}

mod mysql {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::{Column, Executor, Statement};

    pub async fn fetch(
        conn: &mut MySqlConnection,
        stmt: &BoundStatement,
        max_rows: usize,
    ) -> Result<FetchedRows, NativeError> {
        let values = positional(&stmt.params);
        let mut columns = Vec::new();
        let mut rows = Vec::new();
        {
            let mut query = sqlx::query(&stmt.sql);
            for value in values {
                query = bind_mysql_param(query, value);
            }
            let mut stream = query.fetch(&mut *conn);
            while rows.len() < max_rows {
                let Some(row) = stream.try_next().await? else {
                    break;
                };
                if columns.is_empty() {
                    columns = types::mysql_columns(&row);
                }
                rows.push(types::mysql_row(&row));
            }
        }
        if rows.is_empty() {
            columns = describe(conn, &stmt.sql).await;
        }
        Ok(FetchedRows { columns, rows })
    }

    async fn describe(conn: &mut MySqlConnection, sql: &str) -> Vec<String> {
        match (&mut *conn).prepare(sql).await {
            Ok(prepared) => prepared
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(e) => {
                debug!(error = %e, "Could not describe empty result");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> SessionSettings {
        SessionSettings {
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_ssl_mode_mapping() {
        assert!(matches!(pg_ssl_mode(SslMode::VerifyFull), PgSslMode::VerifyFull));
        assert!(matches!(mysql_ssl_mode(SslMode::Allow), MySqlSslMode::Preferred));
        assert!(matches!(mysql_ssl_mode(SslMode::VerifyFull), MySqlSslMode::VerifyIdentity));
        assert!(matches!(mysql_ssl_mode(SslMode::Disable), MySqlSslMode::Disabled));
    }

    #[test]
    fn test_pg_options_carry_session_settings() {
        let config = DbConfig::new(DatabaseType::PostgreSQL, "db", "app", "u", "p")
            .with_port(6543)
            .with_schema("reporting");
        let options = pg_options(&config, &session());
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("app"));
        let startup = options.get_options().unwrap_or_default();
        assert!(startup.contains("statement_timeout=30000"));
        assert!(startup.contains("search_path=reporting"));
        assert!(startup.contains("standard_conforming_strings=on"));
    }

    #[test]
    fn test_strip_lexical_modes() {
        assert_eq!(
            strip_lexical_modes("STRICT_TRANS_TABLES,NO_BACKSLASH_ESCAPES,ANSI_QUOTES"),
            "STRICT_TRANS_TABLES"
        );
        assert_eq!(
            strip_lexical_modes(
                "REAL_AS_FLOAT,PIPES_AS_CONCAT,ANSI_QUOTES,IGNORE_SPACE,ONLY_FULL_GROUP_BY,ANSI"
            ),
            "REAL_AS_FLOAT,PIPES_AS_CONCAT,IGNORE_SPACE,ONLY_FULL_GROUP_BY"
        );
        assert_eq!(strip_lexical_modes("no_backslash_escapes"), "");
        assert_eq!(
            strip_lexical_modes("ONLY_FULL_GROUP_BY,NO_ENGINE_SUBSTITUTION"),
            "ONLY_FULL_GROUP_BY,NO_ENGINE_SUBSTITUTION"
        );
    }

    #[test]
    fn test_positional_params() {
        use crate::models::ScalarValue;
        let params = NativeParams::Positional(vec![ScalarValue::Int(1)]);
        assert_eq!(positional(&params).len(), 1);
        assert!(positional(&NativeParams::None).is_empty());
    }
}
