//! Oracle connections over the `oracle` crate (ODPI-C).
//!
//! The driver is blocking, so every call runs on `spawn_blocking`. The
//! connection is shared with the blocking task through an `Arc` so a timed-out
//! call can be interrupted with `break_execution` from the async side.

use crate::db::connection::SessionSettings;
use crate::db::dialect::error_code;
use crate::db::types::{categorize_type, encode_binary, float_value, TypeCategory};
use crate::error::{NativeError, NativeErrorCategory};
use crate::models::{BoundStatement, DatabaseType, DbConfig, FetchedRows, NativeParams, ScalarValue};
use oracle::StatementType;
use oracle::sql_type::{OracleType, ToSql};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

impl From<oracle::Error> for NativeError {
    fn from(err: oracle::Error) -> Self {
        let message = err.to_string();
        if let Some(code) = error_code(&message, "ORA-") {
            return NativeError::database(None, Some(code), message);
        }
        if error_code(&message, "DPI-").is_some() {
            return NativeError::new(NativeErrorCategory::Driver, message);
        }
        NativeError::new(NativeErrorCategory::Other, message)
    }
}

fn join_error(err: tokio::task::JoinError) -> NativeError {
    NativeError::new(
        NativeErrorCategory::Driver,
        format!("Oracle worker failed: {}", err),
    )
}

/// `//host:port/service`, or `tcps://` when TLS is required.
fn connect_string(config: &DbConfig) -> String {
    let scheme = if config.ssl_mode_or_default().requires_tls() {
        "tcps://"
    } else {
        "//"
    };
    format!("{}{}:{}/{}", scheme, config.host, config.port, config.database)
}

pub struct OracleConnection {
    inner: Arc<oracle::Connection>,
}

impl fmt::Debug for OracleConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConnection").finish_non_exhaustive()
    }
}

impl OracleConnection {
    pub async fn connect(config: &DbConfig, session: &SessionSettings) -> Result<Self, NativeError> {
        let user = config.user.clone();
        let password = config.password.clone();
        let target = connect_string(config);
        let call_timeout = session.statement_timeout;

        let conn = tokio::task::spawn_blocking(move || -> Result<oracle::Connection, NativeError> {
            let conn = oracle::Connection::connect(&user, &password, &target)?;
            conn.set_call_timeout(Some(call_timeout))?;
            Ok(conn)
        })
        .await
        .map_err(join_error)??;

        Ok(Self {
            inner: Arc::new(conn),
        })
    }

    pub async fn fetch(
        &mut self,
        stmt: &BoundStatement,
        max_rows: usize,
    ) -> Result<FetchedRows, NativeError> {
        let conn = Arc::clone(&self.inner);
        let sql = stmt.sql.clone();
        let binds = named(&stmt.params);

        tokio::task::spawn_blocking(move || -> Result<FetchedRows, NativeError> {
            let values: Vec<(String, Box<dyn ToSql>)> =
                binds.into_iter().map(|(name, v)| (name, to_sql(v))).collect();
            let refs: Vec<(&str, &dyn ToSql)> = values
                .iter()
                .map(|(name, v)| (name.as_str(), v.as_ref()))
                .collect();

            let mut prepared = conn.statement(&sql).build()?;
            match execution_for(prepared.statement_type()) {
                Execution::Query => {}
                Execution::Write => {
                    prepared.execute_named(&refs)?;
                    let affected = prepared.row_count()?;
                    conn.commit()?;
                    debug!(affected, "Committed write");
                    return Ok(FetchedRows::default());
                }
                Execution::Refused => {
                    return Err(NativeError::new(
                        NativeErrorCategory::Other,
                        format!(
                            "{:?} statements are not executed on Oracle",
                            prepared.statement_type()
                        ),
                    ));
                }
            }

            let result_set = prepared.query_named(&refs)?;
            let info = result_set.column_info();
            let columns = info.iter().map(|c| c.name().to_string()).collect();
            let categories: Vec<TypeCategory> = info
                .iter()
                .map(|c| categorize_type(&type_name(c.oracle_type()), DatabaseType::Oracle))
                .collect();

            let mut rows = Vec::new();
            for row in result_set.take(max_rows) {
                let row = row?;
                rows.push(
                    row.sql_values()
                        .iter()
                        .zip(&categories)
                        .map(|(value, category)| decode(value, *category, column_type(value)))
                        .collect(),
                );
            }
            Ok(FetchedRows { columns, rows })
        })
        .await
        .map_err(join_error)?
    }

    /// Run `EXPLAIN PLAN FOR ...` and roll back the plan table rows.
    pub async fn check_syntax(&mut self, stmt: &BoundStatement) -> Result<(), NativeError> {
        let conn = Arc::clone(&self.inner);
        let sql = stmt.sql.clone();
        let binds = named(&stmt.params);

        tokio::task::spawn_blocking(move || -> Result<(), NativeError> {
            let values: Vec<(String, Box<dyn ToSql>)> =
                binds.into_iter().map(|(name, v)| (name, to_sql(v))).collect();
            let refs: Vec<(&str, &dyn ToSql)> = values
                .iter()
                .map(|(name, v)| (name.as_str(), v.as_ref()))
                .collect();
            let outcome = conn.execute_named(&sql, &refs).map(|_| ());
            conn.rollback()?;
            Ok(outcome?)
        })
        .await
        .map_err(join_error)?
    }

    pub async fn close(self) -> Result<(), NativeError> {
        let conn = self.inner;
        tokio::task::spawn_blocking(move || conn.close().map_err(NativeError::from))
            .await
            .map_err(join_error)?
    }

    /// Interrupt the running call, then close.
    pub async fn abort(self) {
        let conn = self.inner;
        let outcome = tokio::task::spawn_blocking(move || {
            if let Err(e) = conn.break_execution() {
                debug!(error = %e, "break_execution failed");
            }
            conn.close()
        })
        .await;
        if let Ok(Err(e)) = outcome {
            warn!(error = %e, "Failed to close aborted Oracle connection");
        }
    }
}

/// How `fetch` runs a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    /// Stream rows from a result set.
    Query,
    /// Execute, then commit; the driver never autocommits.
    Write,
    Refused,
}

fn execution_for(ty: StatementType) -> Execution {
    match ty {
        StatementType::Select => Execution::Query,
        StatementType::Insert
        | StatementType::Update
        | StatementType::Delete
        | StatementType::Merge => Execution::Write,
        _ => Execution::Refused,
    }
}

fn named(params: &NativeParams) -> Vec<(String, ScalarValue)> {
    match params {
        NativeParams::Named(values) => values.clone(),
        _ => Vec::new(),
    }
}

/// Booleans bind as 1/0; SQL BOOLEAN only exists from 23ai.
fn to_sql(value: ScalarValue) -> Box<dyn ToSql> {
    match value {
        ScalarValue::Null => Box::new(None::<String>),
        ScalarValue::Bool(b) => Box::new(i64::from(b)),
        ScalarValue::Int(i) => Box::new(i),
        ScalarValue::Float(f) => Box::new(f),
        ScalarValue::Text(s) => Box::new(s),
    }
}

fn type_name(ty: &OracleType) -> String {
    match ty {
        OracleType::Number(_, _) | OracleType::Float(_) => "number".to_string(),
        OracleType::BinaryFloat => "binary_float".to_string(),
        OracleType::BinaryDouble => "binary_double".to_string(),
        OracleType::Date => "date".to_string(),
        OracleType::Timestamp(_) => "timestamp".to_string(),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => {
            "timestamp with time zone".to_string()
        }
        OracleType::Raw(_) | OracleType::LongRaw => "raw".to_string(),
        OracleType::BLOB => "blob".to_string(),
        OracleType::Boolean => "boolean".to_string(),
        other => other.to_string(),
    }
}

fn column_type(value: &oracle::SqlValue) -> Option<OracleType> {
    value.oracle_type().ok().cloned()
}

/// `NUMBER(p, 0)` with `p <= 18` fits `i64`; other numbers stay text.
fn decode(value: &oracle::SqlValue, category: TypeCategory, ty: Option<OracleType>) -> ScalarValue {
    if value.is_null().unwrap_or(false) {
        return ScalarValue::Null;
    }
    match category {
        TypeCategory::Decimal => match ty {
            Some(OracleType::Number(precision, 0)) if (1..=18).contains(&precision) => value
                .get::<i64>()
                .map_or(ScalarValue::Null, ScalarValue::Int),
            _ => text(value),
        },
        TypeCategory::Float => value.get::<f64>().map_or(ScalarValue::Null, float_value),
        TypeCategory::Boolean => value.get::<bool>().map_or(ScalarValue::Null, ScalarValue::Bool),
        TypeCategory::Binary => value
            .get::<Vec<u8>>()
            .map_or(ScalarValue::Null, |bytes| encode_binary(&bytes)),
        _ => text(value),
    }
}

fn text(value: &oracle::SqlValue) -> ScalarValue {
    value.get::<String>().map_or(ScalarValue::Null, ScalarValue::Text)
}
