//! Engine dialects.
//!
//! A [`Dialect`] is selected from [`DbConfig::db_type`] and carries the
//! catalog scope from the config. Every variant offers the same surface:
//! placeholder rewriting, row limits, catalog queries, error mapping and the
//! probe/explain statements. Dispatch is a single `match` per call.

mod mysql;
mod oracle;
mod postgres;
mod rewrite;
mod scan;

pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

#[cfg(feature = "oracle")]
pub(crate) use oracle::error_code;

use crate::error::{CanonicalError, DbResult, ErrorKind, NativeError, NativeErrorCategory};
use crate::models::{BoundStatement, DatabaseType, DbConfig, NamedParams};

/// Engine-specific SQL behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialect {
    PostgreSql(PostgresDialect),
    MySql(MySqlDialect),
    Oracle(OracleDialect),
}

/// Expand to a `match` calling the same method on every variant.
macro_rules! dispatch {
    ($dialect:expr, $d:ident => $body:expr) => {
        match $dialect {
            Dialect::PostgreSql($d) => $body,
            Dialect::MySql($d) => $body,
            Dialect::Oracle($d) => $body,
        }
    };
}

impl Dialect {
    pub fn for_engine(engine: DatabaseType, schema: Option<String>) -> Self {
        match engine {
            DatabaseType::PostgreSQL => Self::PostgreSql(PostgresDialect::new(schema)),
            DatabaseType::MySQL => Self::MySql(MySqlDialect::new(schema)),
            DatabaseType::Oracle => Self::Oracle(OracleDialect::new(schema)),
        }
    }

    pub fn for_config(config: &DbConfig) -> Self {
        Self::for_engine(config.db_type, config.schema.clone())
    }

    pub fn engine(&self) -> DatabaseType {
        match self {
            Self::PostgreSql(_) => DatabaseType::PostgreSQL,
            Self::MySql(_) => DatabaseType::MySQL,
            Self::Oracle(_) => DatabaseType::Oracle,
        }
    }

    /// Rewrite `%(name)s` (and Oracle `:name`) into native placeholders.
    ///
    /// Values are never spliced into the SQL text. A placeholder without a
    /// value, or a native positional placeholder in the input, is a
    /// `bad_request`.
    pub fn rewrite_params(&self, sql: &str, params: &NamedParams) -> DbResult<BoundStatement> {
        dispatch!(self, d => d.rewrite_params(sql, params))
    }

    /// Bound a read statement to at most `limit` rows.
    ///
    /// Non-read statements come back unchanged. Applying twice keeps the
    /// smaller limit.
    pub fn apply_row_limit(&self, sql: &str, limit: u32) -> String {
        dispatch!(self, d => d.apply_row_limit(sql, limit))
    }

    /// `(table_schema, table_name, table_type)`
    pub fn list_tables_query(&self, schema: Option<&str>) -> BoundStatement {
        dispatch!(self, d => d.list_tables_query(schema))
    }

    /// `(table_name, column_name, data_type, is_nullable, column_default, ordinal_position)`
    pub fn describe_columns_query(
        &self,
        table: Option<&str>,
        schema: Option<&str>,
    ) -> BoundStatement {
        dispatch!(self, d => d.describe_columns_query(table, schema))
    }

    /// `(view_schema, view_name, view_definition)`
    pub fn list_views_query(&self, schema: Option<&str>) -> BoundStatement {
        dispatch!(self, d => d.list_views_query(schema))
    }

    /// `(routine_schema, routine_name, routine_type)`
    pub fn list_routines_query(&self, schema: Option<&str>) -> BoundStatement {
        dispatch!(self, d => d.list_routines_query(schema))
    }

    /// Map a driver error into the canonical taxonomy. Callers redact.
    pub fn map_error(&self, native: &NativeError) -> CanonicalError {
        dispatch!(self, d => d.map_error(native))
    }

    pub fn probe_sql(&self) -> &'static str {
        dispatch!(self, d => d.probe_sql())
    }

    pub fn explain_sql(&self, sql: &str) -> String {
        dispatch!(self, d => d.explain_sql(sql))
    }
}

/// Errors that never reached the server.
pub(crate) fn transport_error(native: &NativeError) -> Option<CanonicalError> {
    use NativeErrorCategory as C;
    let kind = match native.category {
        C::Database | C::Driver => return None,
        C::Io | C::Tls | C::Configuration | C::Protocol => ErrorKind::ConnectionFailed,
        C::Timeout => ErrorKind::Timeout,
        C::Decode | C::Other => ErrorKind::Unknown,
    };
    Some(CanonicalError::new(kind, native.message.clone()))
}

/// SQLSTATE classification shared by PostgreSQL and the MySQL fallback.
pub(crate) fn sqlstate_kind(state: &str) -> ErrorKind {
    match state {
        "" => ErrorKind::Unknown,
        "42501" => ErrorKind::PermissionDenied,
        "42601" | "42000" => ErrorKind::SyntaxError,
        "42P01" | "42703" | "42883" | "3D000" | "3F000" | "42S02" | "42S22" => {
            ErrorKind::NotFound
        }
        "57014" | "HY008" | "70100" => ErrorKind::Timeout,
        "53300" => ErrorKind::ConnectionFailed,
        s if s.starts_with("28") => ErrorKind::AuthFailed,
        s if s.starts_with("23") => ErrorKind::ConstraintViolation,
        s if s.starts_with("08") => ErrorKind::ConnectionFailed,
        s if s.starts_with("42") => ErrorKind::SyntaxError,
        _ => ErrorKind::Unknown,
    }
}
