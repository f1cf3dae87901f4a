//! MySQL/MariaDB dialect: `?` placeholders, `LIMIT`, `information_schema`.

use super::rewrite::{self, PlaceholderStyle};
use super::scan::ScanRules;
use super::{sqlstate_kind, transport_error};
use crate::error::{CanonicalError, DbResult, ErrorKind, NativeError};
use crate::models::{BoundStatement, DatabaseType, NamedParams, NativeParams, ScalarValue};

// information_schema columns are cast to CHAR so they decode as text on
// servers that report them with a binary collation.
mod queries {
    pub const LIST_TABLES: &str = r#"
SELECT CAST(TABLE_SCHEMA AS CHAR) AS table_schema, CAST(TABLE_NAME AS CHAR) AS table_name,
       CAST(TABLE_TYPE AS CHAR) AS table_type
FROM information_schema.tables
WHERE TABLE_SCHEMA = {scope}
ORDER BY TABLE_SCHEMA, TABLE_NAME"#;

    pub const DESCRIBE_COLUMNS: &str = r#"
SELECT CAST(TABLE_NAME AS CHAR) AS table_name, CAST(COLUMN_NAME AS CHAR) AS column_name,
       CAST(COLUMN_TYPE AS CHAR) AS data_type, CAST(IS_NULLABLE AS CHAR) AS is_nullable,
       CAST(COLUMN_DEFAULT AS CHAR) AS column_default,
       CAST(ORDINAL_POSITION AS SIGNED) AS ordinal_position
FROM information_schema.columns
WHERE TABLE_SCHEMA = {scope}
ORDER BY TABLE_NAME, ORDINAL_POSITION"#;

    pub const LIST_VIEWS: &str = r#"
SELECT CAST(TABLE_SCHEMA AS CHAR) AS view_schema, CAST(TABLE_NAME AS CHAR) AS view_name,
       CAST(VIEW_DEFINITION AS CHAR) AS view_definition
FROM information_schema.views
WHERE TABLE_SCHEMA = {scope}
ORDER BY TABLE_NAME"#;

    pub const LIST_ROUTINES: &str = r#"
SELECT CAST(ROUTINE_SCHEMA AS CHAR) AS routine_schema, CAST(ROUTINE_NAME AS CHAR) AS routine_name,
       CAST(ROUTINE_TYPE AS CHAR) AS routine_type
FROM information_schema.routines
WHERE ROUTINE_SCHEMA = {scope}
ORDER BY ROUTINE_NAME"#;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MySqlDialect {
    /// Catalog scope; `DATABASE()` when unset.
    pub schema: Option<String>,
}

impl MySqlDialect {
    pub fn new(schema: Option<String>) -> Self {
        Self { schema }
    }

    fn rules() -> ScanRules {
        ScanRules::for_engine(DatabaseType::MySQL)
    }

    pub fn rewrite_params(&self, sql: &str, params: &NamedParams) -> DbResult<BoundStatement> {
        rewrite::rewrite_placeholders(sql, params, Self::rules(), PlaceholderStyle::Question)
    }

    pub fn apply_row_limit(&self, sql: &str, limit: u32) -> String {
        match rewrite::limit_target(sql, Self::rules()) {
            Some(target) => rewrite::limit_clause(&target, limit, false, |sql, n| {
                format!("SELECT * FROM (\n{}\n) AS limited_rows\nLIMIT {}", sql, n)
            }),
            None => sql.to_string(),
        }
    }

    fn catalog(&self, template: &str, schema: Option<&str>) -> BoundStatement {
        match schema.or(self.schema.as_deref()) {
            Some(schema) => BoundStatement::new(
                template.replace("{scope}", "?"),
                NativeParams::Positional(vec![ScalarValue::Text(schema.to_string())]),
            ),
            None => BoundStatement::plain(template.replace("{scope}", "DATABASE()")),
        }
    }

    pub fn list_tables_query(&self, schema: Option<&str>) -> BoundStatement {
        self.catalog(queries::LIST_TABLES, schema)
    }

    pub fn describe_columns_query(&self, table: Option<&str>, schema: Option<&str>) -> BoundStatement {
        let stmt = self.catalog(queries::DESCRIBE_COLUMNS, schema);
        let Some(table) = table else {
            return stmt;
        };
        let sql = stmt
            .sql
            .replace("\nORDER BY", " AND TABLE_NAME = ?\nORDER BY");
        let mut values = match stmt.params {
            NativeParams::Positional(values) => values,
            _ => Vec::new(),
        };
        values.push(ScalarValue::Text(table.to_string()));
        BoundStatement::new(sql, NativeParams::Positional(values))
    }

    pub fn list_views_query(&self, schema: Option<&str>) -> BoundStatement {
        self.catalog(queries::LIST_VIEWS, schema)
    }

    pub fn list_routines_query(&self, schema: Option<&str>) -> BoundStatement {
        self.catalog(queries::LIST_ROUTINES, schema)
    }

    pub fn map_error(&self, native: &NativeError) -> CanonicalError {
        if let Some(err) = transport_error(native) {
            return err;
        }
        let state = native.sql_state.as_deref().unwrap_or_default();
        let kind = match native.vendor_code {
            Some(1045) => ErrorKind::AuthFailed,
            Some(1044 | 1142 | 1143 | 1227 | 1370) => ErrorKind::PermissionDenied,
            Some(1064) => ErrorKind::SyntaxError,
            Some(1146 | 1054 | 1049) => ErrorKind::NotFound,
            Some(1062 | 1451 | 1452 | 1048 | 1216 | 1217 | 4025 | 3819) => {
                ErrorKind::ConstraintViolation
            }
            Some(3024 | 1317) => ErrorKind::Timeout,
            Some(2002 | 2003 | 2013) => ErrorKind::ConnectionFailed,
            _ => sqlstate_kind(state),
        };
        let detail = match (native.vendor_code, state) {
            (Some(code), "") => Some(format!("MySQL error {}", code)),
            (Some(code), state) => Some(format!("MySQL error {} (SQLSTATE {})", code, state)),
            (None, "") => None,
            (None, state) => Some(format!("SQLSTATE {}", state)),
        };
        let err = CanonicalError::new(kind, native.message.clone());
        match detail {
            Some(detail) => err.with_detail(detail),
            None => err,
        }
    }

    pub fn probe_sql(&self) -> &'static str {
        "SELECT 1"
    }

    pub fn explain_sql(&self, sql: &str) -> String {
        format!("EXPLAIN {}", sql)
    }
}
