//! PostgreSQL dialect: `$n` placeholders, `LIMIT`, `information_schema`.

use super::rewrite::{self, PlaceholderStyle};
use super::scan::ScanRules;
use super::{sqlstate_kind, transport_error};
use crate::error::{CanonicalError, DbResult, NativeError};
use crate::models::{BoundStatement, DatabaseType, NamedParams, NativeParams, ScalarValue};

mod queries {
    pub const LIST_TABLES: &str = r#"
SELECT table_schema::text, table_name::text, table_type::text
FROM information_schema.tables
WHERE {scope}
ORDER BY table_schema, table_name"#;

    pub const DESCRIBE_COLUMNS: &str = r#"
SELECT table_name::text, column_name::text, data_type::text, is_nullable::text,
       column_default::text, ordinal_position::int
FROM information_schema.columns
WHERE {scope}
ORDER BY table_name, ordinal_position"#;

    pub const LIST_VIEWS: &str = r#"
SELECT table_schema::text, table_name::text, view_definition::text
FROM information_schema.views
WHERE {scope}
ORDER BY table_schema, table_name"#;

    pub const LIST_ROUTINES: &str = r#"
SELECT routine_schema::text, routine_name::text, routine_type::text
FROM information_schema.routines
WHERE {scope} AND routine_type IN ('PROCEDURE', 'FUNCTION')
ORDER BY routine_schema, routine_name"#;

    pub const SYSTEM_SCHEMAS: &str = "NOT IN ('pg_catalog', 'information_schema')";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostgresDialect {
    /// Default catalog scope; also the connection's `search_path`.
    pub schema: Option<String>,
}

impl PostgresDialect {
    pub fn new(schema: Option<String>) -> Self {
        Self { schema }
    }

    fn rules() -> ScanRules {
        ScanRules::for_engine(DatabaseType::PostgreSQL)
    }

    pub fn rewrite_params(&self, sql: &str, params: &NamedParams) -> DbResult<BoundStatement> {
        rewrite::rewrite_placeholders(sql, params, Self::rules(), PlaceholderStyle::Numbered)
    }

    pub fn apply_row_limit(&self, sql: &str, limit: u32) -> String {
        match rewrite::limit_target(sql, Self::rules()) {
            Some(target) => rewrite::limit_clause(&target, limit, true, |sql, n| {
                format!("SELECT * FROM (\n{}\n) AS limited_rows\nLIMIT {}", sql, n)
            }),
            None => sql.to_string(),
        }
    }

    /// Build `template` with `{scope}` replaced by a filter on `column`.
    fn catalog(
        &self,
        template: &str,
        column: &str,
        schema: Option<&str>,
        fallback: &str,
    ) -> (String, Vec<ScalarValue>) {
        match schema.or(self.schema.as_deref()) {
            Some(schema) => (
                template.replace("{scope}", &format!("{} = $1", column)),
                vec![ScalarValue::Text(schema.to_string())],
            ),
            None => (
                template.replace("{scope}", &format!("{} {}", column, fallback)),
                Vec::new(),
            ),
        }
    }

    pub fn list_tables_query(&self, schema: Option<&str>) -> BoundStatement {
        let (sql, params) = self.catalog(
            queries::LIST_TABLES,
            "table_schema",
            schema,
            queries::SYSTEM_SCHEMAS,
        );
        bound(sql, params)
    }

    pub fn describe_columns_query(&self, table: Option<&str>, schema: Option<&str>) -> BoundStatement {
        let (mut sql, mut params) = self.catalog(
            queries::DESCRIBE_COLUMNS,
            "table_schema",
            schema,
            "= current_schema()",
        );
        if let Some(table) = table {
            params.push(ScalarValue::Text(table.to_string()));
            sql = sql.replace(
                "\nORDER BY",
                &format!(" AND table_name = ${}\nORDER BY", params.len()),
            );
        }
        bound(sql, params)
    }

    pub fn list_views_query(&self, schema: Option<&str>) -> BoundStatement {
        let (sql, params) = self.catalog(
            queries::LIST_VIEWS,
            "table_schema",
            schema,
            queries::SYSTEM_SCHEMAS,
        );
        bound(sql, params)
    }

    pub fn list_routines_query(&self, schema: Option<&str>) -> BoundStatement {
        let (sql, params) = self.catalog(
            queries::LIST_ROUTINES,
            "routine_schema",
            schema,
            queries::SYSTEM_SCHEMAS,
        );
        bound(sql, params)
    }

    pub fn map_error(&self, native: &NativeError) -> CanonicalError {
        if let Some(err) = transport_error(native) {
            return err;
        }
        let state = native.sql_state.as_deref().unwrap_or_default();
        let err = CanonicalError::new(sqlstate_kind(state), native.message.clone());
        if state.is_empty() {
            err
        } else {
            err.with_detail(format!("SQLSTATE {}", state))
        }
    }

    pub fn probe_sql(&self) -> &'static str {
        "SELECT 1"
    }

    pub fn explain_sql(&self, sql: &str) -> String {
        format!("EXPLAIN {}", sql)
    }
}

fn bound(sql: String, params: Vec<ScalarValue>) -> BoundStatement {
    if params.is_empty() {
        BoundStatement::plain(sql)
    } else {
        BoundStatement::new(sql, NativeParams::Positional(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_list_tables_scope() {
        let d = PostgresDialect::default();
        let q = d.list_tables_query(None);
        assert!(q.sql.contains("NOT IN ('pg_catalog', 'information_schema')"));
        assert!(q.params.is_empty());

        let q = d.list_tables_query(Some("sales"));
        assert!(q.sql.contains("table_schema = $1"));
        assert_eq!(
            q.params,
            NativeParams::Positional(vec![ScalarValue::Text("sales".into())])
        );
    }

    #[test]
    fn test_describe_uses_configured_schema_and_table() {
        let d = PostgresDialect::new(Some("app".into()));
        let q = d.describe_columns_query(Some("users"), None);
        assert!(q.sql.contains("table_schema = $1 AND table_name = $2"));
        assert_eq!(q.params.len(), 2);

        let q = PostgresDialect::default().describe_columns_query(Some("users"), None);
        assert!(q.sql.contains("table_schema = current_schema() AND table_name = $1"));
    }

    #[test]
    fn test_row_limit() {
        let d = PostgresDialect::default();
        assert_eq!(d.apply_row_limit("SELECT 1", 100), "SELECT 1\nLIMIT 100");
        assert_eq!(d.apply_row_limit("SELECT * FROM t LIMIT 500", 100), "SELECT * FROM t LIMIT 100");
        assert_eq!(d.apply_row_limit("SELECT * FROM t LIMIT 5;", 100), "SELECT * FROM t LIMIT 5");
        assert_eq!(d.apply_row_limit("SELECT * FROM t LIMIT ALL", 10), "SELECT * FROM t LIMIT 10");
        assert_eq!(
            d.apply_row_limit("SELECT * FROM t FETCH FIRST 50 ROWS ONLY", 10),
            "SELECT * FROM t FETCH FIRST 10 ROWS ONLY"
        );
        assert_eq!(
            d.apply_row_limit("SELECT * FROM t LIMIT $1", 10),
            "SELECT * FROM (\nSELECT * FROM t LIMIT $1\n) AS limited_rows\nLIMIT 10"
        );
        assert_eq!(d.apply_row_limit("UPDATE t SET a = 1", 10), "UPDATE t SET a = 1");
    }

    #[test]
    fn test_map_error() {
        let d = PostgresDialect::default();
        let cases = [
            ("28P01", ErrorKind::AuthFailed),
            ("42601", ErrorKind::SyntaxError),
            ("42501", ErrorKind::PermissionDenied),
            ("42P01", ErrorKind::NotFound),
            ("23505", ErrorKind::ConstraintViolation),
            ("57014", ErrorKind::Timeout),
            ("08006", ErrorKind::ConnectionFailed),
            ("XX000", ErrorKind::Unknown),
        ];
        for (state, kind) in cases {
            let native = NativeError::database(Some(state.into()), None, "boom");
            let mapped = d.map_error(&native);
            assert_eq!(mapped.kind, kind, "SQLSTATE {}", state);
            assert_eq!(mapped.engine_detail, Some(format!("SQLSTATE {}", state)));
        }
    }
}
