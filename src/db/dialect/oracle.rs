//! Oracle dialect: `:name` binds, `FETCH FIRST`, `user_*`/`all_*` views.

use super::rewrite::{self, PlaceholderStyle};
use super::scan::ScanRules;
use super::transport_error;
use crate::error::{CanonicalError, DbResult, ErrorKind, NativeError};
use crate::models::{BoundStatement, DatabaseType, NamedParams, NativeParams, ScalarValue};

mod queries {
    pub const USER_TABLES: &str = r#"
SELECT USER AS table_schema, table_name, 'BASE TABLE' AS table_type FROM user_tables
UNION ALL
SELECT USER, view_name, 'VIEW' FROM user_views
ORDER BY 2"#;

    pub const OWNER_TABLES: &str = r#"
SELECT owner AS table_schema, table_name, 'BASE TABLE' AS table_type FROM all_tables WHERE owner = :owner
UNION ALL
SELECT owner, view_name, 'VIEW' FROM all_views WHERE owner = :owner
ORDER BY 2"#;

    pub const USER_COLUMNS: &str = r#"
SELECT table_name, column_name, data_type, nullable, data_default, column_id
FROM user_tab_columns
WHERE 1 = 1{table}
ORDER BY table_name, column_id"#;

    pub const OWNER_COLUMNS: &str = r#"
SELECT table_name, column_name, data_type, nullable, data_default, column_id
FROM all_tab_columns
WHERE owner = :owner{table}
ORDER BY table_name, column_id"#;

    /// Matches both case-sensitive and unquoted (upper-cased) names.
    pub const TABLE_FILTER: &str = " AND table_name IN (:table_name, UPPER(:table_name))";

    pub const USER_VIEWS: &str =
        "SELECT USER AS view_schema, view_name, text FROM user_views ORDER BY view_name";

    pub const OWNER_VIEWS: &str = "SELECT owner AS view_schema, view_name, text FROM all_views \
                                   WHERE owner = :owner ORDER BY view_name";

    pub const USER_ROUTINES: &str = "SELECT USER AS routine_schema, object_name, object_type \
                                     FROM user_objects WHERE object_type IN ('PROCEDURE', 'FUNCTION') \
                                     ORDER BY object_name";

    pub const OWNER_ROUTINES: &str = "SELECT owner AS routine_schema, object_name, object_type \
                                      FROM all_objects WHERE owner = :owner \
                                      AND object_type IN ('PROCEDURE', 'FUNCTION') ORDER BY object_name";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleDialect {
    /// Schema owner for `all_*` views; the connected user's `user_*` views
    /// when unset.
    pub owner: Option<String>,
}

impl OracleDialect {
    pub fn new(owner: Option<String>) -> Self {
        Self {
            owner: owner.map(|o| normalize_owner(&o)),
        }
    }

    fn rules() -> ScanRules {
        ScanRules::for_engine(DatabaseType::Oracle)
    }

    pub fn rewrite_params(&self, sql: &str, params: &NamedParams) -> DbResult<BoundStatement> {
        rewrite::rewrite_placeholders(sql, params, Self::rules(), PlaceholderStyle::Named)
    }

    pub fn apply_row_limit(&self, sql: &str, limit: u32) -> String {
        match rewrite::limit_target(sql, Self::rules()) {
            Some(target) => rewrite::fetch_clause(&target, limit, |sql, n| {
                format!("SELECT * FROM (\n{}\n)\nFETCH FIRST {} ROWS ONLY", sql, n)
            }),
            None => sql.to_string(),
        }
    }

    fn owner(&self, schema: Option<&str>) -> Option<String> {
        schema.map(normalize_owner).or_else(|| self.owner.clone())
    }

    fn scoped(&self, schema: Option<&str>, user_sql: &str, owner_sql: &str) -> BoundStatement {
        match self.owner(schema) {
            Some(owner) => BoundStatement::new(
                owner_sql,
                NativeParams::Named(vec![("owner".to_string(), ScalarValue::Text(owner))]),
            ),
            None => BoundStatement::plain(user_sql),
        }
    }

    pub fn list_tables_query(&self, schema: Option<&str>) -> BoundStatement {
        self.scoped(schema, queries::USER_TABLES, queries::OWNER_TABLES)
    }

    pub fn describe_columns_query(&self, table: Option<&str>, schema: Option<&str>) -> BoundStatement {
        let filter = if table.is_some() { queries::TABLE_FILTER } else { "" };
        let stmt = self.scoped(
            schema,
            &queries::USER_COLUMNS.replace("{table}", filter),
            &queries::OWNER_COLUMNS.replace("{table}", filter),
        );
        let Some(table) = table else {
            return stmt;
        };
        let mut binds = match stmt.params {
            NativeParams::Named(binds) => binds,
            _ => Vec::new(),
        };
        binds.push(("table_name".to_string(), ScalarValue::Text(table.to_string())));
        BoundStatement::new(stmt.sql, NativeParams::Named(binds))
    }

    pub fn list_views_query(&self, schema: Option<&str>) -> BoundStatement {
        self.scoped(schema, queries::USER_VIEWS, queries::OWNER_VIEWS)
    }

    pub fn list_routines_query(&self, schema: Option<&str>) -> BoundStatement {
        self.scoped(schema, queries::USER_ROUTINES, queries::OWNER_ROUTINES)
    }

    pub fn map_error(&self, native: &NativeError) -> CanonicalError {
        let dpi = error_code(&native.message, "DPI-");
        let ora = native.vendor_code.or_else(|| error_code(&native.message, "ORA-"));

        if let Some(1047 | 1080) = dpi {
            return CanonicalError::new(ErrorKind::ConnectionFailed, native.message.clone())
                .with_detail(format!("DPI-{:04}", dpi.unwrap_or_default()));
        }
        let Some(code) = ora else {
            return transport_error(native)
                .unwrap_or_else(|| CanonicalError::new(ErrorKind::Unknown, native.message.clone()));
        };
        let kind = match code {
            1017 | 28000 | 28001 => ErrorKind::AuthFailed,
            1031 | 1039 => ErrorKind::PermissionDenied,
            942 | 904 | 4043 | 1918 => ErrorKind::NotFound,
            900..=936 => ErrorKind::SyntaxError,
            1 | 1400 | 2290 | 2291 | 2292 => ErrorKind::ConstraintViolation,
            1013 | 3156 => ErrorKind::Timeout,
            12154 | 12514 | 12541 | 12505 | 12545 | 3113 | 3114 | 12537 | 12170 => {
                ErrorKind::ConnectionFailed
            }
            _ => ErrorKind::Unknown,
        };
        CanonicalError::new(kind, native.message.clone()).with_detail(format!("ORA-{:05}", code))
    }

    pub fn probe_sql(&self) -> &'static str {
        "SELECT 1 FROM dual"
    }

    pub fn explain_sql(&self, sql: &str) -> String {
        format!("EXPLAIN PLAN FOR {}", sql)
    }
}

/// Unquoted owners are stored upper-case in the data dictionary.
fn normalize_owner(owner: &str) -> String {
    match owner.strip_prefix('"').and_then(|o| o.strip_suffix('"')) {
        Some(quoted) => quoted.to_string(),
        None => owner.to_ascii_uppercase(),
    }
}

/// Parse the number following `prefix`, e.g. `ORA-00942` gives 942.
pub(crate) fn error_code(message: &str, prefix: &str) -> Option<i64> {
    let start = message.find(prefix)? + prefix.len();
    let digits: String = message[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
