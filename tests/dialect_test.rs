//! Dialect behavior shared by every engine.

use db_steward_mcp::db::Dialect;
use db_steward_mcp::error::ErrorKind;
use db_steward_mcp::models::{DatabaseType, NamedParams, NativeParams, ScalarValue};

const ENGINES: [DatabaseType; 3] = [
    DatabaseType::PostgreSQL,
    DatabaseType::MySQL,
    DatabaseType::Oracle,
];

fn dialect(engine: DatabaseType) -> Dialect {
    Dialect::for_engine(engine, None)
}

fn bound_values(params: &NativeParams) -> Vec<ScalarValue> {
    match params {
        NativeParams::None => Vec::new(),
        NativeParams::Positional(values) => values.clone(),
        NativeParams::Named(pairs) => pairs.iter().map(|(_, v)| v.clone()).collect(),
    }
}

#[test]
fn test_rewrite_is_injection_safe() {
    let hostile = [
        "O'Brien",
        "'; DROP TABLE users; --",
        "' OR '1'='1",
        "\\'; DELETE FROM t; --",
        "%(other)s",
    ];
    for engine in ENGINES {
        for value in hostile {
            let mut params = NamedParams::new();
            params.insert("name".to_string(), ScalarValue::Text(value.to_string()));
            let bound = dialect(engine)
                .rewrite_params("SELECT * FROM users WHERE name = %(name)s", &params)
                .unwrap();
            assert!(!bound.sql.contains(value), "{:?}: {}", engine, bound.sql);
            assert!(!bound.sql.contains('\''), "{:?}: {}", engine, bound.sql);
            assert_eq!(
                bound_values(&bound.params),
                vec![ScalarValue::Text(value.to_string())]
            );
        }
    }
}

#[test]
fn test_rewrite_reproduces_values_in_order() {
    let mut params = NamedParams::new();
    params.insert("lo".to_string(), ScalarValue::Int(10));
    params.insert("hi".to_string(), ScalarValue::Float(99.5));
    params.insert("flag".to_string(), ScalarValue::Bool(true));
    let sql = "SELECT * FROM t WHERE a BETWEEN %(lo)s AND %(hi)s AND b = %(flag)s";
    for engine in ENGINES {
        let bound = dialect(engine).rewrite_params(sql, &params).unwrap();
        assert_eq!(
            bound_values(&bound.params),
            vec![
                ScalarValue::Int(10),
                ScalarValue::Float(99.5),
                ScalarValue::Bool(true)
            ],
            "{:?}",
            engine
        );
        assert!(!bound.sql.contains("%("));
    }
}

#[test]
fn test_rewrite_missing_value_is_bad_request() {
    for engine in ENGINES {
        let err = dialect(engine)
            .rewrite_params("SELECT %(missing)s", &NamedParams::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest, "{:?}", engine);
    }
}

#[test]
fn test_placeholder_text_inside_literals_is_left_alone() {
    for engine in ENGINES {
        let bound = dialect(engine)
            .rewrite_params("SELECT '%(name)s' AS label", &NamedParams::new())
            .unwrap();
        assert_eq!(bound.sql, "SELECT '%(name)s' AS label");
        assert!(bound.params.is_empty());
    }
}

fn limit_clause(engine: DatabaseType, n: u32) -> String {
    match engine {
        DatabaseType::Oracle => format!("FETCH FIRST {} ROWS ONLY", n),
        _ => format!("LIMIT {}", n),
    }
}

#[test]
fn test_row_limit_composed_twice_keeps_smaller() {
    let sql = "SELECT id, note FROM orders WHERE note <> 'LIMIT 9' ORDER BY id";
    for engine in ENGINES {
        let d = dialect(engine);
        for (first, second) in [(400, 25), (25, 400)] {
            let twice = d.apply_row_limit(&d.apply_row_limit(sql, first), second);
            assert!(twice.contains(&limit_clause(engine, 25)), "{:?}: {}", engine, twice);
            assert!(!twice.contains(&limit_clause(engine, 400)), "{:?}: {}", engine, twice);
        }
    }
}

#[test]
fn test_row_limit_leaves_writes_alone() {
    for engine in ENGINES {
        let d = dialect(engine);
        for sql in ["DELETE FROM t WHERE id = 1", "UPDATE t SET a = 1"] {
            assert_eq!(d.apply_row_limit(sql, 10), sql);
        }
    }
}

#[test]
fn test_probe_and_catalog_queries() {
    assert_eq!(dialect(DatabaseType::Oracle).probe_sql(), "SELECT 1 FROM dual");
    assert_eq!(dialect(DatabaseType::PostgreSQL).probe_sql(), "SELECT 1");
    for engine in ENGINES {
        let d = Dialect::for_engine(engine, Some("sales".to_string()));
        let tables = d.list_tables_query(None);
        assert_eq!(bound_values(&tables.params).len(), 1, "{:?}", engine);
        let columns = d.describe_columns_query(Some("orders"), None);
        assert_eq!(bound_values(&columns.params).len(), 2, "{:?}", engine);
        assert!(!columns.sql.contains("orders"));
    }
}
