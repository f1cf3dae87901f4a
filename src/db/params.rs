//! Binding [`ScalarValue`] parameters to sqlx queries.

use crate::models::ScalarValue;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::{MySql, Postgres};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q ScalarValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        ScalarValue::Null => query.bind(None::<String>),
        ScalarValue::Bool(v) => query.bind(*v),
        ScalarValue::Int(v) => query.bind(*v),
        ScalarValue::Float(v) => query.bind(*v),
        ScalarValue::Text(v) => query.bind(v.as_str()),
    }
}

/// Bind a parameter to a PostgreSQL query.
///
/// PostgreSQL is strict about parameter types: a text value compared against
/// an integer column needs an explicit cast in the statement.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q ScalarValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        ScalarValue::Null => query.bind(None::<String>),
        ScalarValue::Bool(v) => query.bind(*v),
        ScalarValue::Int(v) => query.bind(*v),
        ScalarValue::Float(v) => query.bind(*v),
        ScalarValue::Text(v) => query.bind(v.as_str()),
    }
}
