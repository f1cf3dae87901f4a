//! Data models for the DB Steward MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfigError, DatabaseType, DbConfig, SslMode};
pub use query::{
    BoundStatement, CanonicalResult, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, FetchedRows,
    MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT, NamedParams, NativeParams, ScalarValue,
};
pub use schema::{
    ColumnEntry, RoutineEntry, RoutineType, TableDescription, TableEntry, TableType, ViewEntry,
    group_columns,
};
