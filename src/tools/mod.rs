//! MCP tool implementations.
//!
//! This module contains the database tool handlers:
//! - `connection`: connection input parsing and `db_test_connection`
//! - `validate`: `db_validate`, classification and policy without execution
//! - `schema`: `db_schema` and `db_list_tables`
//! - `query`: `db_query`
//!
//! Handlers share a [`ToolContext`] holding the connection manager and the
//! operator's policy. Inputs are validated before any classification or
//! connection work.

pub mod connection;
pub mod query;
pub mod schema;
pub mod validate;

pub use connection::{ConnectionInput, ConnectionToolHandler, TestConnectionInput, TestConnectionOutput};
pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use schema::{
    ListTablesInput, ListTablesOutput, SchemaInput, SchemaOutput, SchemaToolHandler,
};
pub use validate::{SyntaxCheck, ValidateInput, ValidateOutput, ValidateToolHandler};

use crate::db::{ConnectionManager, Connector};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, MAX_QUERY_TIMEOUT_SECS, NamedParams, ScalarValue};
use crate::safety::{PolicyConfig, StatementClassifier};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;

/// State shared by every tool handler.
#[derive(Debug)]
pub struct ToolContext<C: Connector> {
    manager: ConnectionManager<C>,
    policy: PolicyConfig,
    trusted_functions: Vec<String>,
}

impl<C: Connector> ToolContext<C> {
    pub fn new(manager: ConnectionManager<C>, policy: PolicyConfig) -> Self {
        Self {
            manager,
            policy,
            trusted_functions: Vec::new(),
        }
    }

    /// Functions the operator declares read-only, in addition to built-ins.
    pub fn with_trusted_functions<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trusted_functions = functions.into_iter().map(Into::into).collect();
        self
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub(crate) fn classifier(&self, engine: DatabaseType) -> StatementClassifier {
        StatementClassifier::new(engine, &self.trusted_functions)
    }
}

/// Fail with `bad_request` when a required string field is absent or blank.
pub(crate) fn require<'a>(value: &'a Option<String>, field: &str) -> DbResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DbError::bad_request(format!(
            "missing required field '{}'",
            field
        ))),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Convert a JSON `params` object into canonical named parameters.
pub(crate) fn parse_params(raw: Option<&Map<String, JsonValue>>) -> DbResult<NamedParams> {
    let Some(raw) = raw else {
        return Ok(NamedParams::new());
    };
    raw.iter()
        .map(|(name, value)| {
            if !is_identifier(name) {
                return Err(DbError::bad_request(format!(
                    "invalid parameter name '{}': names must match [A-Za-z_][A-Za-z0-9_]*",
                    name
                )));
            }
            let value = ScalarValue::try_from(value)
                .map_err(|e| DbError::bad_request(format!("parameter '{}': {}", name, e)))?;
            Ok((name.clone(), value))
        })
        .collect()
}

/// Per-call timeout, which may only lower the policy timeout.
pub(crate) fn effective_timeout(policy_secs: u32, requested: Option<u32>) -> DbResult<Duration> {
    let secs = match requested {
        Some(0) => return Err(DbError::bad_request("timeout must be at least 1 second")),
        Some(req) => req.min(policy_secs),
        None => policy_secs,
    };
    Ok(Duration::from_secs(u64::from(secs.min(MAX_QUERY_TIMEOUT_SECS))))
}
