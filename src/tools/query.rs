//! Query execution tool.
//!
//! This module implements the `db_query` MCP tool. Every statement is
//! classified and run through the policy first; denied statements never
//! reach a connection. Allowed reads are bounded by the effective row limit.

use crate::db::{Connection, Connector, Dialect};
use crate::error::{DbError, DbResult};
use crate::models::{CanonicalResult, MAX_ROW_LIMIT};
use crate::safety::{RiskTier, decide};
use crate::tools::connection::{ConnectionInput, require_config};
use crate::tools::{ToolContext, effective_timeout, parse_params, require};
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Target database connection settings
    #[serde(default)]
    pub config: Option<ConnectionInput>,
    /// SQL statement. Use %(name)s placeholders for parameters; values are always bound, never inlined.
    #[serde(default)]
    pub sql: Option<String>,
    /// Named parameter values (scalars only)
    #[serde(default)]
    pub params: Option<Map<String, JsonValue>>,
    /// Maximum rows to return. Can only lower the server's row limit. Max: 10000
    #[serde(default, alias = "limit")]
    pub max_rows: Option<u32>,
    /// Statement timeout in seconds. Can only lower the server's timeout.
    #[serde(default, alias = "timeout_secs")]
    pub timeout: Option<u32>,
}

/// Output from the query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryOutput {
    #[serde(flatten)]
    pub result: CanonicalResult,
    /// Risk tier the statement was classified as
    pub tier: RiskTier,
    /// Row limit applied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u32>,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Resolve the row limit from the policy and the caller's `max_rows`.
///
/// Returns the limit and whether the SQL should be rewritten to carry it.
/// Without any limit the fetch is still capped at [`MAX_ROW_LIMIT`].
fn resolve_row_limit(policy_limit: Option<u32>, max_rows: Option<u32>) -> DbResult<(u32, bool)> {
    match (policy_limit, max_rows) {
        (_, Some(0)) => Err(DbError::bad_request("max_rows must be at least 1")),
        (Some(limit), Some(requested)) => Ok((requested.min(limit).min(MAX_ROW_LIMIT), true)),
        (Some(limit), None) => Ok((limit.min(MAX_ROW_LIMIT), true)),
        (None, Some(requested)) => Ok((requested.min(MAX_ROW_LIMIT), true)),
        (None, None) => Ok((MAX_ROW_LIMIT, false)),
    }
}

/// Handler for `db_query`.
pub struct QueryToolHandler<C: Connector> {
    ctx: Arc<ToolContext<C>>,
}

impl<C: Connector> QueryToolHandler<C> {
    pub fn new(ctx: Arc<ToolContext<C>>) -> Self {
        Self { ctx }
    }

    /// Classify, decide, then execute on a fresh connection.
    pub async fn query(&self, input: QueryInput) -> DbResult<QueryOutput> {
        let config = require_config(&input.config)?;
        let sql = require(&input.sql, "sql")?;
        let params = parse_params(input.params.as_ref())?;

        let classification = self.ctx.classifier(config.db_type).classify(sql);
        let decision = decide(classification.tier, self.ctx.policy()).into_result()?;

        let (limit, rewrite) = resolve_row_limit(decision.row_limit, input.max_rows)?;
        let policy_timeout = decision
            .timeout_seconds
            .unwrap_or_else(|| self.ctx.policy().timeout_seconds());
        let timeout = effective_timeout(policy_timeout, input.timeout)?;

        let dialect = Dialect::for_config(&config);
        let bound = dialect.rewrite_params(sql, &params)?;
        // One row of lookahead tells a full page from a truncated one.
        let stmt = if rewrite {
            bound.with_sql(dialect.apply_row_limit(&bound.sql, limit + 1))
        } else {
            bound
        };
        let fetch_rows = limit as usize + 1;

        info!(
            engine = %config.db_type,
            target = %config.masked_target(),
            tier = %classification.tier,
            limit,
            timeout_secs = timeout.as_secs(),
            "Executing query"
        );
        debug!(sql = %stmt.sql, params = stmt.params.len(), "Query statement");

        let start = Instant::now();
        let fetched = self
            .ctx
            .manager()
            .with_connection(&config, &dialect, timeout, move |conn| {
                async move { conn.fetch(&stmt, fetch_rows).await }.boxed()
            })
            .await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let result = CanonicalResult::from_fetched(fetched, limit as usize);
        info!(
            row_count = result.row_count,
            truncated = result.truncated,
            execution_time_ms,
            "Query complete"
        );

        Ok(QueryOutput {
            result,
            tier: classification.tier,
            row_limit: rewrite.then_some(limit),
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::ScalarValue;

    #[test]
    fn test_resolve_row_limit_only_lowers() {
        assert_eq!(resolve_row_limit(Some(100), None).unwrap(), (100, true));
        assert_eq!(resolve_row_limit(Some(100), Some(10)).unwrap(), (10, true));
        assert_eq!(resolve_row_limit(Some(100), Some(5000)).unwrap(), (100, true));
        assert_eq!(resolve_row_limit(None, Some(50_000)).unwrap(), (MAX_ROW_LIMIT, true));
        assert_eq!(resolve_row_limit(None, None).unwrap(), (MAX_ROW_LIMIT, false));
    }

    #[test]
    fn test_resolve_row_limit_rejects_zero() {
        let err = resolve_row_limit(Some(100), Some(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_query_input_aliases() {
        let input: QueryInput = serde_json::from_str(
            r#"{"sql": "SELECT 1", "limit": 5, "timeout_secs": 3, "params": {"id": 1}}"#,
        )
        .unwrap();
        assert_eq!(input.max_rows, Some(5));
        assert_eq!(input.timeout, Some(3));
        assert!(input.params.is_some());
    }

    #[test]
    fn test_query_output_flattens_result() {
        let output = QueryOutput {
            result: CanonicalResult {
                columns: vec!["n".into()],
                rows: vec![vec![ScalarValue::Int(1)]],
                row_count: 1,
                truncated: false,
            },
            tier: RiskTier::Read,
            row_limit: Some(100),
            execution_time_ms: 2,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["rows"], serde_json::json!([[1]]));
        assert_eq!(json["row_count"], 1);
        assert_eq!(json["truncated"], false);
        assert!(json.get("result").is_none());
    }
}
