//! The `db_validate` tool: classify and decide without executing.

use crate::db::{Connection, Connector, Dialect};
use crate::error::{CanonicalError, DbResult, ErrorKind};
use crate::safety::{Classification, PolicyDecision, decide};
use crate::tools::connection::{ConnectionInput, require_config};
use crate::tools::{ToolContext, parse_params, require};
use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Input for the validate tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateInput {
    /// Target database connection settings
    #[serde(default)]
    pub config: Option<ConnectionInput>,
    /// SQL statement to classify. Use %(name)s placeholders for parameters.
    #[serde(default)]
    pub sql: Option<String>,
    /// Named parameter values (scalars only)
    #[serde(default)]
    pub params: Option<Map<String, JsonValue>>,
    /// If true and the statement is allowed, EXPLAIN it on the database to check syntax. Never executes the statement.
    #[serde(default)]
    pub check_syntax: bool,
}

/// Result of an `EXPLAIN`-based syntax check.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SyntaxCheck {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CanonicalError>,
}

/// Output from the validate tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValidateOutput {
    pub classification: Classification,
    pub decision: PolicyDecision,
    /// Present only when a syntax check was requested and performed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syntax: Option<SyntaxCheck>,
}

/// Handler for `db_validate`.
pub struct ValidateToolHandler<C: Connector> {
    ctx: Arc<ToolContext<C>>,
}

impl<C: Connector> ValidateToolHandler<C> {
    pub fn new(ctx: Arc<ToolContext<C>>) -> Self {
        Self { ctx }
    }

    /// Classify `sql` and apply the policy. No connection is opened unless
    /// `check_syntax` is set and the statement is allowed.
    pub async fn validate(&self, input: ValidateInput) -> DbResult<ValidateOutput> {
        let config = require_config(&input.config)?;
        let sql = require(&input.sql, "sql")?;
        let params = parse_params(input.params.as_ref())?;

        let classification = self.ctx.classifier(config.db_type).classify(sql);
        let decision = decide(classification.tier, self.ctx.policy());
        info!(
            engine = %config.db_type,
            tier = %classification.tier,
            outcome = ?decision.outcome,
            "Statement validated"
        );

        let syntax = if input.check_syntax && decision.is_allowed() {
            let dialect = Dialect::for_config(&config);
            let bound = dialect.rewrite_params(sql, &params)?;
            let explain = bound.with_sql(dialect.explain_sql(&bound.sql));
            debug!(sql = %explain.sql, "Checking syntax");

            let timeout = Duration::from_secs(u64::from(
                decision
                    .timeout_seconds
                    .unwrap_or_else(|| self.ctx.policy().timeout_seconds()),
            ));
            let outcome = self
                .ctx
                .manager()
                .with_connection(&config, &dialect, timeout, move |conn| {
                    async move { conn.check_syntax(&explain).await }.boxed()
                })
                .await;
            Some(match outcome {
                Ok(()) => SyntaxCheck {
                    valid: true,
                    error: None,
                },
                // Failing to reach the database says nothing about the SQL.
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionFailed
                            | ErrorKind::AuthFailed
                            | ErrorKind::Timeout
                            | ErrorKind::BadRequest
                    ) =>
                {
                    return Err(err);
                }
                Err(err) => SyntaxCheck {
                    valid: false,
                    error: Some(err.to_canonical()),
                },
            })
        } else {
            None
        };

        Ok(ValidateOutput {
            classification,
            decision,
            syntax,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_input_defaults() {
        let input: ValidateInput =
            serde_json::from_str(r#"{"sql": "SELECT 1", "config": {"engine": "mysql"}}"#).unwrap();
        assert!(!input.check_syntax);
        assert!(input.params.is_none());
        assert_eq!(input.sql.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_syntax_check_serialization() {
        let ok = serde_json::to_value(SyntaxCheck {
            valid: true,
            error: None,
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({"valid": true}));
    }
}
