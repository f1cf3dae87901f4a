//! Policy decisions over risk tiers.
//!
//! [`decide`] is a pure, total function of the tier and the operator's
//! [`PolicyConfig`]. ADMIN and UNRECOGNIZED statements are denied for every
//! configuration.

use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS};
use crate::safety::RiskTier;
use schemars::JsonSchema;
use serde::Serialize;

/// Operator-controlled policy knobs, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    pub default_row_limit: u32,
    /// When false, READ statements are allowed without a row limit.
    pub enforce_row_limit: bool,
    /// Statement timeout; `None` means the 30 s default. Capped at 300 s.
    pub statement_timeout_secs: Option<u32>,
    pub allow_writes: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_row_limit: DEFAULT_ROW_LIMIT,
            enforce_row_limit: true,
            statement_timeout_secs: None,
            allow_writes: false,
        }
    }
}

impl PolicyConfig {
    /// Effective statement timeout in seconds.
    pub fn timeout_seconds(&self) -> u32 {
        self.statement_timeout_secs
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS)
            .clamp(1, MAX_QUERY_TIMEOUT_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    Deny,
    AllowWithLimit,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct PolicyDecision {
    pub outcome: PolicyOutcome,
    pub tier: RiskTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,
    pub reason: String,
    /// Configuration change that would permit a denied statement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remedy: Option<String>,
}

impl PolicyDecision {
    fn deny(tier: RiskTier, reason: impl Into<String>, remedy: Option<&str>) -> Self {
        Self {
            outcome: PolicyOutcome::Deny,
            tier,
            row_limit: None,
            timeout_seconds: None,
            reason: reason.into(),
            remedy: remedy.map(str::to_string),
        }
    }

    fn allow(tier: RiskTier, config: &PolicyConfig, reason: impl Into<String>) -> Self {
        let (outcome, row_limit) = if config.enforce_row_limit {
            (PolicyOutcome::AllowWithLimit, Some(config.default_row_limit))
        } else {
            (PolicyOutcome::Allow, None)
        };
        Self {
            outcome,
            tier,
            row_limit,
            timeout_seconds: Some(config.timeout_seconds()),
            reason: reason.into(),
            remedy: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome != PolicyOutcome::Deny
    }

    /// Turn a denial into [`DbError::PolicyDenied`].
    pub fn into_result(self) -> DbResult<Self> {
        match self.outcome {
            PolicyOutcome::Deny => Err(DbError::policy_denied(self.tier, self.reason, self.remedy)),
            _ => Ok(self),
        }
    }
}

/// Decide what to do with a statement of the given tier.
pub fn decide(tier: RiskTier, config: &PolicyConfig) -> PolicyDecision {
    match tier {
        RiskTier::Read => PolicyDecision::allow(tier, config, "READ statement"),
        RiskTier::Write if config.allow_writes => PolicyDecision::allow(
            tier,
            config,
            "WRITE statement allowed by operator configuration",
        ),
        RiskTier::Write => PolicyDecision::deny(
            tier,
            "WRITE statements are disabled",
            Some("restart the server with --allow-writes (MCP_ALLOW_WRITES=true)"),
        ),
        RiskTier::ReadWithSideEffects => PolicyDecision::deny(
            tier,
            "READ_WITH_SIDE_EFFECTS statement: nested data modification, locking clause or untrusted routine",
            Some(
                "if the flagged routine is read-only, add it with --trusted-function (MCP_TRUSTED_FUNCTIONS)",
            ),
        ),
        RiskTier::SchemaChange => {
            PolicyDecision::deny(tier, "SCHEMA_CHANGE statements are never executed", None)
        }
        RiskTier::Admin => {
            PolicyDecision::deny(tier, "ADMIN statements are never executed", None)
        }
        RiskTier::Unrecognized => PolicyDecision::deny(
            tier,
            "UNRECOGNIZED statement: multi-statement batch, unknown command or malformed SQL",
            None,
        ),
    }
}
