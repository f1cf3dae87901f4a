//! Configuration handling for the DB Steward MCP server.
//!
//! All settings come from CLI arguments with environment fallbacks and are
//! fixed for the life of the process. Connection targets are not configured
//! here; every tool call carries its own.

use crate::db::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::models::{
    DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_QUERY_TIMEOUT_SECS, MAX_ROW_LIMIT,
};
use crate::safety::PolicyConfig;
use clap::{Parser, ValueEnum};
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    #[value(alias = "streamable-http")]
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// DB Steward MCP server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "db-steward-mcp", version, about)]
pub struct Config {
    /// Transport mode (stdio or http)
    #[arg(short, long, value_enum, default_value = "stdio", env = "MCP_TRANSPORT")]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "MCP_HTTP_PORT")]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(long, default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Row limit applied to READ statements (max 10000)
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT, env = "MCP_ROW_LIMIT")]
    pub row_limit: u32,

    /// Do not rewrite READ statements with a row limit
    #[arg(long, env = "MCP_DISABLE_ROW_LIMIT")]
    pub disable_row_limit: bool,

    /// Statement timeout in seconds (max 300)
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS, env = "MCP_STATEMENT_TIMEOUT")]
    pub statement_timeout: u32,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "MCP_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Allow WRITE statements (INSERT, UPDATE, DELETE, MERGE)
    #[arg(long, env = "MCP_ALLOW_WRITES")]
    pub allow_writes: bool,

    /// Functions to treat as read-only in SELECT statements.
    /// Can be specified multiple times or as comma-separated values.
    #[arg(
        long = "trusted-function",
        value_name = "NAME",
        env = "MCP_TRUSTED_FUNCTIONS",
        value_delimiter = ','
    )]
    pub trusted_functions: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            row_limit: DEFAULT_ROW_LIMIT,
            disable_row_limit: false,
            statement_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            allow_writes: false,
            trusted_functions: Vec::new(),
            log_level: "info".to_string(),
            json_logs: false,
            enable_logs: false,
        }
    }

    /// Reject out-of-range values before the server starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.row_limit == 0 || self.row_limit > MAX_ROW_LIMIT {
            return Err(format!(
                "row limit must be between 1 and {}, got {}",
                MAX_ROW_LIMIT, self.row_limit
            ));
        }
        if self.statement_timeout == 0 || self.statement_timeout > MAX_QUERY_TIMEOUT_SECS {
            return Err(format!(
                "statement timeout must be between 1 and {} seconds, got {}",
                MAX_QUERY_TIMEOUT_SECS, self.statement_timeout
            ));
        }
        if self.connect_timeout == 0 {
            return Err("connect timeout must be at least 1 second".to_string());
        }
        if !self.mcp_endpoint.starts_with('/') {
            return Err(format!(
                "MCP endpoint must start with '/', got '{}'",
                self.mcp_endpoint
            ));
        }
        if let Some(bad) = self
            .trusted_functions
            .iter()
            .find(|f| f.trim().is_empty() || f.trim().contains(char::is_whitespace))
        {
            return Err(format!("invalid trusted function name '{}'", bad));
        }
        Ok(())
    }

    /// The policy the tools enforce.
    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            default_row_limit: self.row_limit,
            enforce_row_limit: !self.disable_row_limit,
            statement_timeout_secs: Some(self.statement_timeout),
            allow_writes: self.allow_writes,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Trusted function names, trimmed.
    pub fn trusted_functions(&self) -> impl Iterator<Item = &str> {
        self.trusted_functions.iter().map(|f| f.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        let policy = config.policy();
        assert_eq!(policy, PolicyConfig {
            statement_timeout_secs: Some(30),
            ..PolicyConfig::default()
        });
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_cli_flags() {
        let config = Config::try_parse_from([
            "db-steward-mcp",
            "--transport",
            "streamable-http",
            "--row-limit",
            "250",
            "--disable-row-limit",
            "--allow-writes",
            "--trusted-function",
            "app.safe_fn, app.other_fn",
        ])
        .unwrap();
        assert_eq!(config.transport, TransportMode::Http);
        let policy = config.policy();
        assert_eq!(policy.default_row_limit, 250);
        assert!(!policy.enforce_row_limit);
        assert!(policy.allow_writes);
        assert_eq!(
            config.trusted_functions().collect::<Vec<_>>(),
            vec!["app.safe_fn", "app.other_fn"]
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default_config();
        config.row_limit = MAX_ROW_LIMIT + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.statement_timeout = 301;
        assert!(config.validate().unwrap_err().contains("statement timeout"));

        let mut config = Config::default_config();
        config.connect_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.mcp_endpoint = "mcp".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(TransportMode::Stdio.to_string(), "stdio");
        assert_eq!(TransportMode::Http.to_string(), "http");
    }
}
