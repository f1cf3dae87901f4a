//! DB Steward MCP - Main entry point.

use clap::Parser;
use db_steward_mcp::config::{Config, TransportMode};
use db_steward_mcp::db::{ConnectionManager, DriverConnector};
use db_steward_mcp::mcp::DbService;
use db_steward_mcp::tools::ToolContext;
use db_steward_mcp::transport::{HttpTransport, StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(message) = config.validate() {
        eprintln!("Error: {}", message);
        std::process::exit(2);
    }

    let policy = config.policy();
    info!(
        transport = %config.transport,
        row_limit = policy.default_row_limit,
        enforce_row_limit = policy.enforce_row_limit,
        allow_writes = policy.allow_writes,
        statement_timeout_secs = policy.timeout_seconds(),
        "Starting DB Steward MCP v{}",
        env!("CARGO_PKG_VERSION")
    );

    let manager =
        ConnectionManager::with_connect_timeout(DriverConnector::default(), config.connect_timeout());
    let ctx = ToolContext::new(manager, policy).with_trusted_functions(config.trusted_functions());
    let service = DbService::new(Arc::new(ctx));

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(service).run().await,
        TransportMode::Http => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                service,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
