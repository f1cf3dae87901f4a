//! DB Steward MCP Library
//!
//! MCP (Model Context Protocol) tools that give AI agents risk-classified,
//! policy-gated access to PostgreSQL, MySQL and Oracle databases.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod safety;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
