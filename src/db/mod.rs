//! Database access layer.
//!
//! - Engine dialects (placeholders, row limits, catalog queries, error mapping)
//! - The on-demand connection manager and its connector seam
//! - The `sqlx`/`oracle` drivers and row decoding

pub mod connection;
pub mod dialect;
pub mod driver;
#[cfg(feature = "oracle")]
pub mod oracle;
mod params;
pub mod types;

pub use connection::{
    Connection, ConnectionManager, Connector, DEFAULT_CONNECT_TIMEOUT_SECS, SessionSettings,
    map_native,
};
pub use dialect::{Dialect, MySqlDialect, OracleDialect, PostgresDialect};
pub use driver::{DriverConnection, DriverConnector};
