//! On-demand connection lifecycle.
//!
//! Every tool call opens exactly one connection, runs its work and closes it.
//! There is no pool: credentials arrive with the request and are used for a
//! single connection lifetime.
//!
//! The [`Connector`] and [`Connection`] traits are the seam between the
//! manager and the drivers. Production code uses
//! [`DriverConnector`](crate::db::DriverConnector); tests plug in mocks.

use crate::db::dialect::Dialect;
use crate::error::{DbError, DbResult, NativeError};
use crate::models::{BoundStatement, DbConfig, FetchedRows};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Default connect timeout when neither the server nor the request set one.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Per-connection settings applied at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub connect_timeout: Duration,
    /// Server-side statement timeout where the engine supports one.
    pub statement_timeout: Duration,
}

/// Opens connections for a [`DbConfig`].
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn connect(
        &self,
        config: &DbConfig,
        session: &SessionSettings,
    ) -> impl Future<Output = Result<Self::Connection, NativeError>> + Send;
}

/// One open database connection.
pub trait Connection: Send {
    /// Run `stmt` and collect at most `max_rows` rows.
    fn fetch(
        &mut self,
        stmt: &BoundStatement,
        max_rows: usize,
    ) -> impl Future<Output = Result<FetchedRows, NativeError>> + Send;

    /// Run an `EXPLAIN` statement and discard its output.
    fn check_syntax(
        &mut self,
        stmt: &BoundStatement,
    ) -> impl Future<Output = Result<(), NativeError>> + Send;

    /// Graceful close.
    fn close(self) -> impl Future<Output = Result<(), NativeError>> + Send;

    /// Tear the connection down without waiting for in-flight work.
    fn abort(self) -> impl Future<Output = ()> + Send;
}

/// Convert a driver error into a redacted [`DbError`].
pub fn map_native(dialect: &Dialect, config: &DbConfig, err: &NativeError) -> DbError {
    DbError::from(dialect.map_error(err).redact(&config.password))
}

/// Runs work on a freshly opened connection and always releases it.
#[derive(Debug)]
pub struct ConnectionManager<C: Connector> {
    connector: C,
    connect_timeout: Duration,
    opened: AtomicU64,
    closed: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self::with_connect_timeout(connector, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
    }

    /// `connect_timeout` is the server ceiling; requests may only lower it.
    pub fn with_connect_timeout(connector: C, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            opened: AtomicU64::new(0),
            closed: AtomicU64::new(0),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connections opened since start.
    pub fn connections_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections released (closed or aborted) since start.
    pub fn connections_closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    fn session(&self, config: &DbConfig, statement_timeout: Duration) -> SessionSettings {
        let connect_timeout = config
            .connect_timeout
            .map_or(self.connect_timeout, |t| t.min(self.connect_timeout));
        SessionSettings {
            connect_timeout,
            statement_timeout,
        }
    }

    /// Open a connection, run `work` under `statement_timeout` and release it.
    ///
    /// Connect failures are returned immediately and never retried. If `work`
    /// fails the connection is still closed; if it times out the connection
    /// is aborted and a `timeout` error is returned.
    pub async fn with_connection<T, F>(
        &self,
        config: &DbConfig,
        dialect: &Dialect,
        statement_timeout: Duration,
        work: F,
    ) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, Result<T, NativeError>>,
    {
        // Correlates the open, work and release log lines of one call.
        let span = info_span!("connection", id = %Uuid::new_v4(), engine = %config.db_type);
        self.run(config, dialect, statement_timeout, work)
            .instrument(span)
            .await
    }

    async fn run<T, F>(
        &self,
        config: &DbConfig,
        dialect: &Dialect,
        statement_timeout: Duration,
        work: F,
    ) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut C::Connection) -> BoxFuture<'c, Result<T, NativeError>>,
    {
        let session = self.session(config, statement_timeout);
        let started = Instant::now();

        info!(
            engine = %config.db_type,
            target = %config.masked_target(),
            "Opening connection"
        );

        let mut conn = match timeout(
            session.connect_timeout,
            self.connector.connect(config, &session),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(err)) => {
                let err = map_native(dialect, config, &err);
                warn!(engine = %config.db_type, error = %err, "Connection failed");
                return Err(err);
            }
            Err(_) => {
                warn!(
                    engine = %config.db_type,
                    timeout_secs = session.connect_timeout.as_secs(),
                    "Connection attempt timed out"
                );
                return Err(DbError::connection(format!(
                    "could not connect to {} within {}s",
                    config.masked_target(),
                    session.connect_timeout.as_secs()
                )));
            }
        };
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Connection opened");

        let outcome = timeout(statement_timeout, work(&mut conn)).await;

        let result = match outcome {
            Ok(result) => {
                if let Err(err) = conn.close().await {
                    warn!(error = %config.redact(&err.message), "Failed to close connection cleanly");
                }
                result.map_err(|err| map_native(dialect, config, &err))
            }
            Err(_) => {
                warn!(
                    engine = %config.db_type,
                    timeout_secs = statement_timeout.as_secs(),
                    "Statement timed out, aborting connection"
                );
                conn.abort().await;
                Err(DbError::timeout("statement", statement_timeout.as_secs()))
            }
        };
        self.closed.fetch_add(1, Ordering::SeqCst);
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Connection released"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, NativeErrorCategory};
    use crate::models::{DatabaseType, ScalarValue};
    use futures_util::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct Flags {
        closed: AtomicBool,
        aborted: AtomicBool,
    }

    struct MockConnector {
        flags: Arc<Flags>,
        fail_connect: Option<NativeError>,
        delay: Duration,
    }

    struct MockConnection {
        flags: Arc<Flags>,
        delay: Duration,
    }

    impl Connector for MockConnector {
        type Connection = MockConnection;

        async fn connect(
            &self,
            _config: &DbConfig,
            _session: &SessionSettings,
        ) -> Result<MockConnection, NativeError> {
            if let Some(err) = &self.fail_connect {
                return Err(err.clone());
            }
            Ok(MockConnection {
                flags: self.flags.clone(),
                delay: self.delay,
            })
        }
    }

    impl Connection for MockConnection {
        async fn fetch(
            &mut self,
            _stmt: &BoundStatement,
            _max_rows: usize,
        ) -> Result<FetchedRows, NativeError> {
            tokio::time::sleep(self.delay).await;
            Ok(FetchedRows {
                columns: vec!["?column?".into()],
                rows: vec![vec![ScalarValue::Int(1)]],
            })
        }

        async fn check_syntax(&mut self, _stmt: &BoundStatement) -> Result<(), NativeError> {
            Ok(())
        }

        async fn close(self) -> Result<(), NativeError> {
            self.flags.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn abort(self) {
            self.flags.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn manager(delay: Duration, fail_connect: Option<NativeError>) -> (ConnectionManager<MockConnector>, Arc<Flags>) {
        let flags = Arc::new(Flags::default());
        let connector = MockConnector {
            flags: flags.clone(),
            fail_connect,
            delay,
        };
        (ConnectionManager::new(connector), flags)
    }

    fn config() -> DbConfig {
        DbConfig::new(DatabaseType::PostgreSQL, "localhost", "app", "reader", "pw-secret")
    }

    fn dialect() -> Dialect {
        Dialect::for_engine(DatabaseType::PostgreSQL, None)
    }

    #[tokio::test]
    async fn test_success_closes_connection() {
        let (mgr, flags) = manager(Duration::ZERO, None);
        let rows = mgr
            .with_connection(&config(), &dialect(), Duration::from_secs(5), |conn| {
                async move { conn.fetch(&BoundStatement::plain("SELECT 1"), 2).await }.boxed()
            })
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![ScalarValue::Int(1)]]);
        assert!(flags.closed.load(Ordering::SeqCst));
        assert_eq!(mgr.connections_opened(), 1);
        assert_eq!(mgr.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_failing_work_still_closes() {
        let (mgr, flags) = manager(Duration::ZERO, None);
        let err = mgr
            .with_connection(&config(), &dialect(), Duration::from_secs(5), |_conn| {
                async move {
                    Err::<(), _>(NativeError::database(Some("42P01".into()), None, "no such table"))
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(flags.closed.load(Ordering::SeqCst));
        assert_eq!(mgr.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_timeout_aborts_connection() {
        let (mgr, flags) = manager(Duration::from_secs(60), None);
        let err = mgr
            .with_connection(&config(), &dialect(), Duration::from_millis(20), |conn| {
                async move { conn.fetch(&BoundStatement::plain("SELECT pg_sleep(60)"), 1).await }
                    .boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(flags.aborted.load(Ordering::SeqCst));
        assert!(!flags.closed.load(Ordering::SeqCst));
        assert_eq!(mgr.connections_closed(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_is_redacted_and_not_counted() {
        let refused = NativeError::new(
            NativeErrorCategory::Io,
            "connection refused for password pw-secret",
        );
        let (mgr, _flags) = manager(Duration::ZERO, Some(refused));
        let err = mgr
            .with_connection(&config(), &dialect(), Duration::from_secs(5), |conn| {
                async move { conn.fetch(&BoundStatement::plain("SELECT 1"), 1).await }.boxed()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(!err.to_string().contains("pw-secret"));
        assert_eq!(mgr.connections_opened(), 0);
    }

    #[test]
    fn test_request_connect_timeout_only_lowers() {
        let (mgr, _flags) = manager(Duration::ZERO, None);
        let mut cfg = config();
        cfg.connect_timeout = Some(Duration::from_secs(120));
        let session = mgr.session(&cfg, Duration::from_secs(30));
        assert_eq!(session.connect_timeout, Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS));
        cfg.connect_timeout = Some(Duration::from_secs(2));
        assert_eq!(mgr.session(&cfg, Duration::from_secs(30)).connect_timeout, Duration::from_secs(2));
    }
}
