//! The asynchronous connection capability.
//!
//! [`Executor`] is what the runner, the schema facade and the ledger talk
//! to; both a [`Connection`] and an open [`Transaction`] implement it.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use quarry_core::{Dialect, Driver, Row, SqlValue};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::sqlite::SqliteConnection;

/// Runs statements.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Dialect of the underlying database.
    fn driver(&self) -> Driver;

    /// Dialect profile.
    fn dialect(&self) -> &'static dyn Dialect {
        self.driver().dialect()
    }

    /// Runs a query and returns every row.
    async fn query(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64>;

    /// First row of a query, if any.
    async fn fetch_one(&self, sql: &str, bindings: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, bindings).await?.into_iter().next())
    }

    /// First column of the first row, if any.
    async fn fetch_value(&self, sql: &str, bindings: &[SqlValue]) -> Result<Option<SqlValue>> {
        Ok(self
            .fetch_one(sql, bindings)
            .await?
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    /// Runs `statements` in order on one session, stopping at the first error.
    ///
    /// After a failure `recover` runs on that same session. Its own errors
    /// are logged; the original error is returned.
    async fn execute_script(&self, statements: &[String], recover: &[String]) -> Result<()> {
        for sql in statements {
            if let Err(error) = self.execute(sql, &[]).await {
                for sql in recover {
                    if let Err(e) = self.execute(sql, &[]).await {
                        warn!(sql = %sql, error = %e, "Recovery statement failed");
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }
}

/// A named, pooled database connection.
#[async_trait]
pub trait Connection: Executor {
    /// Configured connection name.
    fn name(&self) -> &str;

    /// This connection as a plain executor.
    fn as_executor(&self) -> &dyn Executor;

    /// Starts a transaction on a dedicated session.
    async fn begin(&self) -> Result<Transaction>;
}

/// Backend half of a transaction, implemented per adapter.
#[async_trait]
pub trait TransactionDriver: Send + Sync {
    /// Runs a query inside the transaction.
    async fn query(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>>;

    /// Runs a statement inside the transaction.
    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64>;

    /// Commits.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rolls back.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

type Hook = Box<dyn FnOnce() + Send>;

/// An open transaction.
///
/// Dropping it without [`Transaction::commit`] rolls back when the
/// adapter's session is returned to the pool; registered hooks then never run.
pub struct Transaction {
    driver: Driver,
    inner: Box<dyn TransactionDriver>,
    on_commit: Mutex<Vec<Hook>>,
    on_rollback: Mutex<Vec<Hook>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

impl Transaction {
    /// Wraps an adapter transaction.
    #[must_use]
    pub fn new(driver: Driver, inner: Box<dyn TransactionDriver>) -> Self {
        Self {
            driver,
            inner,
            on_commit: Mutex::new(Vec::new()),
            on_rollback: Mutex::new(Vec::new()),
        }
    }

    /// Runs `hook` after a successful commit.
    pub fn on_commit(&self, hook: impl FnOnce() + Send + 'static) {
        self.on_commit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Runs `hook` after a rollback.
    pub fn on_rollback(&self, hook: impl FnOnce() + Send + 'static) {
        self.on_rollback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Commits and runs the commit hooks.
    pub async fn commit(self) -> Result<()> {
        self.inner.commit().await?;
        let hooks = self
            .on_commit
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Rolls back and runs the rollback hooks.
    pub async fn rollback(self) -> Result<()> {
        self.inner.rollback().await?;
        let hooks = self
            .on_rollback
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        for hook in hooks {
            hook();
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for Transaction {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn query(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>> {
        self.inner.query(sql, bindings).await
    }

    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        self.inner.execute(sql, bindings).await
    }
}

/// Runs `work` inside a transaction, committing on success.
///
/// On error the transaction is rolled back. Lock contention errors are
/// retried up to `attempts` times in total; any other error is returned
/// immediately.
pub async fn transaction<T, F>(connection: &dyn Connection, attempts: u32, mut work: F) -> Result<T>
where
    T: Send,
    F: for<'t> FnMut(&'t Transaction) -> BoxFuture<'t, Result<T>> + Send,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let tx = connection.begin().await?;
        match work(&tx).await {
            Ok(value) => {
                tx.commit().await?;
                return Ok(value);
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(attempt, error = %rollback, "Rollback failed");
                    return Err(error);
                }
                if attempt >= attempts || !error.is_concurrency_error() {
                    return Err(error);
                }
                warn!(attempt, connection = connection.name(), "Retrying transaction after lock contention");
            }
        }
    }
}

/// Executor that records statements instead of running them.
///
/// Queries return no rows, so existence checks report `false`.
#[derive(Debug)]
pub struct PretendExecutor {
    driver: Driver,
    statements: Mutex<Vec<String>>,
}

impl PretendExecutor {
    /// Records statements compiled for `driver`.
    #[must_use]
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Statements recorded so far, leaving the log empty.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.statements.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Executor for PretendExecutor {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn query(&self, sql: &str, _bindings: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(sql = %sql, "Pretend query");
        Ok(Vec::new())
    }

    async fn execute(&self, sql: &str, _bindings: &[SqlValue]) -> Result<u64> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
        Ok(0)
    }
}

/// Named connections, opened on first use.
///
/// Adapters other than SQLite are supplied with [`Connections::insert`].
pub struct Connections {
    config: Config,
    open: AsyncMutex<IndexMap<String, Arc<dyn Connection>>>,
}

impl Connections {
    /// Registry over the connections in `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            open: AsyncMutex::new(IndexMap::new()),
        }
    }

    /// Configuration the registry was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers an already-open connection under `name`.
    pub async fn insert(&self, name: impl Into<String>, connection: Arc<dyn Connection>) {
        self.open.lock().await.insert(name.into(), connection);
    }

    /// Connection `name` (the default when `None`), opening it if needed.
    pub async fn get(&self, name: Option<&str>) -> Result<Arc<dyn Connection>> {
        let name = name.unwrap_or(&self.config.default);
        let mut open = self.open.lock().await;
        if let Some(connection) = open.get(name) {
            return Ok(Arc::clone(connection));
        }

        let (name, settings) = self.config.connection(Some(name))?;
        let connection: Arc<dyn Connection> = match settings.driver {
            Driver::Sqlite => Arc::new(
                SqliteConnection::connect(name, &settings.connection_url()?, settings.pool_size)
                    .await?,
            ),
            other => {
                return Err(MigrateError::Configuration(format!(
                    "no built-in adapter for the {other} driver; register one with Connections::insert"
                )))
            }
        };
        open.insert(name.to_string(), Arc::clone(&connection));
        Ok(connection)
    }
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections")
            .field("default", &self.config.default)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn memory() -> SqliteConnection {
        SqliteConnection::connect("default", "sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_fetch_helpers() {
        let conn = memory().await;
        let row = conn.fetch_one("SELECT 1 AS one, 'x' AS two", &[]).await.unwrap();
        assert_eq!(row.unwrap().get("two"), Some(&SqlValue::Text("x".into())));
        let value = conn.fetch_value("SELECT 42", &[]).await.unwrap();
        assert_eq!(value, Some(SqlValue::Int(42)));
    }

    #[tokio::test]
    async fn test_commit_runs_commit_hooks_only() {
        let conn = memory().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();

        let committed = Arc::new(AtomicBool::new(false));
        let rolled_back = Arc::new(AtomicBool::new(false));
        let tx = conn.begin().await.unwrap();
        tx.execute("INSERT INTO t (id) VALUES (?)", &[SqlValue::Int(1)])
            .await
            .unwrap();
        let flag = Arc::clone(&committed);
        tx.on_commit(move || flag.store(true, Ordering::SeqCst));
        let flag = Arc::clone(&rolled_back);
        tx.on_rollback(move || flag.store(true, Ordering::SeqCst));
        tx.commit().await.unwrap();

        assert!(committed.load(Ordering::SeqCst));
        assert!(!rolled_back.load(Ordering::SeqCst));
        let count = conn.fetch_value("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(count, Some(SqlValue::Int(1)));
    }

    #[tokio::test]
    async fn test_transaction_helper_rolls_back_on_error() {
        let conn = memory().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();

        let result: Result<()> = transaction(&conn, 3, |tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO t (id) VALUES (1)", &[]).await?;
                Err::<(), _>(MigrateError::Configuration("boom".into()))
            })
        })
        .await;
        assert!(result.is_err());
        let count = conn.fetch_value("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(count, Some(SqlValue::Int(0)));

        let inserted = transaction(&conn, 1, |tx| {
            Box::pin(async move { tx.execute("INSERT INTO t (id) VALUES (2)", &[]).await })
        })
        .await
        .unwrap();
        assert_eq!(inserted, 1);
    }

    struct LostTransaction;

    #[async_trait]
    impl TransactionDriver for LostTransaction {
        async fn query(&self, _sql: &str, _bindings: &[SqlValue]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _bindings: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Err(MigrateError::Configuration("connection lost".into()))
        }
    }

    struct LostConnection;

    #[async_trait]
    impl Executor for LostConnection {
        fn driver(&self) -> Driver {
            Driver::Sqlite
        }

        async fn query(&self, _sql: &str, _bindings: &[SqlValue]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn execute(&self, _sql: &str, _bindings: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }
    }

    #[async_trait]
    impl Connection for LostConnection {
        fn name(&self) -> &str {
            "lost"
        }

        fn as_executor(&self) -> &dyn Executor {
            self
        }

        async fn begin(&self) -> Result<Transaction> {
            Ok(Transaction::new(Driver::Sqlite, Box::new(LostTransaction)))
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_the_work_error() {
        let result: Result<()> = transaction(&LostConnection, 3, |_| {
            Box::pin(async { Err::<(), _>(MigrateError::Configuration("boom".into())) })
        })
        .await;
        match result {
            Err(MigrateError::Configuration(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_script_runs_recovery_on_failure() {
        let conn = memory().await;
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).await.unwrap();
        let statements = [
            "INSERT INTO t (id) VALUES (1)".to_string(),
            "INSERT INTO missing (id) VALUES (2)".to_string(),
            "INSERT INTO t (id) VALUES (3)".to_string(),
        ];
        let recover = ["DELETE FROM t".to_string()];

        let err = conn.execute_script(&statements, &recover).await.unwrap_err();
        assert!(matches!(err, MigrateError::Connection { ref sql, .. } if sql.contains("missing")));
        let count = conn.fetch_value("SELECT COUNT(*) FROM t", &[]).await.unwrap();
        assert_eq!(count, Some(SqlValue::Int(0)));
    }

    #[tokio::test]
    async fn test_pretend_records_statements() {
        let pretend = PretendExecutor::new(Driver::Postgres);
        pretend.execute("DROP TABLE \"x\"", &[]).await.unwrap();
        assert!(pretend.query("SELECT 1", &[]).await.unwrap().is_empty());
        assert_eq!(pretend.take(), vec!["DROP TABLE \"x\"".to_string()]);
        assert!(pretend.take().is_empty());
    }

    #[tokio::test]
    async fn test_registry_opens_sqlite_and_rejects_others() {
        let mut config = Config::single(ConnectionConfig::from_url(Driver::Sqlite, "sqlite::memory:"));
        config
            .connections
            .insert("pg".into(), ConnectionConfig::from_url(Driver::Postgres, "postgres://x/y"));
        let connections = Connections::new(config);

        let a = connections.get(None).await.unwrap();
        let b = connections.get(Some("default")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(
            connections.get(Some("pg")).await,
            Err(MigrateError::Configuration(_))
        ));
    }
}
