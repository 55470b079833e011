//! SQLite adapter over an `sqlx` pool.

use std::str::FromStr;

use async_trait::async_trait;
use quarry_core::{Driver, Row, SqlValue};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::connection::{Connection, Executor, Transaction, TransactionDriver};
use crate::error::{MigrateError, Result};

/// A named SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    name: String,
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Opens a pool for `url`, creating the database file if needed.
    ///
    /// In-memory databases are private to one session, so their pool is
    /// capped at a single connection that is never recycled.
    pub async fn connect(name: impl Into<String>, url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(pool_size.max(1))
                .connect_with(options)
                .await?
        };
        Ok(Self::from_pool(name, pool))
    }

    /// Wraps an existing pool.
    pub fn from_pool(name: impl Into<String>, pool: SqlitePool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_all<'q>(sql: &'q str, bindings: &[SqlValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for value in bindings {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Int(n) => query.bind(*n),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Blob(b) => query.bind(b.clone()),
        };
    }
    query
}

/// Decodes a row by the storage class of each value.
///
/// SQLite has no boolean storage class, so booleans read back as integers.
fn decode_row(row: &SqliteRow) -> std::result::Result<Row, sqlx::Error> {
    let mut out = Row::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" => SqlValue::Int(row.try_get::<i64, _>(i)?),
                "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => SqlValue::Float(row.try_get::<f64, _>(i)?),
                "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(i)?),
                _ => match row.try_get::<String, _>(i) {
                    Ok(text) => SqlValue::Text(text),
                    Err(_) => SqlValue::Int(row.try_get::<i64, _>(i)?),
                },
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn connection_error(sql: &str, bindings: usize) -> impl FnOnce(sqlx::Error) -> MigrateError + '_ {
    move |e| MigrateError::Connection {
        message: e.to_string(),
        sql: sql.to_string(),
        bindings,
    }
}

#[async_trait]
impl Executor for SqliteConnection {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    async fn query(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(connection = %self.name, sql = %sql, bindings = bindings.len(), "Query");
        let rows = bind_all(sql, bindings)
            .fetch_all(&self.pool)
            .await
            .map_err(connection_error(sql, bindings.len()))?;
        rows.iter()
            .map(decode_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(connection_error(sql, bindings.len()))
    }

    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        debug!(connection = %self.name, sql = %sql, bindings = bindings.len(), "Execute");
        let done = bind_all(sql, bindings)
            .execute(&self.pool)
            .await
            .map_err(connection_error(sql, bindings.len()))?;
        Ok(done.rows_affected())
    }

    async fn execute_script(&self, statements: &[String], recover: &[String]) -> Result<()> {
        // Pragmas and savepoints are per connection, so hold one for the script
        let mut conn = self.pool.acquire().await?;
        for sql in statements {
            debug!(connection = %self.name, sql = %sql, "Execute script statement");
            if let Err(e) = sqlx::query(sql).execute(&mut *conn).await {
                let error = connection_error(sql, 0)(e);
                for sql in recover {
                    if let Err(e) = sqlx::query(sql).execute(&mut *conn).await {
                        warn!(connection = %self.name, sql = %sql, error = %e, "Recovery statement failed");
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_executor(&self) -> &dyn Executor {
        self
    }

    async fn begin(&self) -> Result<Transaction> {
        let tx = self.pool.begin().await?;
        debug!(connection = %self.name, "Transaction started");
        Ok(Transaction::new(
            Driver::Sqlite,
            Box::new(SqliteTransaction { tx: Mutex::new(tx) }),
        ))
    }
}

struct SqliteTransaction {
    tx: Mutex<sqlx::Transaction<'static, Sqlite>>,
}

#[async_trait]
impl TransactionDriver for SqliteTransaction {
    async fn query(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>> {
        debug!(sql = %sql, bindings = bindings.len(), "Query in transaction");
        let mut tx = self.tx.lock().await;
        let rows = bind_all(sql, bindings)
            .fetch_all(&mut **tx)
            .await
            .map_err(connection_error(sql, bindings.len()))?;
        rows.iter()
            .map(decode_row)
            .collect::<std::result::Result<_, _>>()
            .map_err(connection_error(sql, bindings.len()))
    }

    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        debug!(sql = %sql, bindings = bindings.len(), "Execute in transaction");
        let mut tx = self.tx.lock().await;
        let done = bind_all(sql, bindings)
            .execute(&mut **tx)
            .await
            .map_err(connection_error(sql, bindings.len()))?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.into_inner().rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }
}
