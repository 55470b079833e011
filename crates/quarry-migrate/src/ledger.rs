//! Migration ledger.
//!
//! One table per connection records which units have been applied, in
//! which batch and when. Every statement goes through the query builder so
//! the ledger works on any dialect.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use quarry_core::{row, Blueprint, QueryBuilder, Row, SqlValue};
use tracing::debug;

use crate::connection::Executor;
use crate::error::{MigrateError, Result};
use crate::runner::QueryRunner;
use crate::schema::Schema;

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Unit identifier.
    pub identifier: String,
    /// Batch the unit was applied in.
    pub batch: i64,
    /// When the unit was applied, if the stored value parses.
    pub applied_at: Option<DateTime<FixedOffset>>,
}

impl AppliedMigration {
    fn from_row(row: &Row) -> Result<Self> {
        let identifier = match row.get("identifier") {
            Some(SqlValue::Text(id)) => id.clone(),
            other => return Err(malformed("identifier", other)),
        };
        let batch = match row.get("batch") {
            Some(SqlValue::Int(n)) => *n,
            Some(SqlValue::Text(n)) => n.parse().map_err(|_| malformed("batch", row.get("batch")))?,
            other => return Err(malformed("batch", other)),
        };
        let applied_at = match row.get("applied_at") {
            Some(SqlValue::Text(text)) => parse_timestamp(text),
            _ => None,
        };
        Ok(Self {
            identifier,
            batch,
            applied_at,
        })
    }
}

fn malformed(column: &str, value: Option<&SqlValue>) -> MigrateError {
    let kind = value.map_or("missing", SqlValue::type_name);
    MigrateError::Configuration(format!("ledger column '{column}' holds a {kind} value"))
}

fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|dt| dt.and_utc().fixed_offset())
    })
}

/// The ledger table on one executor.
#[derive(Clone)]
pub struct Ledger<'e> {
    executor: &'e dyn Executor,
    table: String,
    offset: FixedOffset,
}

impl std::fmt::Debug for Ledger<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("table", &self.table)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<'e> Ledger<'e> {
    /// Ledger stored in `table`, stamping rows in `offset`.
    ///
    /// The table prefix of the connection is not applied to the ledger.
    #[must_use]
    pub fn new(executor: &'e dyn Executor, table: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            executor,
            table: table.into(),
            offset,
        }
    }

    /// Ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn runner(&self) -> QueryRunner<'e> {
        QueryRunner::new(self.executor)
    }

    fn query(&self) -> QueryBuilder {
        QueryBuilder::table(&self.table)
    }

    /// Whether the ledger table exists.
    pub async fn exists(&self) -> Result<bool> {
        Schema::new(self.executor).has_table(&self.table).await
    }

    /// Creates the ledger table when it is missing.
    pub async fn ensure_table(&self) -> Result<()> {
        if self.exists().await? {
            return Ok(());
        }
        debug!(table = %self.table, "Creating migration ledger");
        Schema::new(self.executor)
            .blueprint(&self.blueprint())
            .await
    }

    /// Ledger table layout.
    ///
    /// `applied_at` is written as RFC 3339 text carrying the configured
    /// offset, which SQLite keeps in its text storage class.
    fn blueprint(&self) -> Blueprint {
        let mut t = Blueprint::create(&self.table);
        t.increments("id");
        t.string("identifier", 255).unique();
        t.integer("batch");
        t.timestamp_tz("applied_at");
        t
    }

    async fn fetch(&self, query: QueryBuilder) -> Result<Vec<AppliedMigration>> {
        self.runner()
            .get(&query.select(&["identifier", "batch", "applied_at"]))
            .await?
            .iter()
            .map(AppliedMigration::from_row)
            .collect()
    }

    /// Every ledger row, oldest batch first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.fetch(self.query().order_by("batch").order_by("identifier"))
            .await
    }

    /// Applied identifiers, oldest batch first.
    pub async fn applied_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .applied()
            .await?
            .into_iter()
            .map(|m| m.identifier)
            .collect())
    }

    /// Highest batch number, 0 for an empty ledger.
    pub async fn last_batch_number(&self) -> Result<i64> {
        let value = self.runner().max(&self.query(), "batch").await?;
        Ok(match value {
            Some(SqlValue::Int(n)) => n,
            Some(SqlValue::Text(n)) => n.parse().unwrap_or(0),
            _ => 0,
        })
    }

    /// Batch number for the next run.
    pub async fn next_batch_number(&self) -> Result<i64> {
        Ok(self.last_batch_number().await? + 1)
    }

    /// Rows of the most recent batch.
    pub async fn last_batch(&self) -> Result<Vec<AppliedMigration>> {
        let batch = self.last_batch_number().await?;
        if batch == 0 {
            return Ok(Vec::new());
        }
        self.fetch(self.query().where_("batch", batch).order_by("identifier"))
            .await
    }

    /// The `steps` most recently applied rows, newest first.
    pub async fn last_steps(&self, steps: u64) -> Result<Vec<AppliedMigration>> {
        self.fetch(
            self.query()
                .order_by_desc("batch")
                .order_by_desc("identifier")
                .limit(steps),
        )
        .await
    }

    /// Records `identifier` as applied in `batch`.
    pub async fn record(&self, identifier: &str, batch: i64) -> Result<()> {
        self.record_on(self.executor, identifier, batch).await
    }

    /// Records through `executor`, e.g. a unit's open transaction.
    pub async fn record_on(
        &self,
        executor: &dyn Executor,
        identifier: &str,
        batch: i64,
    ) -> Result<()> {
        let applied_at = Utc::now().with_timezone(&self.offset).to_rfc3339();
        let values = row([
            ("identifier", SqlValue::Text(identifier.to_string())),
            ("batch", SqlValue::Int(batch)),
            ("applied_at", SqlValue::Text(applied_at)),
        ]);
        QueryRunner::new(executor)
            .insert(&self.query(), &[values])
            .await?;
        debug!(identifier = %identifier, batch = batch, "Recorded migration");
        Ok(())
    }

    /// Deletes the row for `identifier`.
    pub async fn remove(&self, identifier: &str) -> Result<()> {
        self.remove_on(self.executor, identifier).await
    }

    /// Deletes through `executor`, e.g. a unit's open transaction.
    pub async fn remove_on(&self, executor: &dyn Executor, identifier: &str) -> Result<()> {
        QueryRunner::new(executor)
            .delete(&self.query().where_("identifier", identifier))
            .await?;
        debug!(identifier = %identifier, "Removed migration from ledger");
        Ok(())
    }
}
