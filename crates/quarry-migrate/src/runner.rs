//! Executes compiled queries and shapes their results.

use quarry_core::query::Aggregate;
use quarry_core::{
    CursorPage, CursorPaginator, OffsetPage, OffsetPaginator, QueryBuilder, Row, SqlValue,
};

use crate::connection::Executor;
use crate::error::Result;

/// Runs [`QueryBuilder`]s against one executor.
///
/// ```rust,no_run
/// # async fn demo(conn: &dyn quarry_migrate::connection::Executor) -> quarry_migrate::Result<()> {
/// use quarry_core::QueryBuilder;
/// use quarry_migrate::runner::QueryRunner;
///
/// let runner = QueryRunner::new(conn);
/// let active = runner
///     .count(&QueryBuilder::table("users").where_("active", true))
///     .await?;
/// # let _ = active;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy)]
pub struct QueryRunner<'e> {
    executor: &'e dyn Executor,
    normalize_numeric: bool,
}

impl std::fmt::Debug for QueryRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("driver", &self.executor.driver())
            .field("normalize_numeric", &self.normalize_numeric)
            .finish()
    }
}

impl<'e> QueryRunner<'e> {
    /// Runner over `executor` returning values as the driver decodes them.
    #[must_use]
    pub fn new(executor: &'e dyn Executor) -> Self {
        Self {
            executor,
            normalize_numeric: false,
        }
    }

    /// Turns numeric-looking text in results into numbers.
    ///
    /// See [`SqlValue::normalize_numeric`] for what counts as numeric.
    #[must_use]
    pub const fn normalize_numeric(mut self, enabled: bool) -> Self {
        self.normalize_numeric = enabled;
        self
    }

    fn shape(&self, rows: Vec<Row>) -> Vec<Row> {
        if !self.normalize_numeric {
            return rows;
        }
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(column, value)| (column, value.normalize_numeric()))
                    .collect()
            })
            .collect()
    }

    fn shape_value(&self, value: SqlValue) -> SqlValue {
        if self.normalize_numeric {
            value.normalize_numeric()
        } else {
            value
        }
    }

    /// Every row the query selects.
    pub async fn get(&self, query: &QueryBuilder) -> Result<Vec<Row>> {
        let (sql, bindings) = query.to_sql(self.executor.dialect())?;
        let rows = self.executor.query(&sql, &bindings).await?;
        Ok(self.shape(rows))
    }

    /// The first row, if any.
    pub async fn first(&self, query: &QueryBuilder) -> Result<Option<Row>> {
        let rows = self.get(&query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// One column of the first row, if any.
    pub async fn value(&self, query: &QueryBuilder, column: &str) -> Result<Option<SqlValue>> {
        let row = self.first(&query.clone().select(&[column])).await?;
        Ok(row.and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    /// Runs an aggregate over the query, ignoring its ordering and limits.
    pub async fn aggregate(
        &self,
        query: &QueryBuilder,
        function: Aggregate,
        column: &str,
    ) -> Result<Option<SqlValue>> {
        let (sql, bindings) = query
            .clone()
            .reorder()
            .without_limits()
            .aggregate(function, column)
            .to_sql(self.executor.dialect())?;
        let value = self.executor.fetch_value(&sql, &bindings).await?;
        Ok(value.filter(|v| !v.is_null()).map(|v| self.shape_value(v)))
    }

    /// Number of rows the query matches.
    ///
    /// Distinct and grouped queries are counted through a derived table.
    pub async fn count(&self, query: &QueryBuilder) -> Result<u64> {
        let (sql, bindings) = query.to_count_sql(self.executor.dialect())?;
        let value = self.executor.fetch_value(&sql, &bindings).await?;
        Ok(as_count(value))
    }

    /// `SUM(column)`; `None` when no rows match.
    pub async fn sum(&self, query: &QueryBuilder, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate(query, Aggregate::Sum, column).await
    }

    /// `AVG(column)`; `None` when no rows match.
    pub async fn avg(&self, query: &QueryBuilder, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate(query, Aggregate::Avg, column).await
    }

    /// `MIN(column)`; `None` when no rows match.
    pub async fn min(&self, query: &QueryBuilder, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate(query, Aggregate::Min, column).await
    }

    /// `MAX(column)`; `None` when no rows match.
    pub async fn max(&self, query: &QueryBuilder, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate(query, Aggregate::Max, column).await
    }

    /// Whether the query matches any row.
    pub async fn exists(&self, query: &QueryBuilder) -> Result<bool> {
        Ok(self.first(query).await?.is_some())
    }

    /// Inserts `rows` into the query's table.
    pub async fn insert(&self, query: &QueryBuilder, rows: &[Row]) -> Result<u64> {
        let (sql, bindings) = query.compile_insert(self.executor.dialect(), rows)?;
        self.executor.execute(&sql, &bindings).await
    }

    /// Updates the rows the query matches.
    pub async fn update(&self, query: &QueryBuilder, values: &Row) -> Result<u64> {
        let (sql, bindings) = query.compile_update(self.executor.dialect(), values)?;
        self.executor.execute(&sql, &bindings).await
    }

    /// Deletes the rows the query matches.
    pub async fn delete(&self, query: &QueryBuilder) -> Result<u64> {
        let (sql, bindings) = query.compile_delete(self.executor.dialect())?;
        self.executor.execute(&sql, &bindings).await
    }

    /// Fetches one page by number, with the total count.
    pub async fn paginate(
        &self,
        query: &QueryBuilder,
        paginator: &OffsetPaginator,
    ) -> Result<OffsetPage> {
        let total = self.count(query).await?;
        let items = self.get(&paginator.apply(query.clone())).await?;
        Ok(paginator.page_of(items, total))
    }

    /// Fetches the page after `token`, or the first page when `None`.
    pub async fn cursor_paginate(
        &self,
        query: &QueryBuilder,
        paginator: &CursorPaginator,
        token: Option<&str>,
    ) -> Result<CursorPage> {
        let page_query = paginator.apply(query.clone(), token)?;
        let rows = self.get(&page_query).await?;
        Ok(paginator.page_of(rows)?)
    }
}

fn as_count(value: Option<SqlValue>) -> u64 {
    match value {
        Some(SqlValue::Int(n)) => u64::try_from(n).unwrap_or(0),
        Some(SqlValue::Text(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteConnection;
    use quarry_core::row;

    async fn seeded() -> SqliteConnection {
        let conn = SqliteConnection::connect("test", "sqlite::memory:", 1)
            .await
            .expect("Failed to create in-memory SQLite pool");
        conn.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, kind TEXT, price TEXT)",
            &[],
        )
        .await
        .unwrap();
        let runner = QueryRunner::new(&conn);
        let rows: Vec<Row> = (1..=5)
            .map(|i| {
                row([
                    ("id", SqlValue::Int(i)),
                    ("kind", SqlValue::Text(if i % 2 == 0 { "even" } else { "odd" }.into())),
                    ("price", SqlValue::Text(format!("{i}.50"))),
                ])
            })
            .collect();
        assert_eq!(runner.insert(&QueryBuilder::table("items"), &rows).await.unwrap(), 5);
        conn
    }

    #[tokio::test]
    async fn test_reads_and_aggregates() {
        let conn = seeded().await;
        let runner = QueryRunner::new(&conn);
        let odd = QueryBuilder::table("items").where_("kind", "odd");

        assert_eq!(runner.get(&odd).await.unwrap().len(), 3);
        assert_eq!(runner.count(&odd).await.unwrap(), 3);
        assert_eq!(
            runner.max(&odd, "id").await.unwrap(),
            Some(SqlValue::Int(5))
        );
        assert!(runner.exists(&odd).await.unwrap());
        assert!(!runner
            .exists(&QueryBuilder::table("items").where_("kind", "none"))
            .await
            .unwrap());
        assert_eq!(
            runner
                .min(&QueryBuilder::table("items").where_("kind", "none"), "id")
                .await
                .unwrap(),
            None
        );

        let grouped = QueryBuilder::table("items").select(&["kind"]).group_by(&["kind"]);
        assert_eq!(runner.count(&grouped).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_numeric_normalization_is_opt_in() {
        let conn = seeded().await;
        let query = QueryBuilder::table("items").where_("id", 1);

        let raw = QueryRunner::new(&conn).value(&query, "price").await.unwrap();
        assert_eq!(raw, Some(SqlValue::Text("1.50".into())));

        let normalized = QueryRunner::new(&conn)
            .normalize_numeric(true)
            .value(&query, "price")
            .await
            .unwrap();
        assert_eq!(normalized, Some(SqlValue::Float(1.5)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let conn = seeded().await;
        let runner = QueryRunner::new(&conn);
        let evens = QueryBuilder::table("items").where_("kind", "even");

        let changed = runner
            .update(&evens, &row([("price", SqlValue::Text("0".into()))]))
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(runner.delete(&evens).await.unwrap(), 2);
        assert_eq!(runner.count(&QueryBuilder::table("items")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_offset_pagination() {
        let conn = seeded().await;
        let runner = QueryRunner::new(&conn);
        let page = runner
            .paginate(
                &QueryBuilder::table("items").order_by("id"),
                &OffsetPaginator::new(2, 2).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.items[0]["id"], SqlValue::Int(3));
        assert!(page.has_more);
    }
}
