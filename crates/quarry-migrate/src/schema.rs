//! Schema facade: compiles blueprints for a connection and runs them.

use quarry_core::schema::{
    Blueprint, BlueprintMode, SchemaCompiler, SchemaOperation, SchemaPlan, TableSnapshot,
};
use quarry_core::SqlValue;
use tracing::{debug, info};

use crate::connection::Executor;
use crate::error::Result;
use crate::runner::QueryRunner;

/// Schema operations bound to one executor.
///
/// Migrations receive a `Schema` in `up` and `down`. When the engine is
/// pretending, the executor only records statements and every existence
/// check reports `false`.
#[derive(Clone, Copy)]
pub struct Schema<'e> {
    executor: &'e dyn Executor,
    prefix: &'e str,
    normalize_numeric: bool,
}

impl std::fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("driver", &self.executor.driver())
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl<'e> Schema<'e> {
    /// Facade over `executor` with no table prefix.
    #[must_use]
    pub fn new(executor: &'e dyn Executor) -> Self {
        Self {
            executor,
            prefix: "",
            normalize_numeric: false,
        }
    }

    /// Prepends `prefix` to every table name compiled by this facade.
    #[must_use]
    pub const fn with_prefix(mut self, prefix: &'e str) -> Self {
        self.prefix = prefix;
        self
    }

    /// Passes numeric normalization on to [`Schema::query`].
    #[must_use]
    pub const fn normalize_numeric(mut self, enabled: bool) -> Self {
        self.normalize_numeric = enabled;
        self
    }

    /// The executor statements go to.
    #[must_use]
    pub fn executor(&self) -> &'e dyn Executor {
        self.executor
    }

    /// Compiler for the executor's dialect and this facade's prefix.
    #[must_use]
    pub fn compiler(&self) -> SchemaCompiler<'e> {
        SchemaCompiler::new(self.executor.dialect()).with_prefix(self.prefix)
    }

    /// Query runner over the same executor.
    #[must_use]
    pub fn query(&self) -> QueryRunner<'e> {
        QueryRunner::new(self.executor).normalize_numeric(self.normalize_numeric)
    }

    async fn run_statements(&self, statements: Vec<String>) -> Result<()> {
        for sql in statements {
            self.executor.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    /// Compiles and runs one operation.
    pub async fn apply(&self, operation: &SchemaOperation) -> Result<()> {
        let statements = self.compiler().compile_operation(operation)?;
        self.run_statements(statements).await
    }

    /// Compiles the whole plan first, then runs it in order.
    pub async fn run(&self, plan: &SchemaPlan) -> Result<()> {
        let statements = self.compiler().compile_plan(plan)?;
        debug!(statements = statements.len(), "Running schema plan");
        self.run_statements(statements).await
    }

    /// Creates `table` from the columns `build` declares.
    pub async fn create(&self, table: &str, build: impl FnOnce(&mut Blueprint)) -> Result<()> {
        let mut blueprint = Blueprint::create(table);
        build(&mut blueprint);
        info!(table = %table, "Creating table");
        self.blueprint(&blueprint).await
    }

    /// Alters `table` with the changes `build` declares.
    pub async fn table(&self, table: &str, build: impl FnOnce(&mut Blueprint)) -> Result<()> {
        let mut blueprint = Blueprint::alter(table);
        build(&mut blueprint);
        info!(table = %table, "Altering table");
        self.blueprint(&blueprint).await
    }

    /// Compiles and runs a prepared blueprint.
    ///
    /// On dialects that rebuild tables to change columns, the stored table
    /// definition is read first and the rebuild runs on a single session,
    /// returning to its savepoint if any step fails.
    pub async fn blueprint(&self, blueprint: &Blueprint) -> Result<()> {
        let dialect = self.executor.dialect();
        let changes = blueprint.mode() == BlueprintMode::Alter
            && blueprint.columns().iter().any(|c| c.change);
        if !changes || !dialect.rebuilds_tables() {
            let statements = self.compiler().compile(blueprint)?;
            return self.run_statements(statements).await;
        }

        let snapshot = self.snapshot(blueprint.table()).await?;
        let statements = self
            .compiler()
            .with_snapshot(snapshot.as_ref())
            .compile(blueprint)?;
        debug!(
            table = blueprint.table(),
            statements = statements.len(),
            "Rebuilding table"
        );
        self.executor
            .execute_script(&statements, &dialect.abandon_rebuild())
            .await
    }

    /// Stored definition of `table`, if the dialect can read one back.
    pub async fn snapshot(&self, table: &str) -> Result<Option<TableSnapshot>> {
        let name = self.compiler().table_name(table);
        let Some((sql, bindings)) = self.executor.dialect().table_definition(&name) else {
            return Ok(None);
        };
        let rows = self.executor.query(&sql, &bindings).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(TableSnapshot::from_rows(&name, &rows)?))
    }

    /// Drops `table`; fails when it does not exist.
    pub async fn drop(&self, table: &str) -> Result<()> {
        info!(table = %table, "Dropping table");
        self.apply(&SchemaOperation::Drop(table.to_string())).await
    }

    /// Drops `table` if it exists.
    pub async fn drop_if_exists(&self, table: &str) -> Result<()> {
        info!(table = %table, "Dropping table if exists");
        self.apply(&SchemaOperation::DropIfExists(table.to_string()))
            .await
    }

    /// Renames `from` to `to`.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        info!(from = %from, to = %to, "Renaming table");
        self.apply(&SchemaOperation::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
        .await
    }

    /// Runs raw SQL.
    pub async fn statement(&self, sql: &str) -> Result<u64> {
        self.executor.execute(sql, &[]).await
    }

    async fn count_query(&self, sql: &str, bindings: &[SqlValue]) -> Result<bool> {
        let value = self.executor.fetch_value(sql, bindings).await?;
        Ok(matches!(value, Some(SqlValue::Int(n)) if n > 0))
    }

    /// Whether `table` exists. A missing table is not an error.
    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let name = self.compiler().table_name(table);
        let (sql, bindings) = self.executor.dialect().has_table(&name);
        self.count_query(&sql, &bindings).await
    }

    /// Whether `table` has `column`.
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let name = self.compiler().table_name(table);
        let (sql, bindings) = self.executor.dialect().has_column(&name, column);
        self.count_query(&sql, &bindings).await
    }

    /// Every user table on the connection, prefixed or not.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let sql = self.executor.dialect().list_tables();
        let rows = self.executor.query(&sql, &[]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some((_, SqlValue::Text(name))) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Drops every user table with foreign key checks turned off.
    ///
    /// The toggle and the drops share one session, so the pragma on engines
    /// that scope it per connection covers every drop.
    pub async fn drop_all_tables(&self) -> Result<Vec<String>> {
        let dialect = self.executor.dialect();
        let tables = self.list_tables().await?;
        let mut statements: Vec<String> = dialect.disable_foreign_keys().into_iter().collect();
        statements.extend(tables.iter().map(|t| dialect.drop_table_for_wipe(t)));
        let enable: Vec<String> = dialect.enable_foreign_keys().into_iter().collect();
        statements.extend(enable.iter().cloned());
        self.executor.execute_script(&statements, &enable).await?;
        info!(tables = tables.len(), "Dropped all tables");
        Ok(tables)
    }
}
