//! The migration engine.
//!
//! Discovers units, diffs them against each connection's ledger and applies
//! or reverts them batch by batch. The engine holds no lock across units:
//! concurrent runs against one ledger must be serialized by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::{Connection, Connections, Executor, PretendExecutor};
use crate::discovery::{collect_units, discover_files, Migration, MigrationUnit};
use crate::error::{MigrateError, Result};
use crate::ledger::{AppliedMigration, Ledger};
use crate::schema::Schema;

/// Outcome of an engine operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Units applied, in order.
    pub migrated: Vec<String>,
    /// Units reverted, in order.
    pub rolled_back: Vec<String>,
    /// Tables dropped by `fresh`.
    pub dropped: Vec<String>,
    /// SQL that would have run, when pretending.
    pub pretended: Vec<PretendedUnit>,
}

/// Statements one unit would run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PretendedUnit {
    /// Unit identifier.
    pub id: String,
    /// Connection name.
    pub connection: String,
    /// Statements in execution order.
    pub statements: Vec<String>,
}

/// One line of `migrate:status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Unit identifier.
    pub id: String,
    /// Connection name.
    pub connection: String,
    /// Whether the ledger records the unit.
    pub applied: bool,
    /// Batch it was applied in.
    pub batch: Option<i64>,
    /// When it was applied.
    pub applied_at: Option<DateTime<FixedOffset>>,
    /// Recorded in the ledger but no longer discovered.
    pub missing: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Step {
    Up,
    Down,
}

#[derive(Clone, Copy)]
enum Scope {
    LastBatch,
    Steps(u64),
    All,
}

/// Applies and reverts migrations across named connections.
///
/// ```rust,no_run
/// # async fn demo() -> quarry_migrate::Result<()> {
/// use quarry_migrate::config::Config;
/// use quarry_migrate::migrator::Migrator;
///
/// let config = Config::load("quarry.toml".as_ref())?;
/// let report = Migrator::new(config).migrate().await?;
/// println!("applied {} migration(s)", report.migrated.len());
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
    connections: Connections,
    registered: Vec<Arc<dyn Migration>>,
    pretend: bool,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("connections", &self.connections)
            .field("registered", &self.registered.len())
            .field("pretend", &self.pretend)
            .finish()
    }
}

impl Migrator {
    /// Engine over the connections in `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_connections(Connections::new(config))
    }

    /// Engine over an existing connection registry.
    #[must_use]
    pub fn with_connections(connections: Connections) -> Self {
        Self {
            connections,
            registered: Vec::new(),
            pretend: false,
        }
    }

    /// Adds a unit defined in code.
    #[must_use]
    pub fn register(mut self, migration: impl Migration + 'static) -> Self {
        self.registered.push(Arc::new(migration));
        self
    }

    /// Compiles and logs statements instead of running them.
    ///
    /// The ledger is read but never written.
    #[must_use]
    pub const fn pretend(mut self, enabled: bool) -> Self {
        self.pretend = enabled;
        self
    }

    /// The connection registry.
    #[must_use]
    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    fn config(&self) -> &Config {
        self.connections.config()
    }

    /// Every known unit, sorted by identifier.
    pub fn units(&self) -> Result<Vec<MigrationUnit>> {
        let units = collect_units(discover_files(self.config())?, &self.registered)?;
        for unit in &units {
            if let Some(name) = &unit.connection {
                self.config().connection(Some(name)).map_err(|_| {
                    MigrateError::Configuration(format!(
                        "migration '{}' targets undefined connection '{name}'",
                        unit.id
                    ))
                })?;
            }
        }
        Ok(units)
    }

    fn connection_name<'a>(&'a self, unit: &'a MigrationUnit) -> &'a str {
        unit.connection
            .as_deref()
            .unwrap_or(&self.config().default)
    }

    /// Default connection first, then every connection a unit names.
    fn involved(&self, units: &[MigrationUnit]) -> Vec<String> {
        let mut names = vec![self.config().default.clone()];
        for unit in units {
            let name = self.connection_name(unit);
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    fn ledger<'c>(&self, name: &str, executor: &'c dyn Executor) -> Ledger<'c> {
        let config = self.config();
        Ledger::new(
            executor,
            config.ledger_table_for(name),
            config.timezone_for(name),
        )
    }

    /// Applies every pending unit in one batch per connection.
    pub async fn migrate(&self) -> Result<MigrationReport> {
        let units = self.units()?;
        let mut report = MigrationReport::default();
        self.migrate_units(&units, false, &mut report).await?;
        Ok(report)
    }

    async fn migrate_units(
        &self,
        units: &[MigrationUnit],
        assume_empty: bool,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let mut applied: HashMap<String, HashSet<String>> = HashMap::new();
        let mut batches: HashMap<String, i64> = HashMap::new();
        for name in self.involved(units) {
            let conn = self.connections.get(Some(name.as_str())).await?;
            let ledger = self.ledger(&name, conn.as_executor());
            if !self.pretend {
                ledger.ensure_table().await?;
            }
            let (ids, next) = if assume_empty || !ledger.exists().await? {
                (Vec::new(), 1)
            } else {
                (ledger.applied_ids().await?, ledger.next_batch_number().await?)
            };
            applied.insert(name.clone(), ids.into_iter().collect());
            batches.insert(name, next);
        }

        let pending: Vec<&MigrationUnit> = units
            .iter()
            .filter(|unit| {
                !applied
                    .get(self.connection_name(unit))
                    .is_some_and(|ids| ids.contains(&unit.id))
            })
            .collect();
        if pending.is_empty() {
            info!("Nothing to migrate");
            return Ok(());
        }

        let mut done = Vec::new();
        for unit in pending {
            let name = self.connection_name(unit);
            let batch = batches.get(name).copied().unwrap_or(1);
            let conn = self.connections.get(Some(name)).await?;
            info!(id = %unit.id, connection = %name, batch, "Applying migration");
            match self.run(unit, name, conn.as_ref(), Step::Up, batch).await {
                Ok(statements) => {
                    self.note(report, unit, name, statements);
                    info!(id = %unit.id, "Migration applied successfully");
                    done.push(unit.id.clone());
                    report.migrated.push(unit.id.clone());
                }
                Err(source) => {
                    return Err(MigrateError::MigrationFailed {
                        id: unit.id.clone(),
                        batch,
                        applied: done,
                        source: Box::new(source),
                    })
                }
            }
        }
        Ok(())
    }

    /// Reverts the last batch, or the last `steps` units when given.
    pub async fn rollback(&self, steps: Option<u64>) -> Result<MigrationReport> {
        let scope = match steps {
            Some(n) if n > 0 => Scope::Steps(n),
            _ => Scope::LastBatch,
        };
        let units = self.units()?;
        let mut report = MigrationReport::default();
        self.revert(&units, scope, &mut report).await?;
        Ok(report)
    }

    /// Reverts every applied unit, newest first.
    pub async fn reset(&self) -> Result<MigrationReport> {
        let units = self.units()?;
        let mut report = MigrationReport::default();
        self.revert(&units, Scope::All, &mut report).await?;
        Ok(report)
    }

    /// Reset, then migrate.
    pub async fn refresh(&self) -> Result<MigrationReport> {
        let units = self.units()?;
        let mut report = MigrationReport::default();
        self.revert(&units, Scope::All, &mut report).await?;
        self.migrate_units(&units, self.pretend, &mut report).await?;
        Ok(report)
    }

    /// Drops every table on the involved connections, then migrates.
    pub async fn fresh(&self) -> Result<MigrationReport> {
        let units = self.units()?;
        let mut report = MigrationReport::default();
        for name in self.involved(&units) {
            let conn = self.connections.get(Some(name.as_str())).await?;
            let schema = Schema::new(conn.as_executor());
            let dropped = if self.pretend {
                let tables = schema.list_tables().await?;
                info!(connection = %name, tables = tables.len(), "Would drop all tables");
                tables
            } else {
                warn!(connection = %name, "Dropping all tables");
                schema.drop_all_tables().await?
            };
            report.dropped.extend(dropped);
        }
        self.migrate_units(&units, self.pretend, &mut report).await?;
        Ok(report)
    }

    async fn revert(
        &self,
        units: &[MigrationUnit],
        scope: Scope,
        report: &mut MigrationReport,
    ) -> Result<()> {
        let mut done = Vec::new();
        for name in self.involved(units) {
            let conn = self.connections.get(Some(name.as_str())).await?;
            let ledger = self.ledger(&name, conn.as_executor());
            if !ledger.exists().await? {
                continue;
            }
            let targets = match scope {
                Scope::LastBatch => newest_first(ledger.last_batch().await?),
                Scope::Steps(n) => ledger.last_steps(n).await?,
                Scope::All => newest_first(ledger.applied().await?),
            };
            if targets.is_empty() {
                info!(connection = %name, "Nothing to roll back");
                continue;
            }

            for entry in targets {
                let unit = units
                    .iter()
                    .find(|u| u.id == entry.identifier && self.connection_name(u) == name);
                let Some(unit) = unit else {
                    warn!(id = %entry.identifier, connection = %name, "Migration not found, skipping rollback");
                    continue;
                };
                info!(id = %unit.id, connection = %name, batch = entry.batch, "Rolling back migration");
                match self.run(unit, &name, conn.as_ref(), Step::Down, entry.batch).await {
                    Ok(statements) => {
                        self.note(report, unit, &name, statements);
                        info!(id = %unit.id, "Migration rolled back successfully");
                        done.push(unit.id.clone());
                        report.rolled_back.push(unit.id.clone());
                    }
                    Err(source) => {
                        return Err(MigrateError::MigrationFailed {
                            id: unit.id.clone(),
                            batch: entry.batch,
                            applied: done,
                            source: Box::new(source),
                        })
                    }
                }
            }
        }
        Ok(())
    }

    fn note(&self, report: &mut MigrationReport, unit: &MigrationUnit, name: &str, statements: Vec<String>) {
        if !self.pretend {
            return;
        }
        for sql in &statements {
            info!(id = %unit.id, connection = %name, "{sql};");
        }
        report.pretended.push(PretendedUnit {
            id: unit.id.clone(),
            connection: name.to_string(),
            statements,
        });
    }

    /// Runs one step of `unit`, returning the recorded statements when pretending.
    async fn run(
        &self,
        unit: &MigrationUnit,
        name: &str,
        conn: &dyn Connection,
        step: Step,
        batch: i64,
    ) -> Result<Vec<String>> {
        let config = self.config();
        let prefix = config.prefix_for(name);

        if self.pretend {
            let pretend = PretendExecutor::new(conn.driver());
            let schema = Schema::new(&pretend)
                .with_prefix(prefix)
                .normalize_numeric(config.normalize_numeric);
            match step {
                Step::Up => unit.migration.up(&schema).await?,
                Step::Down => unit.migration.down(&schema).await?,
            }
            return Ok(pretend.take());
        }

        let ledger = self.ledger(name, conn.as_executor());
        if unit.transaction {
            let tx = conn.begin().await?;
            match self.step_on(unit, &tx, prefix, &ledger, step, batch).await {
                Ok(()) => tx.commit().await?,
                Err(error) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(id = %unit.id, error = %rollback, "Rollback failed");
                    }
                    return Err(error);
                }
            }
        } else {
            self.step_on(unit, conn.as_executor(), prefix, &ledger, step, batch)
                .await?;
        }
        Ok(Vec::new())
    }

    async fn step_on(
        &self,
        unit: &MigrationUnit,
        executor: &dyn Executor,
        prefix: &str,
        ledger: &Ledger<'_>,
        step: Step,
        batch: i64,
    ) -> Result<()> {
        let schema = Schema::new(executor)
            .with_prefix(prefix)
            .normalize_numeric(self.config().normalize_numeric);
        match step {
            Step::Up => {
                unit.migration.up(&schema).await?;
                ledger.record_on(executor, &unit.id, batch).await
            }
            Step::Down => {
                unit.migration.down(&schema).await?;
                ledger.remove_on(executor, &unit.id).await
            }
        }
    }

    /// Per-unit status across every involved ledger.
    ///
    /// Ledger rows without a discovered unit are listed last as `missing`.
    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        let units = self.units()?;
        let mut ledgers: Vec<(String, Vec<AppliedMigration>)> = Vec::new();
        for name in self.involved(&units) {
            let conn = self.connections.get(Some(name.as_str())).await?;
            let ledger = self.ledger(&name, conn.as_executor());
            let rows = if ledger.exists().await? {
                ledger.applied().await?
            } else {
                Vec::new()
            };
            ledgers.push((name, rows));
        }

        let lookup = |name: &str, id: &str| {
            ledgers
                .iter()
                .find(|(n, _)| n == name)
                .and_then(|(_, rows)| rows.iter().find(|r| r.identifier == id))
        };

        let mut entries: Vec<StatusEntry> = units
            .iter()
            .map(|unit| {
                let name = self.connection_name(unit);
                let row = lookup(name, &unit.id);
                StatusEntry {
                    id: unit.id.clone(),
                    connection: name.to_string(),
                    applied: row.is_some(),
                    batch: row.map(|r| r.batch),
                    applied_at: row.and_then(|r| r.applied_at),
                    missing: false,
                }
            })
            .collect();

        for (name, rows) in &ledgers {
            for row in rows {
                let known = units
                    .iter()
                    .any(|u| u.id == row.identifier && self.connection_name(u) == name);
                if !known {
                    entries.push(StatusEntry {
                        id: row.identifier.clone(),
                        connection: name.clone(),
                        applied: true,
                        batch: Some(row.batch),
                        applied_at: row.applied_at,
                        missing: true,
                    });
                }
            }
        }
        Ok(entries)
    }
}

fn newest_first(mut rows: Vec<AppliedMigration>) -> Vec<AppliedMigration> {
    rows.sort_by(|a, b| b.batch.cmp(&a.batch).then_with(|| b.identifier.cmp(&a.identifier)));
    rows
}
