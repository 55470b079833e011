//! Migration units and their discovery.
//!
//! A unit is anything implementing [`Migration`]. SQL files are the common
//! case:
//!
//! ```sql
//! -- migrate:connection audit
//! -- migrate:transaction
//! -- migrate:up
//! CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT NOT NULL);
//! CREATE INDEX events_kind_index ON events (kind);
//!
//! -- migrate:down
//! DROP TABLE events;
//! ```
//!
//! The identifier is the file stem. Units are ordered by comparing
//! identifiers as strings, so date-stamped names sort chronologically.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::schema::Schema;

/// One versioned schema change.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique identifier; also the sort key.
    fn id(&self) -> &str;

    /// Connection the unit runs on; the default connection when `None`.
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Whether `up`/`down` and the ledger update share one transaction.
    fn within_transaction(&self) -> bool {
        false
    }

    /// Applies the change.
    async fn up(&self, schema: &Schema<'_>) -> Result<()>;

    /// Reverts the change.
    async fn down(&self, schema: &Schema<'_>) -> Result<()>;
}

/// A migration read from a `.sql` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    id: String,
    path: PathBuf,
    connection: Option<String>,
    transaction: bool,
    up: Vec<String>,
    down: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

impl SqlMigration {
    /// Reads and parses `path`. The identifier is the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrateError::ParseError {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?
            .to_string();
        let source = std::fs::read_to_string(path)?;
        Self::parse(id, path, &source)
    }

    /// Parses migration source.
    pub fn parse(id: impl Into<String>, path: &Path, source: &str) -> Result<Self> {
        let parse_error = |message: String| MigrateError::ParseError {
            path: path.to_path_buf(),
            message,
        };

        let mut section = Section::Header;
        let mut connection = None;
        let mut transaction = false;
        let mut seen_up = false;
        let mut up = String::new();
        let mut down = String::new();

        for (number, line) in source.lines().enumerate() {
            let trimmed = line.trim();
            if let Some(directive) = trimmed.strip_prefix("-- migrate:") {
                let (name, argument) = directive
                    .split_once(char::is_whitespace)
                    .map_or((directive, ""), |(n, a)| (n, a.trim()));
                match name {
                    "up" => {
                        if seen_up {
                            return Err(parse_error("duplicate `-- migrate:up` section".into()));
                        }
                        seen_up = true;
                        section = Section::Up;
                    }
                    "down" => {
                        if !seen_up {
                            return Err(parse_error(
                                "`-- migrate:down` must follow `-- migrate:up`".into(),
                            ));
                        }
                        section = Section::Down;
                    }
                    "connection" if section == Section::Header => {
                        if argument.is_empty() {
                            return Err(parse_error("`-- migrate:connection` needs a name".into()));
                        }
                        connection = Some(argument.to_string());
                    }
                    "transaction" if section == Section::Header => transaction = true,
                    other => {
                        return Err(parse_error(format!(
                            "line {}: unexpected directive `-- migrate:{other}`",
                            number + 1
                        )))
                    }
                }
                continue;
            }

            match section {
                Section::Header => {
                    if !trimmed.is_empty() && !trimmed.starts_with("--") {
                        return Err(parse_error(format!(
                            "line {}: SQL before `-- migrate:up`",
                            number + 1
                        )));
                    }
                }
                Section::Up => {
                    up.push_str(line);
                    up.push('\n');
                }
                Section::Down => {
                    down.push_str(line);
                    down.push('\n');
                }
            }
        }

        if !seen_up {
            return Err(parse_error("missing `-- migrate:up` section".into()));
        }

        Ok(Self {
            id: id.into(),
            path: path.to_path_buf(),
            connection,
            transaction,
            up: split_statements(&up),
            down: split_statements(&down),
        })
    }

    /// Assigns the connection unless the file names one itself.
    #[must_use]
    pub fn with_default_connection(mut self, connection: Option<&str>) -> Self {
        if self.connection.is_none() {
            self.connection = connection.map(str::to_string);
        }
        self
    }

    /// Source file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Statements of the up section.
    #[must_use]
    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    /// Statements of the down section.
    #[must_use]
    pub fn down_statements(&self) -> &[String] {
        &self.down
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn connection(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    fn within_transaction(&self) -> bool {
        self.transaction
    }

    async fn up(&self, schema: &Schema<'_>) -> Result<()> {
        for sql in &self.up {
            schema.statement(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, schema: &Schema<'_>) -> Result<()> {
        if self.down.is_empty() {
            warn!(id = %self.id, "Migration has no down section");
        }
        for sql in &self.down {
            schema.statement(sql).await?;
        }
        Ok(())
    }
}

/// Splits a script on `;` outside quotes and comments.
///
/// Chunks holding only whitespace and comments are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '[' => {
                quote = Some(']');
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                current.push(c);
                let mut previous = '\0';
                for next in chars.by_ref() {
                    current.push(next);
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if has_sql(trimmed) {
        statements.push(trimmed.to_string());
    }
}

fn has_sql(chunk: &str) -> bool {
    let mut rest = chunk;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return !rest.is_empty();
        }
    }
}

/// A discovered unit, ready to run.
#[derive(Clone)]
pub struct MigrationUnit {
    /// Unit identifier.
    pub id: String,
    /// Connection name; the default connection when `None`.
    pub connection: Option<String>,
    /// Runs inside a transaction.
    pub transaction: bool,
    /// The unit itself.
    pub migration: Arc<dyn Migration>,
}

impl MigrationUnit {
    /// Wraps a migration.
    pub fn new(migration: Arc<dyn Migration>) -> Self {
        Self {
            id: migration.id().to_string(),
            connection: migration.connection().map(str::to_string),
            transaction: migration.within_transaction(),
            migration,
        }
    }
}

impl fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

/// Reads every `.sql` migration under the configured root.
///
/// Subdirectories mapped to a connection assign their units to it; other
/// subdirectories are only read when discovery is recursive. A missing
/// root yields no units.
pub fn discover_files(config: &Config) -> Result<Vec<SqlMigration>> {
    let root = &config.migrations.root;
    if !root.is_dir() {
        warn!(root = %root.display(), "Migration directory does not exist");
        return Ok(Vec::new());
    }
    let mapped: Vec<(PathBuf, &str)> = config
        .migrations
        .directories
        .iter()
        .map(|(name, dir)| (root.join(dir), name.as_str()))
        .collect();

    let mut found = Vec::new();
    walk(root, None, config.migrations.recursive, &mapped, &mut found)?;
    debug!(root = %root.display(), units = found.len(), "Discovered migration files");
    Ok(found)
}

fn walk(
    dir: &Path,
    connection: Option<&str>,
    recursive: bool,
    mapped: &[(PathBuf, &str)],
    found: &mut Vec<SqlMigration>,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if let Some((_, name)) = mapped.iter().find(|(p, _)| *p == path) {
                walk(&path, Some(name), recursive, mapped, found)?;
            } else if recursive {
                walk(&path, connection, recursive, mapped, found)?;
            }
        } else if path.extension().is_some_and(|ext| ext == "sql") {
            found.push(SqlMigration::load(&path)?.with_default_connection(connection));
        }
    }
    Ok(())
}

/// Merges file units with registered ones, sorted by identifier.
///
/// Two units with the same identifier are a configuration error.
pub fn collect_units(
    files: Vec<SqlMigration>,
    registered: &[Arc<dyn Migration>],
) -> Result<Vec<MigrationUnit>> {
    let mut units: Vec<MigrationUnit> = files
        .into_iter()
        .map(|m| MigrationUnit::new(Arc::new(m)))
        .chain(registered.iter().cloned().map(MigrationUnit::new))
        .collect();

    let mut seen = HashSet::new();
    for unit in &units {
        if !seen.insert(unit.id.as_str()) {
            return Err(MigrateError::Configuration(format!(
                "duplicate migration identifier '{}'",
                unit.id
            )));
        }
    }
    units.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(units)
}
