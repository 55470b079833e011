//! Dialect profiles.
//!
//! Every engine difference the builder and the schema compiler care about
//! lives behind the [`Dialect`] trait: identifier quoting, placeholder
//! style, limit/offset syntax, type names and DDL templates. Callers pick a
//! profile once (usually from [`Driver::dialect`]) and pass it as
//! `&dyn Dialect`; nothing else branches on the engine.

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use crate::error::CompileError;
use crate::ident;
use crate::schema::{
    ColumnDefinition, ColumnType, DefaultValue, ForeignKeyDefinition, IndexDefinition, IndexKind,
    TableSnapshot,
};
use crate::value::SqlValue;

/// Database engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Driver {
    /// SQLite 3.35+.
    #[serde(rename = "sqlite")]
    Sqlite,
    /// PostgreSQL.
    #[serde(rename = "pgsql", alias = "postgres", alias = "postgresql")]
    Postgres,
    /// MySQL and MariaDB.
    #[serde(rename = "mysql", alias = "mariadb")]
    MySql,
    /// Microsoft SQL Server 2016+.
    #[serde(rename = "sqlsrv", alias = "sqlserver", alias = "mssql")]
    SqlServer,
}

static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static SQLSERVER: SqlServerDialect = SqlServerDialect;

impl Driver {
    /// Returns the dialect profile for this engine.
    #[must_use]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            Self::Sqlite => &SQLITE,
            Self::Postgres => &POSTGRES,
            Self::MySql => &MYSQL,
            Self::SqlServer => &SQLSERVER,
        }
    }

    /// Canonical driver id.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "pgsql",
            Self::MySql => "mysql",
            Self::SqlServer => "sqlsrv",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlsrv" | "sqlserver" | "mssql" => Ok(Self::SqlServer),
            other => Err(format!("unknown driver '{other}'")),
        }
    }
}

/// Per-engine rendering rules.
///
/// Required methods are the ones with no sensible shared default (type
/// names, auto-increment syntax, column modification, existence queries).
/// Everything else defaults to the ANSI-ish form most engines accept and is
/// overridden where an engine diverges.
pub trait Dialect: Send + Sync {
    /// Engine this profile renders for.
    fn driver(&self) -> Driver;

    // ---------------------------------------------------------------------
    // Identifiers and parameters
    // ---------------------------------------------------------------------

    /// Opening and closing identifier quote characters.
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quotes one identifier segment, doubling embedded closing quotes.
    fn quote_segment(&self, segment: &str) -> String {
        if segment == "*" {
            return String::from("*");
        }
        let (open, close) = self.identifier_quotes();
        let escaped = segment.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    /// Quotes a possibly dotted, possibly aliased identifier.
    fn quote_identifier(&self, name: &str) -> String {
        if let Some((expr, alias)) = ident::split_alias(name) {
            return format!(
                "{} AS {}",
                self.quote_identifier(expr),
                self.quote_segment(alias)
            );
        }
        name.split('.')
            .map(|segment| self.quote_segment(segment))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes a string literal (DDL only).
    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Placeholder for the 1-based parameter `position`.
    fn placeholder(&self, _position: usize) -> String {
        String::from("?")
    }

    /// Trailing LIMIT/OFFSET fragment, with a leading space.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        if let Some(n) = limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(n) = offset {
            sql.push_str(&format!(" OFFSET {n}"));
        }
        sql
    }

    /// Whether limit/offset is only valid after an ORDER BY.
    fn requires_order_for_offset(&self) -> bool {
        false
    }

    // ---------------------------------------------------------------------
    // Types and column definitions
    // ---------------------------------------------------------------------

    /// Dialect type name for a column, without constraints.
    fn type_name(&self, column: &ColumnDefinition) -> Result<String, CompileError>;

    /// Auto-increment fragment (with leading space) for an integer column.
    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Result<String, CompileError>;

    /// Whether `UNSIGNED` is native; otherwise it is emulated with a CHECK.
    fn native_unsigned(&self) -> bool {
        false
    }

    /// Whether `ENUM(...)` is native; otherwise it is emulated with a CHECK.
    fn native_enum(&self) -> bool {
        false
    }

    /// Boolean literal used in defaults.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    /// Renders a column default.
    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Raw(expr) => expr.clone(),
            DefaultValue::Literal(SqlValue::Bool(b)) => self.bool_literal(*b).to_string(),
            DefaultValue::Literal(SqlValue::Text(s)) => self.quote_string(s),
            DefaultValue::Literal(value) => value.to_sql_inline(),
        }
    }

    /// CHECK constraint emulating features the engine lacks.
    fn column_check(&self, column: &ColumnDefinition) -> Option<String> {
        let name = self.quote_identifier(&column.name);
        let mut checks = Vec::new();
        if let ColumnType::Enum(values) = &column.column_type {
            if !self.native_enum() {
                let allowed: Vec<String> = values.iter().map(|v| self.quote_string(v)).collect();
                checks.push(format!("{name} IN ({})", allowed.join(", ")));
            }
        }
        if column.unsigned && !self.native_unsigned() {
            checks.push(format!("{name} >= 0"));
        }
        if checks.is_empty() {
            None
        } else {
            Some(format!("CHECK ({})", checks.join(" AND ")))
        }
    }

    /// Inline comment clause (with leading space), if the engine has one.
    fn inline_comment(&self, _comment: &str) -> Option<String> {
        None
    }

    /// Separate statement attaching a column comment, if the engine has one.
    fn comment_statement(&self, _table: &str, _column: &str, _comment: &str) -> Option<String> {
        None
    }

    /// Whether `AFTER <column>` placement is honoured.
    fn supports_column_placement(&self) -> bool {
        false
    }

    /// Table option suffix (engine/charset/collation), if the engine has one.
    fn table_options(
        &self,
        _engine: Option<&str>,
        _charset: Option<&str>,
        _collation: Option<&str>,
    ) -> Option<String> {
        None
    }

    /// Full column definition as used in CREATE TABLE and ADD COLUMN.
    fn column_definition(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.type_name(column)?
        );
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        if let Some(ref default) = column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        if column.auto_increment {
            sql.push_str(&self.auto_increment_clause(column)?);
        }
        if let Some(check) = self.column_check(column) {
            sql.push(' ');
            sql.push_str(&check);
        }
        if let Some(clause) = column.comment.as_deref().and_then(|c| self.inline_comment(c)) {
            sql.push_str(&clause);
        }
        if let Some(ref after) = column.after {
            if self.supports_column_placement() {
                sql.push_str(&format!(" AFTER {}", self.quote_identifier(after)));
            }
        }
        Ok(sql)
    }

    // ---------------------------------------------------------------------
    // Table statements
    // ---------------------------------------------------------------------

    /// CREATE TABLE from already-rendered column and constraint lines.
    fn create_table(&self, table: &str, if_not_exists: bool, body: &[String]) -> String {
        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");
        sql.push_str(&body.join(", "));
        sql.push(')');
        sql
    }

    /// DROP TABLE.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// DROP TABLE IF EXISTS.
    fn drop_table_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    /// DROP used when wiping a database, ignoring dependent objects.
    fn drop_table_for_wipe(&self, table: &str) -> String {
        self.drop_table_if_exists(table)
    }

    /// Table rename.
    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    // ---------------------------------------------------------------------
    // Column statements
    // ---------------------------------------------------------------------

    /// ALTER TABLE ... ADD COLUMN.
    fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)?
        ))
    }

    /// ALTER TABLE ... DROP COLUMN.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        )
    }

    /// Column rename.
    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_identifier(table),
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    /// Statements changing an existing column to `column`'s definition.
    fn modify_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError>;

    /// Whether column changes recreate the whole table from a
    /// [`TableSnapshot`] instead of going through [`Dialect::modify_column`].
    fn rebuilds_tables(&self) -> bool {
        false
    }

    /// Query returning the stored definition of `table` and of its indexes
    /// and triggers, one `type` and `sql` column per row.
    fn table_definition(&self, _table: &str) -> Option<(String, Vec<SqlValue>)> {
        None
    }

    /// Statements recreating `snapshot` with `changes` swapped in, keeping
    /// every row.
    fn rebuild_table(
        &self,
        snapshot: &TableSnapshot,
        _changes: &[&ColumnDefinition],
    ) -> Result<Vec<String>, CompileError> {
        Err(unsupported(
            self.driver(),
            format!("rebuilding table '{}'", snapshot.table()),
        ))
    }

    /// Statements undoing a rebuild that stopped part way, run on the same
    /// session.
    fn abandon_rebuild(&self) -> Vec<String> {
        Vec::new()
    }

    // ---------------------------------------------------------------------
    // Indexes and constraints
    // ---------------------------------------------------------------------

    /// Quoted, comma-separated column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Primary key line inside CREATE TABLE.
    fn primary_constraint(&self, table: &str, index: &IndexDefinition) -> String {
        format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            self.quote_identifier(&index.resolved_name(table)),
            self.column_list(&index.columns)
        )
    }

    /// Adds a primary key to an existing table.
    fn add_primary(&self, table: &str, index: &IndexDefinition) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.primary_constraint(table, index)
        ))
    }

    /// Drops the primary key.
    fn drop_primary(&self, table: &str, name: Option<&str>) -> Result<String, CompileError>;

    /// CREATE INDEX for plain and unique indexes; other kinds are dialect specific.
    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<String, CompileError> {
        let keyword = match index.kind {
            IndexKind::Index => "INDEX",
            IndexKind::Unique => "UNIQUE INDEX",
            IndexKind::Primary => return self.add_primary(table, index),
            IndexKind::Spatial => return Err(unsupported(self.driver(), "spatial indexes")),
            IndexKind::Fulltext => return Err(unsupported(self.driver(), "full-text indexes")),
        };
        Ok(format!(
            "CREATE {keyword} {} ON {} ({})",
            self.quote_identifier(&index.resolved_name(table)),
            self.quote_identifier(table),
            self.column_list(&index.columns)
        ))
    }

    /// DROP INDEX.
    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX {}", self.quote_identifier(name))
    }

    /// FOREIGN KEY clause as used inside CREATE TABLE.
    fn foreign_key_clause(&self, fk: &ForeignKeyDefinition) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.resolved_name()),
            self.column_list(&fk.columns),
            self.quote_identifier(&fk.references_table),
            self.column_list(&fk.references_columns)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = fk.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        sql
    }

    /// Adds a foreign key to an existing table.
    fn add_foreign(&self, table: &str, fk: &ForeignKeyDefinition) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.foreign_key_clause(fk)
        ))
    }

    /// Drops a foreign key by name.
    fn drop_foreign(&self, table: &str, name: &str) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Query returning a single count > 0 when `table` exists.
    fn has_table(&self, table: &str) -> (String, Vec<SqlValue>);

    /// Query returning a single count > 0 when `table.column` exists.
    fn has_column(&self, table: &str, column: &str) -> (String, Vec<SqlValue>);

    /// Query listing user tables, one `name` column per row.
    fn list_tables(&self) -> String;

    /// Statement turning foreign key enforcement off, if needed for a wipe.
    fn disable_foreign_keys(&self) -> Option<String> {
        None
    }

    /// Statement turning foreign key enforcement back on.
    fn enable_foreign_keys(&self) -> Option<String> {
        None
    }
}

pub(crate) fn unsupported(driver: Driver, feature: impl Into<String>) -> CompileError {
    CompileError::Unsupported {
        driver,
        feature: feature.into(),
    }
}
