//! Table blueprints.
//!
//! A [`Blueprint`] records column, index and foreign key definitions plus
//! alteration commands for one table. It performs no I/O; the
//! [`SchemaCompiler`](super::SchemaCompiler) turns it into DDL for a dialect.

use super::column::{ColumnDefinition, ColumnType};
use super::index::{default_name, ForeignKeyDefinition, IndexDefinition, IndexKind};

/// Whether a blueprint creates a new table or alters an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueprintMode {
    /// CREATE TABLE.
    Create,
    /// ALTER TABLE.
    Alter,
}

/// One recorded blueprint command, in declaration order.
///
/// Column, index and foreign key commands refer into the blueprint's own
/// definition lists so definitions can be modified in place after they are
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlueprintCommand {
    /// Add (or, with `change`, modify) the column at this position.
    Column(usize),
    /// Create the index at this position.
    Index(usize),
    /// Add the foreign key at this position.
    Foreign(usize),
    /// Drop columns.
    DropColumn(Vec<String>),
    /// Rename a column.
    RenameColumn {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop an index (plain, unique, spatial or full-text).
    DropIndex(ConstraintRef),
    /// Drop the primary key, optionally by name.
    DropPrimary(Option<String>),
    /// Drop a foreign key.
    DropForeign(ConstraintRef),
}

/// Names an index or constraint to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintRef {
    /// Explicit name.
    Named(String),
    /// The name generated for these columns, resolved against the final
    /// (prefixed) table name at compile time.
    Generated {
        /// Constrained columns.
        columns: Vec<String>,
        /// Kind suffix (`index`, `unique`, `foreign`...).
        suffix: &'static str,
    },
}

impl ConstraintRef {
    fn generated(columns: &[&str], suffix: &'static str) -> Self {
        Self::Generated {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            suffix,
        }
    }

    /// Resolves the name for `table`.
    #[must_use]
    pub fn resolve(&self, table: &str) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Generated { columns, suffix } => default_name(table, columns, suffix),
        }
    }
}

/// Column, index and command recorder for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    mode: BlueprintMode,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
    foreign_keys: Vec<ForeignKeyDefinition>,
    commands: Vec<BlueprintCommand>,
    if_not_exists: bool,
    engine: Option<String>,
    charset: Option<String>,
    collation: Option<String>,
}

impl Blueprint {
    fn new(table: impl Into<String>, mode: BlueprintMode) -> Self {
        Self {
            table: table.into(),
            mode,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            commands: Vec::new(),
            if_not_exists: false,
            engine: None,
            charset: None,
            collation: None,
        }
    }

    /// Blueprint for a new table.
    #[must_use]
    pub fn create(table: impl Into<String>) -> Self {
        Self::new(table, BlueprintMode::Create)
    }

    /// Blueprint altering an existing table.
    #[must_use]
    pub fn alter(table: impl Into<String>) -> Self {
        Self::new(table, BlueprintMode::Alter)
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create or alter.
    #[must_use]
    pub const fn mode(&self) -> BlueprintMode {
        self.mode
    }

    /// Column definitions in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Explicit index definitions in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[IndexDefinition] {
        &self.indexes
    }

    /// Foreign key definitions in declaration order.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKeyDefinition] {
        &self.foreign_keys
    }

    /// Recorded commands in declaration order.
    #[must_use]
    pub fn commands(&self) -> &[BlueprintCommand] {
        &self.commands
    }

    /// Whether CREATE TABLE uses IF NOT EXISTS.
    #[must_use]
    pub const fn is_if_not_exists(&self) -> bool {
        self.if_not_exists
    }

    /// Storage engine (MySQL).
    #[must_use]
    pub fn engine_option(&self) -> Option<&str> {
        self.engine.as_deref()
    }

    /// Default character set (MySQL).
    #[must_use]
    pub fn charset_option(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Default collation (MySQL).
    #[must_use]
    pub fn collation_option(&self) -> Option<&str> {
        self.collation.as_deref()
    }

    /// Creates the table only if it does not exist yet.
    pub fn if_not_exists(&mut self) -> &mut Self {
        self.if_not_exists = true;
        self
    }

    /// Sets the storage engine.
    pub fn engine(&mut self, engine: impl Into<String>) -> &mut Self {
        self.engine = Some(engine.into());
        self
    }

    /// Sets the default character set.
    pub fn charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the default collation.
    pub fn collation(&mut self, collation: impl Into<String>) -> &mut Self {
        self.collation = Some(collation.into());
        self
    }

    // ---------------------------------------------------------------------
    // Columns
    // ---------------------------------------------------------------------

    /// Adds a column of any type.
    pub fn column(&mut self, name: impl Into<String>, column_type: ColumnType) -> &mut ColumnDefinition {
        let position = self.columns.len();
        self.columns.push(ColumnDefinition::new(name, column_type));
        self.commands.push(BlueprintCommand::Column(position));
        &mut self.columns[position]
    }

    /// `id` auto-incrementing unsigned big integer primary key.
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.big_increments("id")
    }

    /// Auto-incrementing unsigned integer primary key.
    pub fn increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer).unsigned().auto_increment()
    }

    /// Auto-incrementing unsigned big integer primary key.
    pub fn big_increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::BigInteger).unsigned().auto_increment()
    }

    /// 8-bit integer column.
    pub fn tiny_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::TinyInteger)
    }

    /// 16-bit integer column.
    pub fn small_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::SmallInteger)
    }

    /// 24-bit integer column.
    pub fn medium_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::MediumInteger)
    }

    /// 32-bit integer column.
    pub fn integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer)
    }

    /// 64-bit integer column.
    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::BigInteger)
    }

    /// Unsigned 32-bit integer column.
    pub fn unsigned_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.integer(name).unsigned()
    }

    /// Unsigned 64-bit integer column.
    pub fn unsigned_big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.big_integer(name).unsigned()
    }

    /// Unsigned big integer meant to hold a foreign key.
    pub fn foreign_id(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.unsigned_big_integer(name)
    }

    /// Fixed-length string column.
    pub fn char(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Char(length))
    }

    /// Bounded string column.
    pub fn string(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::String(length))
    }

    /// Text column.
    pub fn text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Text)
    }

    /// Medium text column.
    pub fn medium_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::MediumText)
    }

    /// Long text column.
    pub fn long_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::LongText)
    }

    /// Exact decimal column.
    pub fn decimal(
        &mut self,
        name: impl Into<String>,
        precision: u8,
        scale: u8,
    ) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Decimal { precision, scale })
    }

    /// Single-precision float column.
    pub fn float(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Float)
    }

    /// Double-precision float column.
    pub fn double(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Double)
    }

    /// Boolean column.
    pub fn boolean(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Boolean)
    }

    /// Date column.
    pub fn date(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Date)
    }

    /// Time column.
    pub fn time(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Time)
    }

    /// Date-time column.
    pub fn date_time(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::DateTime)
    }

    /// Timestamp column.
    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Timestamp)
    }

    /// Timestamp with time zone column.
    pub fn timestamp_tz(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::TimestampTz)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Nullable `deleted_at` timestamp.
    pub fn soft_deletes(&mut self) -> &mut ColumnDefinition {
        self.timestamp("deleted_at").nullable()
    }

    /// JSON column.
    pub fn json(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Json)
    }

    /// Binary JSON column (PostgreSQL).
    pub fn jsonb(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Jsonb)
    }

    /// UUID column.
    pub fn uuid(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Uuid)
    }

    /// Binary column.
    pub fn binary(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Binary)
    }

    /// Column restricted to `values`.
    pub fn enumeration(&mut self, name: impl Into<String>, values: &[&str]) -> &mut ColumnDefinition {
        let values = values.iter().map(|v| (*v).to_string()).collect();
        self.column(name, ColumnType::Enum(values))
    }

    // ---------------------------------------------------------------------
    // Indexes and foreign keys
    // ---------------------------------------------------------------------

    fn add_index(&mut self, kind: IndexKind, columns: &[&str]) -> &mut IndexDefinition {
        let position = self.indexes.len();
        self.indexes.push(IndexDefinition::new(kind, columns));
        self.commands.push(BlueprintCommand::Index(position));
        &mut self.indexes[position]
    }

    /// Primary key over `columns`.
    pub fn primary(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Primary, columns)
    }

    /// Unique index over `columns`.
    pub fn unique(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Unique, columns)
    }

    /// Plain index over `columns`.
    pub fn index(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Index, columns)
    }

    /// Spatial index over `columns`.
    pub fn spatial_index(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Spatial, columns)
    }

    /// Full-text index over `columns`.
    pub fn fulltext(&mut self, columns: &[&str]) -> &mut IndexDefinition {
        self.add_index(IndexKind::Fulltext, columns)
    }

    /// Foreign key over `columns`; finish it with `references(..).on(..)`.
    pub fn foreign(&mut self, columns: &[&str]) -> &mut ForeignKeyDefinition {
        let position = self.foreign_keys.len();
        self.foreign_keys
            .push(ForeignKeyDefinition::new(self.table.clone(), columns));
        self.commands.push(BlueprintCommand::Foreign(position));
        &mut self.foreign_keys[position]
    }

    // ---------------------------------------------------------------------
    // Alterations
    // ---------------------------------------------------------------------

    /// Drops one column.
    pub fn drop_column(&mut self, name: impl Into<String>) {
        self.commands.push(BlueprintCommand::DropColumn(vec![name.into()]));
    }

    /// Drops several columns.
    pub fn drop_columns(&mut self, names: &[&str]) {
        let names = names.iter().map(|n| (*n).to_string()).collect();
        self.commands.push(BlueprintCommand::DropColumn(names));
    }

    /// Drops `created_at` and `updated_at`.
    pub fn drop_timestamps(&mut self) {
        self.drop_columns(&["created_at", "updated_at"]);
    }

    /// Renames a column.
    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.commands.push(BlueprintCommand::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Drops an index by name.
    pub fn drop_index(&mut self, name: impl Into<String>) {
        self.commands
            .push(BlueprintCommand::DropIndex(ConstraintRef::Named(name.into())));
    }

    /// Drops the plain index generated for `columns`.
    pub fn drop_index_on(&mut self, columns: &[&str]) {
        self.drop_generated_index(columns, IndexKind::Index);
    }

    /// Drops a unique index by name.
    pub fn drop_unique(&mut self, name: impl Into<String>) {
        self.drop_index(name);
    }

    /// Drops the unique index generated for `columns`.
    pub fn drop_unique_on(&mut self, columns: &[&str]) {
        self.drop_generated_index(columns, IndexKind::Unique);
    }

    /// Drops the spatial index generated for `columns`.
    pub fn drop_spatial_index_on(&mut self, columns: &[&str]) {
        self.drop_generated_index(columns, IndexKind::Spatial);
    }

    /// Drops the full-text index generated for `columns`.
    pub fn drop_fulltext_on(&mut self, columns: &[&str]) {
        self.drop_generated_index(columns, IndexKind::Fulltext);
    }

    fn drop_generated_index(&mut self, columns: &[&str], kind: IndexKind) {
        self.commands.push(BlueprintCommand::DropIndex(ConstraintRef::generated(
            columns,
            kind.suffix(),
        )));
    }

    /// Drops the primary key; `None` uses the engine's conventional name.
    pub fn drop_primary(&mut self, name: Option<&str>) {
        self.commands
            .push(BlueprintCommand::DropPrimary(name.map(str::to_string)));
    }

    /// Drops a foreign key by name.
    pub fn drop_foreign(&mut self, name: impl Into<String>) {
        self.commands
            .push(BlueprintCommand::DropForeign(ConstraintRef::Named(name.into())));
    }

    /// Drops the foreign key generated for `columns`.
    pub fn drop_foreign_on(&mut self, columns: &[&str]) {
        self.commands.push(BlueprintCommand::DropForeign(ConstraintRef::generated(
            columns, "foreign",
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_recorded_in_order() {
        let mut table = Blueprint::create("users");
        table.id();
        table.string("email", 255).unique();
        table.timestamps();

        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "created_at", "updated_at"]);
        assert_eq!(table.commands().len(), 4);
        assert!(table.columns()[0].is_inline_primary());
        assert!(table.columns()[2].nullable);
    }

    #[test]
    fn test_index_definitions_are_mutable_after_recording() {
        let mut table = Blueprint::create("posts");
        table.index(&["title"]).name("by_title").algorithm("btree");
        assert_eq!(table.indexes()[0].name.as_deref(), Some("by_title"));
        assert_eq!(table.commands(), &[BlueprintCommand::Index(0)]);
    }

    #[test]
    fn test_foreign_key_recorded_against_table() {
        let mut table = Blueprint::create("posts");
        table.foreign_id("user_id");
        table
            .foreign(&["user_id"])
            .references(&["id"])
            .on("users")
            .cascade_on_delete();
        let fk = &table.foreign_keys()[0];
        assert_eq!(fk.table, "posts");
        assert_eq!(fk.resolved_name(), "posts_user_id_foreign");
    }

    #[test]
    fn test_drop_helpers_generate_conventional_names() {
        let mut table = Blueprint::alter("users");
        table.drop_unique_on(&["email"]);
        table.drop_index_on(&["first_name", "last_name"]);
        table.drop_foreign_on(&["team_id"]);
        let names: Vec<String> = table
            .commands()
            .iter()
            .map(|c| match c {
                BlueprintCommand::DropIndex(r) | BlueprintCommand::DropForeign(r) => {
                    r.resolve("users")
                }
                other => panic!("unexpected command {other:?}"),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "users_email_unique",
                "users_first_name_last_name_index",
                "users_team_id_foreign",
            ]
        );
    }
}
