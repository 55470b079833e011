//! Blueprint to DDL compilation.

use tracing::debug;

use super::blueprint::{Blueprint, BlueprintCommand, BlueprintMode};
use super::column::{ColumnDefinition, ColumnType, IndexFlag};
use super::index::{ForeignKeyDefinition, IndexDefinition, IndexKind};
use super::operation::{SchemaOperation, SchemaPlan};
use super::snapshot::TableSnapshot;
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::ident;

/// Compiles blueprints and schema operations into ordered DDL statements.
///
/// Compilation is pure: the same blueprint, dialect and prefix always yield
/// the same statements. Statements come back in execution order, with
/// indexes and comments after the table they belong to.
///
/// On dialects that rebuild tables to change a column, the stored table
/// definition has to be supplied with [`SchemaCompiler::with_snapshot`].
#[derive(Clone, Copy)]
pub struct SchemaCompiler<'d> {
    dialect: &'d dyn Dialect,
    prefix: &'d str,
    snapshot: Option<&'d TableSnapshot>,
}

impl<'d> SchemaCompiler<'d> {
    /// Creates a compiler for `dialect` with no table prefix.
    #[must_use]
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            prefix: "",
            snapshot: None,
        }
    }

    /// Prepends `prefix` to every table name.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &'d str) -> Self {
        self.prefix = prefix;
        self
    }

    /// Stored definition of the table an alter blueprint changes columns of.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: Option<&'d TableSnapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// Active dialect.
    #[must_use]
    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Table name with the prefix applied.
    #[must_use]
    pub fn table_name(&self, table: &str) -> String {
        format!("{}{table}", self.prefix)
    }

    /// Compiles one blueprint.
    pub fn compile(&self, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
        validate_identifier(blueprint.table())?;
        let statements = match blueprint.mode() {
            BlueprintMode::Create => self.compile_create(blueprint)?,
            BlueprintMode::Alter => self.compile_alter(blueprint)?,
        };
        debug!(
            table = blueprint.table(),
            driver = %self.dialect.driver(),
            statements = statements.len(),
            "Compiled blueprint"
        );
        Ok(statements)
    }

    /// Compiles one schema operation.
    pub fn compile_operation(&self, operation: &SchemaOperation) -> Result<Vec<String>, CompileError> {
        let d = self.dialect;
        match operation {
            SchemaOperation::Table(blueprint) => self.compile(blueprint),
            SchemaOperation::Drop(table) => {
                validate_identifier(table)?;
                Ok(vec![d.drop_table(&self.table_name(table))])
            }
            SchemaOperation::DropIfExists(table) => {
                validate_identifier(table)?;
                Ok(vec![d.drop_table_if_exists(&self.table_name(table))])
            }
            SchemaOperation::Rename { from, to } => {
                validate_identifier(from)?;
                validate_identifier(to)?;
                Ok(vec![d.rename_table(&self.table_name(from), &self.table_name(to))])
            }
            SchemaOperation::Raw(sql) => Ok(vec![sql.clone()]),
        }
    }

    /// Compiles every operation of a plan, in order.
    pub fn compile_plan(&self, plan: &SchemaPlan) -> Result<Vec<String>, CompileError> {
        let mut statements = Vec::new();
        for operation in plan.operations() {
            statements.extend(self.compile_operation(operation)?);
        }
        Ok(statements)
    }

    fn compile_create(&self, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
        let d = self.dialect;
        let table = self.table_name(blueprint.table());
        if blueprint.columns().is_empty() {
            return Err(invalid_blueprint(&table, "a new table needs at least one column"));
        }

        let mut body = Vec::new();
        let mut constraints = Vec::new();
        let mut trailing = Vec::new();
        let mut inline_primaries = 0usize;
        let mut fluent_primary: Vec<(&ColumnDefinition, &IndexFlag)> = Vec::new();
        let mut explicit_primary: Vec<&IndexDefinition> = Vec::new();

        for command in blueprint.commands() {
            match command {
                BlueprintCommand::Column(position) => {
                    let column = &blueprint.columns()[*position];
                    validate_column(column)?;
                    if column.change {
                        return Err(invalid_blueprint(
                            &table,
                            format!("column '{}' is marked change() on a new table", column.name),
                        ));
                    }
                    if column.is_inline_primary() {
                        inline_primaries += 1;
                    }
                    body.push(d.column_definition(column)?);
                    self.note_advisory(&table, column);
                    if let Some(ref flag) = column.primary {
                        fluent_primary.push((column, flag));
                    }
                    trailing.extend(self.fluent_indexes(&table, column)?);
                    trailing.extend(self.comment_statement(&table, column));
                }
                BlueprintCommand::Index(position) => {
                    let index = &blueprint.indexes()[*position];
                    validate_index(&table, index)?;
                    if index.kind == IndexKind::Primary {
                        explicit_primary.push(index);
                    } else {
                        trailing.push(d.create_index(&table, index)?);
                    }
                }
                BlueprintCommand::Foreign(position) => {
                    let fk = self.prefixed_foreign(&blueprint.foreign_keys()[*position]);
                    validate_foreign(&fk)?;
                    constraints.push(d.foreign_key_clause(&fk));
                }
                other => {
                    return Err(invalid_blueprint(
                        &table,
                        format!("{} only applies to existing tables", describe(other)),
                    ));
                }
            }
        }

        let primary_sources =
            inline_primaries + usize::from(!fluent_primary.is_empty()) + explicit_primary.len();
        if primary_sources > 1 {
            return Err(invalid_blueprint(&table, "more than one primary key declared"));
        }
        if let Some(index) = explicit_primary.first() {
            body.push(d.primary_constraint(&table, index));
        } else if !fluent_primary.is_empty() {
            let columns: Vec<&str> = fluent_primary.iter().map(|(c, _)| c.name.as_str()).collect();
            let mut index = IndexDefinition::new(IndexKind::Primary, &columns);
            index.name = fluent_primary.iter().find_map(|(_, flag)| flag.name());
            body.push(d.primary_constraint(&table, &index));
        }
        body.extend(constraints);

        let mut create = d.create_table(&table, blueprint.is_if_not_exists(), &body);
        let (engine, charset, collation) = (
            blueprint.engine_option(),
            blueprint.charset_option(),
            blueprint.collation_option(),
        );
        if engine.is_some() || charset.is_some() || collation.is_some() {
            match d.table_options(engine, charset, collation) {
                Some(options) => create.push_str(&options),
                None => debug!(
                    table = %table,
                    driver = %d.driver(),
                    "Ignoring table options"
                ),
            }
        }

        let mut statements = vec![create];
        statements.extend(trailing);
        Ok(statements)
    }

    fn compile_alter(&self, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
        let d = self.dialect;
        let table = self.table_name(blueprint.table());
        let mut statements = Vec::new();
        let mut rebuilt = false;

        for command in blueprint.commands() {
            match command {
                BlueprintCommand::Column(position) => {
                    let column = &blueprint.columns()[*position];
                    validate_column(column)?;
                    if column.change && d.rebuilds_tables() {
                        if !rebuilt {
                            statements.extend(self.rebuild(&table, blueprint)?);
                            rebuilt = true;
                        }
                    } else if column.change {
                        statements.extend(d.modify_column(&table, column)?);
                    } else {
                        statements.push(d.add_column(&table, column)?);
                    }
                    self.note_advisory(&table, column);
                    if let Some(ref flag) = column.primary {
                        let mut index = IndexDefinition::new(IndexKind::Primary, &[&column.name]);
                        index.name = flag.name();
                        statements.push(d.add_primary(&table, &index)?);
                    }
                    statements.extend(self.fluent_indexes(&table, column)?);
                    statements.extend(self.comment_statement(&table, column));
                }
                BlueprintCommand::Index(position) => {
                    let index = &blueprint.indexes()[*position];
                    validate_index(&table, index)?;
                    statements.push(d.create_index(&table, index)?);
                }
                BlueprintCommand::Foreign(position) => {
                    let fk = self.prefixed_foreign(&blueprint.foreign_keys()[*position]);
                    validate_foreign(&fk)?;
                    statements.push(d.add_foreign(&table, &fk)?);
                }
                BlueprintCommand::DropColumn(columns) => {
                    for column in columns {
                        validate_identifier(column)?;
                        statements.push(d.drop_column(&table, column));
                    }
                }
                BlueprintCommand::RenameColumn { from, to } => {
                    validate_identifier(from)?;
                    validate_identifier(to)?;
                    statements.push(d.rename_column(&table, from, to));
                }
                BlueprintCommand::DropIndex(target) => {
                    statements.push(d.drop_index(&table, &target.resolve(&table)));
                }
                BlueprintCommand::DropPrimary(name) => {
                    statements.push(d.drop_primary(&table, name.as_deref())?);
                }
                BlueprintCommand::DropForeign(target) => {
                    statements.push(d.drop_foreign(&table, &target.resolve(&table))?);
                }
            }
        }

        if statements.is_empty() {
            debug!(table = %table, "Alter blueprint recorded no commands");
        }
        Ok(statements)
    }

    /// One rebuild covering every changed column of `blueprint`.
    ///
    /// The snapshot describes the table before the blueprint runs, so the
    /// changes have to come ahead of every other command.
    fn rebuild(&self, table: &str, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
        let columns = blueprint.columns();
        let is_change = |command: &BlueprintCommand| {
            matches!(command, BlueprintCommand::Column(position) if columns[*position].change)
        };
        let commands = blueprint.commands();
        let leading = commands.iter().take_while(|c| is_change(*c)).count();
        if commands[leading..].iter().any(is_change) {
            return Err(invalid_blueprint(
                table,
                format!(
                    "column changes must come before other commands on the {} dialect",
                    self.dialect.driver()
                ),
            ));
        }

        let mut changes = Vec::with_capacity(leading);
        for command in &commands[..leading] {
            if let BlueprintCommand::Column(position) = command {
                validate_column(&columns[*position])?;
                changes.push(&columns[*position]);
            }
        }
        let snapshot = self
            .snapshot
            .filter(|s| s.table() == table)
            .ok_or_else(|| {
                invalid_blueprint(table, "changing columns needs the stored table definition")
            })?;
        self.dialect.rebuild_table(snapshot, &changes)
    }

    /// Unique and plain indexes flagged directly on a column.
    fn fluent_indexes(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError> {
        let mut statements = Vec::new();
        for (flag, kind) in [
            (&column.unique, IndexKind::Unique),
            (&column.index, IndexKind::Index),
        ] {
            if let Some(flag) = flag {
                let mut index = IndexDefinition::new(kind, &[&column.name]);
                index.name = flag.name();
                statements.push(self.dialect.create_index(table, &index)?);
            }
        }
        Ok(statements)
    }

    fn comment_statement(&self, table: &str, column: &ColumnDefinition) -> Option<String> {
        let comment = column.comment.as_deref()?;
        if self.dialect.inline_comment(comment).is_some() {
            return None;
        }
        let statement = self.dialect.comment_statement(table, &column.name, comment);
        if statement.is_none() {
            debug!(
                table = %table,
                column = %column.name,
                driver = %self.dialect.driver(),
                "Ignoring column comment"
            );
        }
        statement
    }

    fn note_advisory(&self, table: &str, column: &ColumnDefinition) {
        if column.after.is_some() && !self.dialect.supports_column_placement() {
            debug!(
                table = %table,
                column = %column.name,
                driver = %self.dialect.driver(),
                "Ignoring column placement"
            );
        }
    }

    fn prefixed_foreign(&self, fk: &ForeignKeyDefinition) -> ForeignKeyDefinition {
        let mut fk = fk.clone();
        fk.table = self.table_name(&fk.table);
        if !fk.references_table.is_empty() {
            fk.references_table = self.table_name(&fk.references_table);
        }
        fk
    }
}

fn describe(command: &BlueprintCommand) -> &'static str {
    match command {
        BlueprintCommand::Column(_) => "adding a column",
        BlueprintCommand::Index(_) => "adding an index",
        BlueprintCommand::Foreign(_) => "adding a foreign key",
        BlueprintCommand::DropColumn(_) => "drop_column",
        BlueprintCommand::RenameColumn { .. } => "rename_column",
        BlueprintCommand::DropIndex(_) => "drop_index",
        BlueprintCommand::DropPrimary(_) => "drop_primary",
        BlueprintCommand::DropForeign(_) => "drop_foreign",
    }
}

fn invalid_blueprint(table: &str, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidBlueprint {
        table: table.to_string(),
        reason: reason.into(),
    }
}

fn validate_identifier(name: &str) -> Result<(), CompileError> {
    if name == "*" || !ident::is_identifier(name) {
        return Err(CompileError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Checks a column definition against its own invariants.
fn validate_column(column: &ColumnDefinition) -> Result<(), CompileError> {
    validate_identifier(&column.name)?;
    let invalid = |reason: &str| CompileError::InvalidColumn {
        column: column.name.clone(),
        reason: reason.to_string(),
    };
    match column.column_type {
        ColumnType::Char(0) | ColumnType::String(0) => {
            return Err(invalid("string length must be positive"));
        }
        ColumnType::Decimal { precision, scale } if precision == 0 || scale > precision => {
            return Err(invalid("decimal scale must not exceed a positive precision"));
        }
        ColumnType::Enum(ref values) if values.is_empty() => {
            return Err(invalid("enum needs at least one allowed value"));
        }
        _ => {}
    }
    if column.auto_increment && !column.column_type.is_integer() {
        return Err(invalid("auto-increment requires an integer type"));
    }
    if column.auto_increment && column.default.is_some() {
        return Err(invalid("auto-increment columns cannot have a default"));
    }
    if column.auto_increment && column.nullable {
        return Err(invalid("auto-increment columns cannot be nullable"));
    }
    if column.unsigned && !column.column_type.is_numeric() {
        return Err(invalid("unsigned requires a numeric type"));
    }
    if let Some(ref after) = column.after {
        validate_identifier(after)?;
    }
    Ok(())
}

fn validate_index(table: &str, index: &IndexDefinition) -> Result<(), CompileError> {
    if index.columns.is_empty() {
        return Err(CompileError::InvalidConstraint {
            table: table.to_string(),
            reason: format!("{} needs at least one column", index.kind.suffix()),
        });
    }
    index.columns.iter().try_for_each(|c| validate_identifier(c))
}

fn validate_foreign(fk: &ForeignKeyDefinition) -> Result<(), CompileError> {
    let invalid = |reason: &str| CompileError::InvalidConstraint {
        table: fk.table.clone(),
        reason: reason.to_string(),
    };
    if fk.columns.is_empty() {
        return Err(invalid("foreign key needs at least one column"));
    }
    if fk.references_table.is_empty() {
        return Err(invalid("foreign key needs a referenced table"));
    }
    if fk.references_columns.len() != fk.columns.len() {
        return Err(invalid(
            "foreign key must reference as many columns as it constrains",
        ));
    }
    validate_identifier(&fk.references_table)?;
    fk.columns
        .iter()
        .chain(&fk.references_columns)
        .try_for_each(|c| validate_identifier(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Driver;

    fn compile(driver: Driver, blueprint: &Blueprint) -> Result<Vec<String>, CompileError> {
        SchemaCompiler::new(driver.dialect()).compile(blueprint)
    }

    #[test]
    fn test_create_table_with_fluent_unique() {
        let mut table = Blueprint::create("users");
        table.id();
        table.string("email", 255).unique();
        table.integer("age").nullable();

        let sql = compile(Driver::Sqlite, &table).unwrap();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT \
                 CHECK (\"id\" >= 0), \"email\" TEXT NOT NULL, \"age\" INTEGER NULL)"
                    .to_string(),
                "CREATE UNIQUE INDEX \"users_email_unique\" ON \"users\" (\"email\")".to_string(),
            ]
        );
    }

    #[test]
    fn test_composite_primary_and_foreign_key_are_table_constraints() {
        let mut table = Blueprint::create("role_user");
        table.foreign_id("role_id");
        table.foreign_id("user_id");
        table.primary(&["role_id", "user_id"]);
        table
            .foreign(&["user_id"])
            .references(&["id"])
            .on("users")
            .cascade_on_delete();

        let sql = compile(Driver::Postgres, &table).unwrap();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].contains("PRIMARY KEY (\"role_id\", \"user_id\")"));
        assert!(sql[0].contains(
            "CONSTRAINT \"role_user_user_id_foreign\" FOREIGN KEY (\"user_id\") \
             REFERENCES \"users\" (\"id\") ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_two_primary_keys_rejected() {
        let mut table = Blueprint::create("t");
        table.id();
        table.string("code", 10).primary();
        assert!(matches!(
            compile(Driver::MySql, &table),
            Err(CompileError::InvalidBlueprint { .. })
        ));
    }

    #[test]
    fn test_drop_commands_rejected_on_create() {
        let mut table = Blueprint::create("t");
        table.id();
        table.drop_column("legacy");
        assert!(matches!(
            compile(Driver::Sqlite, &table),
            Err(CompileError::InvalidBlueprint { .. })
        ));
    }

    #[test]
    fn test_column_invariants() {
        let mut table = Blueprint::create("t");
        table.string("name", 0);
        assert!(matches!(
            compile(Driver::Postgres, &table),
            Err(CompileError::InvalidColumn { .. })
        ));

        let mut table = Blueprint::create("t");
        table.text("body").auto_increment();
        assert!(matches!(
            compile(Driver::Postgres, &table),
            Err(CompileError::InvalidColumn { .. })
        ));

        let mut table = Blueprint::create("t");
        table.decimal("price", 4, 6);
        assert!(compile(Driver::MySql, &table).is_err());
    }

    #[test]
    fn test_alter_statements_in_declaration_order() {
        let mut table = Blueprint::alter("users");
        table.string("nick", 32).nullable().index();
        table.rename_column("name", "full_name");
        table.drop_column("legacy");
        table.drop_unique_on(&["email"]);

        let sql = compile(Driver::Postgres, &table).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"nick\" VARCHAR(32) NULL".to_string(),
                "CREATE INDEX \"users_nick_index\" ON \"users\" (\"nick\")".to_string(),
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\"".to_string(),
                "ALTER TABLE \"users\" DROP COLUMN \"legacy\"".to_string(),
                "DROP INDEX \"users_email_unique\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_prefix_applies_to_tables_and_generated_names() {
        let mut table = Blueprint::create("posts");
        table.id();
        table.foreign_id("user_id");
        table.foreign(&["user_id"]).references(&["id"]).on("users");
        table.index(&["user_id"]);

        let sql = SchemaCompiler::new(Driver::Sqlite.dialect())
            .with_prefix("app_")
            .compile(&table)
            .unwrap();
        assert!(sql[0].starts_with("CREATE TABLE \"app_posts\""));
        assert!(sql[0].contains("REFERENCES \"app_users\""));
        assert!(sql[0].contains("\"app_posts_user_id_foreign\""));
        assert_eq!(
            sql[1],
            "CREATE INDEX \"app_posts_user_id_index\" ON \"app_posts\" (\"user_id\")"
        );
    }

    #[test]
    fn test_comments_follow_dialect() {
        let mut table = Blueprint::create("users");
        table.string("nick", 20).comment("shown publicly");

        let pg = compile(Driver::Postgres, &table).unwrap();
        assert_eq!(
            pg[1],
            "COMMENT ON COLUMN \"users\".\"nick\" IS 'shown publicly'"
        );

        let mysql = compile(Driver::MySql, &table).unwrap();
        assert_eq!(mysql.len(), 1);
        assert!(mysql[0].contains("COMMENT 'shown publicly'"));

        let sqlite = compile(Driver::Sqlite, &table).unwrap();
        assert_eq!(sqlite.len(), 1);
    }

    #[test]
    fn test_mysql_table_options() {
        let mut table = Blueprint::create("logs");
        table.id();
        table.engine("InnoDB").charset("utf8mb4");
        let sql = compile(Driver::MySql, &table).unwrap();
        assert!(sql[0].ends_with(") ENGINE = InnoDB DEFAULT CHARACTER SET utf8mb4"));

        let sql = compile(Driver::Sqlite, &table).unwrap();
        assert!(sql[0].ends_with(')'));
    }

    #[test]
    fn test_unsupported_feature_names_dialect() {
        let mut table = Blueprint::create("docs");
        table.id();
        table.text("body");
        table.fulltext(&["body"]);
        let err = compile(Driver::Sqlite, &table).unwrap_err();
        assert_eq!(
            err.to_string(),
            "full-text indexes is not supported by the sqlite dialect"
        );
    }

    #[test]
    fn test_operations() {
        let compiler = SchemaCompiler::new(Driver::MySql.dialect());
        assert_eq!(
            compiler
                .compile_operation(&SchemaOperation::DropIfExists("flights".into()))
                .unwrap(),
            vec!["DROP TABLE IF EXISTS `flights`".to_string()]
        );
        assert_eq!(
            compiler
                .compile_operation(&SchemaOperation::Rename {
                    from: "a".into(),
                    to: "b".into()
                })
                .unwrap(),
            vec!["RENAME TABLE `a` TO `b`".to_string()]
        );
        assert!(compiler
            .compile_operation(&SchemaOperation::Drop("users; --".into()))
            .is_err());
    }
}
