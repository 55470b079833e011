//! SQLite dialect.

use super::{unsupported, Dialect, Driver};
use crate::error::CompileError;
use crate::schema::{
    ColumnDefinition, ColumnType, ForeignKeyDefinition, IndexDefinition, TableSnapshot,
};
use crate::value::SqlValue;

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Savepoint wrapping a table rebuild.
const REBUILD_SAVEPOINT: &str = "quarry_rebuild";

/// Name of the copy built while `table` is rebuilt.
fn rebuild_copy(table: &str) -> String {
    format!("__quarry_tmp_{table}")
}

impl SqliteDialect {
    /// Expression reading the old value of `column` into its new type.
    fn copy_expression(
        &self,
        stored: &str,
        column: &ColumnDefinition,
    ) -> Result<String, CompileError> {
        let cast = format!(
            "CAST({} AS {})",
            self.quote_segment(stored),
            self.type_name(column)?
        );
        Ok(match column.default {
            Some(ref default) if !column.nullable => {
                format!("COALESCE({cast}, {})", self.render_default(default))
            }
            _ => cast,
        })
    }
}

impl Dialect for SqliteDialect {
    fn driver(&self) -> Driver {
        Driver::Sqlite
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(n), Some(m)) => format!(" LIMIT {n} OFFSET {m}"),
            (Some(n), None) => format!(" LIMIT {n}"),
            // OFFSET is only valid after a LIMIT
            (None, Some(m)) => format!(" LIMIT -1 OFFSET {m}"),
            (None, None) => String::new(),
        }
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        // Type affinity: everything collapses onto five storage classes
        let name = match column.column_type {
            ColumnType::TinyInteger
            | ColumnType::SmallInteger
            | ColumnType::MediumInteger
            | ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::Boolean => "INTEGER",
            ColumnType::Decimal { .. } => "NUMERIC",
            ColumnType::Float | ColumnType::Double => "REAL",
            ColumnType::Char(_)
            | ColumnType::String(_)
            | ColumnType::Text
            | ColumnType::MediumText
            | ColumnType::LongText
            | ColumnType::Date
            | ColumnType::Time
            | ColumnType::DateTime
            | ColumnType::Timestamp
            | ColumnType::TimestampTz
            | ColumnType::Json
            | ColumnType::Uuid
            | ColumnType::Enum(_) => "TEXT",
            ColumnType::Binary => "BLOB",
            ColumnType::Jsonb => return Err(unsupported(Driver::Sqlite, "jsonb columns")),
        };
        Ok(name.to_string())
    }

    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        // AUTOINCREMENT only exists on the rowid alias
        if column.is_inline_primary() {
            Ok(" PRIMARY KEY AUTOINCREMENT".to_string())
        } else {
            Err(unsupported(
                Driver::Sqlite,
                format!("auto-increment on non-primary column '{}'", column.name),
            ))
        }
    }

    fn primary_constraint(&self, _table: &str, index: &IndexDefinition) -> String {
        match index.name {
            Some(ref name) => format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_identifier(name),
                self.column_list(&index.columns)
            ),
            None => format!("PRIMARY KEY ({})", self.column_list(&index.columns)),
        }
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String, CompileError> {
        if column.auto_increment || column.primary.is_some() {
            return Err(unsupported(
                Driver::Sqlite,
                format!("adding primary key column '{}' to an existing table", column.name),
            ));
        }
        if !column.nullable && column.default.is_none() {
            return Err(unsupported(
                Driver::Sqlite,
                format!("adding NOT NULL column '{}' without a default", column.name),
            ));
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)?
        ))
    }

    fn modify_column(
        &self,
        _table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError> {
        Err(unsupported(
            Driver::Sqlite,
            format!("changing '{}' outside a table rebuild", column.name),
        ))
    }

    fn rebuilds_tables(&self) -> bool {
        true
    }

    fn table_definition(&self, table: &str) -> Option<(String, Vec<SqlValue>)> {
        Some((
            "SELECT type, sql FROM sqlite_master WHERE tbl_name = ? AND sql IS NOT NULL \
             ORDER BY rowid"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        ))
    }

    fn rebuild_table(
        &self,
        snapshot: &TableSnapshot,
        changes: &[&ColumnDefinition],
    ) -> Result<Vec<String>, CompileError> {
        let table = snapshot.table();
        for column in changes {
            if column.auto_increment {
                return Err(unsupported(
                    Driver::Sqlite,
                    format!("changing '{}' into an auto-increment column", column.name),
                ));
            }
            let Some(item) = snapshot.column(&column.name) else {
                return Err(CompileError::InvalidBlueprint {
                    table: table.to_string(),
                    reason: format!("column '{}' does not exist", column.name),
                });
            };
            if item.is_generated() || item.is_inline_primary() {
                return Err(unsupported(
                    Driver::Sqlite,
                    format!("changing generated or primary key column '{}'", column.name),
                ));
            }
        }

        let mut body = Vec::with_capacity(snapshot.items().len());
        let mut targets = Vec::new();
        let mut sources = Vec::new();
        for item in snapshot.items() {
            let Some(name) = item.column_name() else {
                body.push(item.sql().to_string());
                continue;
            };
            match changes.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
                Some(column) => {
                    let mut definition = self.column_definition(column)?;
                    if let Some(references) = item.references_clause() {
                        definition.push(' ');
                        definition.push_str(references);
                    }
                    body.push(definition);
                    targets.push(self.quote_identifier(&column.name));
                    sources.push(self.copy_expression(name, column)?);
                }
                None => {
                    body.push(item.sql().to_string());
                    if !item.is_generated() {
                        targets.push(self.quote_segment(name));
                        sources.push(self.quote_segment(name));
                    }
                }
            }
        }

        let copy = rebuild_copy(table);
        let mut create = self.create_table(&copy, false, &body);
        if !snapshot.options().is_empty() {
            create.push(' ');
            create.push_str(snapshot.options());
        }

        let mut statements = Vec::new();
        statements.extend(self.disable_foreign_keys());
        statements.push(format!("SAVEPOINT {REBUILD_SAVEPOINT}"));
        statements.push(self.drop_table_if_exists(&copy));
        statements.push(create);
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.quote_identifier(&copy),
            targets.join(", "),
            sources.join(", "),
            self.quote_identifier(table)
        ));
        statements.push(self.drop_table(table));
        statements.push(self.rename_table(&copy, table));
        statements.extend(snapshot.dependents().iter().cloned());
        statements.push(format!("RELEASE {REBUILD_SAVEPOINT}"));
        statements.extend(self.enable_foreign_keys());
        Ok(statements)
    }

    fn abandon_rebuild(&self) -> Vec<String> {
        let mut statements = vec![
            format!("ROLLBACK TO {REBUILD_SAVEPOINT}"),
            format!("RELEASE {REBUILD_SAVEPOINT}"),
        ];
        statements.extend(self.enable_foreign_keys());
        statements
    }

    fn add_primary(&self, _table: &str, _index: &IndexDefinition) -> Result<String, CompileError> {
        Err(unsupported(
            Driver::Sqlite,
            "adding a primary key to an existing table",
        ))
    }

    fn drop_primary(&self, _table: &str, _name: Option<&str>) -> Result<String, CompileError> {
        Err(unsupported(Driver::Sqlite, "dropping a primary key"))
    }

    fn add_foreign(&self, _table: &str, _fk: &ForeignKeyDefinition) -> Result<String, CompileError> {
        Err(unsupported(
            Driver::Sqlite,
            "adding a foreign key to an existing table",
        ))
    }

    fn drop_foreign(&self, _table: &str, _name: &str) -> Result<String, CompileError> {
        Err(unsupported(Driver::Sqlite, "dropping a foreign key"))
    }

    fn has_table(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM sqlite_master WHERE type = 'table' AND name = ?"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM pragma_table_info(?) WHERE name = ?".to_string(),
            vec![
                SqlValue::Text(table.to_string()),
                SqlValue::Text(column.to_string()),
            ],
        )
    }

    fn list_tables(&self) -> String {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
            .to_string()
    }

    fn disable_foreign_keys(&self) -> Option<String> {
        Some("PRAGMA foreign_keys = OFF".to_string())
    }

    fn enable_foreign_keys(&self) -> Option<String> {
        Some("PRAGMA foreign_keys = ON".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::IndexKind;

    fn column(name: &str, ty: ColumnType) -> ColumnDefinition {
        ColumnDefinition::new(name, ty)
    }

    #[test]
    fn test_sqlite_data_types() {
        let d = SqliteDialect::new();
        assert_eq!(d.type_name(&column("a", ColumnType::BigInteger)).unwrap(), "INTEGER");
        assert_eq!(d.type_name(&column("a", ColumnType::String(255))).unwrap(), "TEXT");
        assert_eq!(d.type_name(&column("a", ColumnType::Boolean)).unwrap(), "INTEGER");
        assert_eq!(d.type_name(&column("a", ColumnType::Binary)).unwrap(), "BLOB");
        assert_eq!(
            d.type_name(&column("a", ColumnType::Decimal { precision: 8, scale: 2 }))
                .unwrap(),
            "NUMERIC"
        );
        assert!(matches!(
            d.type_name(&column("a", ColumnType::Jsonb)),
            Err(CompileError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_auto_increment_requires_primary() {
        let d = SqliteDialect::new();
        let mut id = column("id", ColumnType::BigInteger);
        id.auto_increment();
        assert_eq!(
            d.column_definition(&id).unwrap(),
            "\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT"
        );
        id.without_primary();
        assert!(d.column_definition(&id).is_err());
    }

    #[test]
    fn test_unsigned_and_enum_become_checks() {
        let d = SqliteDialect::new();
        let mut age = column("age", ColumnType::Integer);
        age.unsigned();
        assert_eq!(
            d.column_definition(&age).unwrap(),
            "\"age\" INTEGER NOT NULL CHECK (\"age\" >= 0)"
        );

        let status = column(
            "status",
            ColumnType::Enum(vec!["draft".into(), "live".into()]),
        );
        assert_eq!(
            d.column_definition(&status).unwrap(),
            "\"status\" TEXT NOT NULL CHECK (\"status\" IN ('draft', 'live'))"
        );
    }

    fn snapshot() -> TableSnapshot {
        TableSnapshot::parse(
            "items",
            "CREATE TABLE \"items\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
             \"sku\" TEXT NOT NULL, \"price\" INTEGER NULL, \
             \"total\" INTEGER GENERATED ALWAYS AS (\"price\" * 2), \
             CONSTRAINT \"items_sku_check\" CHECK (\"sku\" <> ''))",
            vec!["CREATE UNIQUE INDEX \"items_sku_unique\" ON \"items\" (\"sku\")".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_change_rebuilds_the_table() {
        let d = SqliteDialect::new();
        let mut price = column("price", ColumnType::Double);
        price.default(0);
        let sql = d.rebuild_table(&snapshot(), &[&price]).unwrap();
        assert_eq!(
            sql,
            vec![
                "PRAGMA foreign_keys = OFF".to_string(),
                "SAVEPOINT quarry_rebuild".to_string(),
                "DROP TABLE IF EXISTS \"__quarry_tmp_items\"".to_string(),
                "CREATE TABLE \"__quarry_tmp_items\" (\"id\" INTEGER NOT NULL PRIMARY KEY \
                 AUTOINCREMENT, \"sku\" TEXT NOT NULL, \"price\" REAL NOT NULL DEFAULT 0, \
                 \"total\" INTEGER GENERATED ALWAYS AS (\"price\" * 2), \
                 CONSTRAINT \"items_sku_check\" CHECK (\"sku\" <> ''))"
                    .to_string(),
                "INSERT INTO \"__quarry_tmp_items\" (\"id\", \"sku\", \"price\") \
                 SELECT \"id\", \"sku\", COALESCE(CAST(\"price\" AS REAL), 0) FROM \"items\""
                    .to_string(),
                "DROP TABLE \"items\"".to_string(),
                "ALTER TABLE \"__quarry_tmp_items\" RENAME TO \"items\"".to_string(),
                "CREATE UNIQUE INDEX \"items_sku_unique\" ON \"items\" (\"sku\")".to_string(),
                "RELEASE quarry_rebuild".to_string(),
                "PRAGMA foreign_keys = ON".to_string(),
            ]
        );
    }

    #[test]
    fn test_rebuild_keeps_unsigned_check_and_references() {
        let d = SqliteDialect::new();
        let snapshot = TableSnapshot::parse(
            "books",
            "CREATE TABLE books (id INTEGER PRIMARY KEY, author INTEGER REFERENCES authors (id))",
            Vec::new(),
        )
        .unwrap();
        let mut author = column("author", ColumnType::BigInteger);
        author.nullable().unsigned();
        let sql = d.rebuild_table(&snapshot, &[&author]).unwrap();
        assert!(sql[3].contains(
            "\"author\" INTEGER NULL CHECK (\"author\" >= 0) REFERENCES authors (id)"
        ));
        assert!(sql[4].ends_with("SELECT \"id\", CAST(\"author\" AS INTEGER) FROM \"books\""));
    }

    #[test]
    fn test_rebuild_rejects_unknown_and_key_columns() {
        let d = SqliteDialect::new();
        let ghost = column("ghost", ColumnType::Text);
        assert!(matches!(
            d.rebuild_table(&snapshot(), &[&ghost]),
            Err(CompileError::InvalidBlueprint { .. })
        ));
        let id = column("id", ColumnType::BigInteger);
        assert!(d.rebuild_table(&snapshot(), &[&id]).is_err());
        let total = column("total", ColumnType::BigInteger);
        assert!(d.rebuild_table(&snapshot(), &[&total]).is_err());
        assert!(d.modify_column("items", &id).is_err());
    }

    #[test]
    fn test_abandoned_rebuild_returns_to_savepoint() {
        assert_eq!(
            SqliteDialect::new().abandon_rebuild(),
            [
                "ROLLBACK TO quarry_rebuild",
                "RELEASE quarry_rebuild",
                "PRAGMA foreign_keys = ON",
            ]
        );
    }

    #[test]
    fn test_constraint_changes_are_rejected() {
        let d = SqliteDialect::new();
        assert!(d.drop_primary("t", None).is_err());
        assert!(d.drop_foreign("t", "t_a_foreign").is_err());
        let spatial = IndexDefinition::new(IndexKind::Spatial, &["geo"]);
        assert!(d.create_index("t", &spatial).is_err());
    }

    #[test]
    fn test_offset_without_limit() {
        let d = SqliteDialect::new();
        assert_eq!(d.limit_offset(None, Some(10)), " LIMIT -1 OFFSET 10");
        assert_eq!(d.limit_offset(Some(5), None), " LIMIT 5");
    }
}
