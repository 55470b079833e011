//! MySQL / MariaDB dialect.

use super::{unsupported, Dialect, Driver};
use crate::error::CompileError;
use crate::schema::{ColumnDefinition, ColumnType, IndexDefinition, IndexKind};
use crate::value::SqlValue;

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for MySqlDialect {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('`', '`')
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(n), Some(m)) => format!(" LIMIT {n} OFFSET {m}"),
            (Some(n), None) => format!(" LIMIT {n}"),
            (None, Some(m)) => format!(" LIMIT {} OFFSET {m}", u64::MAX),
            (None, None) => String::new(),
        }
    }

    fn native_unsigned(&self) -> bool {
        true
    }

    fn native_enum(&self) -> bool {
        true
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        let mut name = match column.column_type {
            ColumnType::TinyInteger => "TINYINT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::MediumInteger => "MEDIUMINT".to_string(),
            ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::String(n) => format!("VARCHAR({n})"),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::MediumText => "MEDIUMTEXT".to_string(),
            ColumnType::LongText => "LONGTEXT".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Double => "DOUBLE".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime => "DATETIME".to_string(),
            // TIMESTAMP is stored as UTC and converted on read
            ColumnType::Timestamp | ColumnType::TimestampTz => "TIMESTAMP".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => return Err(unsupported(Driver::MySql, "jsonb columns")),
            ColumnType::Uuid => "CHAR(36)".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
            ColumnType::Enum(ref values) => {
                let allowed: Vec<String> = values.iter().map(|v| self.quote_string(v)).collect();
                format!("ENUM({})", allowed.join(", "))
            }
        };
        if column.unsigned && column.column_type.is_numeric() {
            name.push_str(" UNSIGNED");
        }
        Ok(name)
    }

    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        Ok(if column.is_inline_primary() {
            " AUTO_INCREMENT PRIMARY KEY".to_string()
        } else {
            " AUTO_INCREMENT".to_string()
        })
    }

    fn inline_comment(&self, comment: &str) -> Option<String> {
        Some(format!(" COMMENT {}", self.quote_string(comment)))
    }

    fn supports_column_placement(&self) -> bool {
        true
    }

    fn table_options(
        &self,
        engine: Option<&str>,
        charset: Option<&str>,
        collation: Option<&str>,
    ) -> Option<String> {
        let mut options = String::new();
        if let Some(engine) = engine {
            options.push_str(&format!(" ENGINE = {engine}"));
        }
        if let Some(charset) = charset {
            options.push_str(&format!(" DEFAULT CHARACTER SET {charset}"));
        }
        if let Some(collation) = collation {
            options.push_str(&format!(" COLLATE {collation}"));
        }
        Some(options)
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        )
    }

    fn modify_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError> {
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)?
        )])
    }

    fn primary_constraint(&self, _table: &str, index: &IndexDefinition) -> String {
        // Primary keys are always named PRIMARY
        format!("PRIMARY KEY ({})", self.column_list(&index.columns))
    }

    fn drop_primary(&self, table: &str, _name: Option<&str>) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} DROP PRIMARY KEY",
            self.quote_identifier(table)
        ))
    }

    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<String, CompileError> {
        let keyword = match index.kind {
            IndexKind::Primary => return self.add_primary(table, index),
            IndexKind::Index => "INDEX",
            IndexKind::Unique => "UNIQUE INDEX",
            IndexKind::Spatial => "SPATIAL INDEX",
            IndexKind::Fulltext => "FULLTEXT INDEX",
        };
        let using = index
            .algorithm
            .as_deref()
            .map(|a| format!(" USING {}", a.to_uppercase()))
            .unwrap_or_default();
        Ok(format!(
            "CREATE {keyword} {} ON {} ({}){using}",
            self.quote_identifier(&index.resolved_name(table)),
            self.quote_identifier(table),
            self.column_list(&index.columns)
        ))
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(name),
            self.quote_identifier(table)
        )
    }

    fn drop_foreign(&self, table: &str, name: &str) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    fn has_table(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ? AND table_type = 'BASE TABLE'"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?"
                .to_string(),
            vec![
                SqlValue::Text(table.to_string()),
                SqlValue::Text(column.to_string()),
            ],
        )
    }

    fn list_tables(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY table_name"
            .to_string()
    }

    fn disable_foreign_keys(&self) -> Option<String> {
        Some("SET FOREIGN_KEY_CHECKS = 0".to_string())
    }

    fn enable_foreign_keys(&self) -> Option<String> {
        Some("SET FOREIGN_KEY_CHECKS = 1".to_string())
    }
}
