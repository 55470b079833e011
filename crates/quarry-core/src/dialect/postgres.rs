//! PostgreSQL dialect.

use super::{unsupported, Dialect, Driver};
use crate::error::CompileError;
use crate::schema::{ColumnDefinition, ColumnType, IndexDefinition, IndexKind};
use crate::value::SqlValue;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn base_type(column: &ColumnDefinition) -> String {
        match column.column_type {
            ColumnType::TinyInteger | ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::MediumInteger | ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Char(n) => format!("CHAR({n})"),
            ColumnType::String(n) => format!("VARCHAR({n})"),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText => "TEXT".to_string(),
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMPTZ".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Enum(_) => "VARCHAR(255)".to_string(),
        }
    }
}

impl Dialect for PostgresDialect {
    fn driver(&self) -> Driver {
        Driver::Postgres
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        // Auto-increment is expressed through the serial pseudo-types
        if column.auto_increment {
            let serial = match column.column_type {
                ColumnType::TinyInteger | ColumnType::SmallInteger => "SMALLSERIAL",
                ColumnType::MediumInteger | ColumnType::Integer => "SERIAL",
                _ => "BIGSERIAL",
            };
            return Ok(serial.to_string());
        }
        Ok(Self::base_type(column))
    }

    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        Ok(if column.is_inline_primary() {
            " PRIMARY KEY".to_string()
        } else {
            String::new()
        })
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn comment_statement(&self, table: &str, column: &str, comment: &str) -> Option<String> {
        Some(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.quote_identifier(table),
            self.quote_identifier(column),
            self.quote_string(comment)
        ))
    }

    fn drop_table_for_wipe(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", self.quote_identifier(table))
    }

    fn modify_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError> {
        if column.auto_increment {
            return Err(unsupported(
                Driver::Postgres,
                format!("changing '{}' into a serial column", column.name),
            ));
        }
        let quoted_table = self.quote_identifier(table);
        let prefix = format!(
            "ALTER TABLE {quoted_table} ALTER COLUMN {}",
            self.quote_identifier(&column.name)
        );
        // Inline checks carry the engine's `<table>_<column>_check` name
        let check_name = self.quote_identifier(&format!("{table}_{}_check", column.name));
        let ty = Self::base_type(column);
        let mut sql = vec![
            format!("ALTER TABLE {quoted_table} DROP CONSTRAINT IF EXISTS {check_name}"),
            format!(
                "{prefix} TYPE {ty} USING {}::{ty}",
                self.quote_identifier(&column.name)
            ),
        ];
        sql.push(if column.nullable {
            format!("{prefix} DROP NOT NULL")
        } else {
            format!("{prefix} SET NOT NULL")
        });
        sql.push(match column.default {
            Some(ref default) => format!("{prefix} SET DEFAULT {}", self.render_default(default)),
            None => format!("{prefix} DROP DEFAULT"),
        });
        if let Some(check) = self.column_check(column) {
            sql.push(format!(
                "ALTER TABLE {quoted_table} ADD CONSTRAINT {check_name} {check}"
            ));
        }
        Ok(sql)
    }

    fn primary_constraint(&self, _table: &str, index: &IndexDefinition) -> String {
        // Unnamed primary keys get the engine's own `<table>_pkey` name
        match index.name {
            Some(ref name) => format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_identifier(name),
                self.column_list(&index.columns)
            ),
            None => format!("PRIMARY KEY ({})", self.column_list(&index.columns)),
        }
    }

    fn drop_primary(&self, table: &str, name: Option<&str>) -> Result<String, CompileError> {
        let name = name.map_or_else(|| format!("{table}_pkey"), str::to_string);
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(&name)
        ))
    }

    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<String, CompileError> {
        let name = self.quote_identifier(&index.resolved_name(table));
        let quoted_table = self.quote_identifier(table);
        let with_class = |c: &String| match index.operator_class {
            Some(ref class) => format!("{} {class}", self.quote_identifier(c)),
            None => self.quote_identifier(c),
        };
        let columns = index.columns.iter().map(with_class).collect::<Vec<_>>().join(", ");
        let using = index
            .algorithm
            .as_deref()
            .map(|a| format!(" USING {a}"))
            .unwrap_or_default();

        match index.kind {
            IndexKind::Primary => self.add_primary(table, index),
            IndexKind::Index => Ok(format!(
                "CREATE INDEX {name} ON {quoted_table}{using} ({columns})"
            )),
            IndexKind::Unique => Ok(format!(
                "CREATE UNIQUE INDEX {name} ON {quoted_table}{using} ({columns})"
            )),
            IndexKind::Spatial => Ok(format!(
                "CREATE INDEX {name} ON {quoted_table} USING gist ({columns})"
            )),
            IndexKind::Fulltext => {
                let document = index
                    .columns
                    .iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(" || ' ' || ");
                Ok(format!(
                    "CREATE INDEX {name} ON {quoted_table} USING gin \
                     ((to_tsvector('english', {document})))"
                ))
            }
        }
    }

    fn has_table(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1 \
             AND table_type = 'BASE TABLE'"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2"
                .to_string(),
            vec![
                SqlValue::Text(table.to_string()),
                SqlValue::Text(column.to_string()),
            ],
        )
    }

    fn list_tables(&self) -> String {
        "SELECT table_name AS name FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }
}
