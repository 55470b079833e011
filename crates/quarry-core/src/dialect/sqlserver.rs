//! Microsoft SQL Server dialect.

use super::{unsupported, Dialect, Driver};
use crate::error::CompileError;
use crate::schema::{ColumnDefinition, ColumnType, IndexDefinition, IndexKind};
use crate::value::SqlValue;

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for SqlServerDialect {
    fn driver(&self) -> Driver {
        Driver::SqlServer
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn quote_string(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("@p{position}")
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        if limit.is_none() && offset.is_none() {
            return String::new();
        }
        let mut sql = format!(" OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(n) = limit {
            sql.push_str(&format!(" FETCH NEXT {n} ROWS ONLY"));
        }
        sql
    }

    fn requires_order_for_offset(&self) -> bool {
        true
    }

    fn type_name(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        let name = match column.column_type {
            ColumnType::TinyInteger => "TINYINT".to_string(),
            ColumnType::SmallInteger => "SMALLINT".to_string(),
            ColumnType::MediumInteger | ColumnType::Integer => "INT".to_string(),
            ColumnType::BigInteger => "BIGINT".to_string(),
            ColumnType::Char(n) => format!("NCHAR({n})"),
            ColumnType::String(n) => format!("NVARCHAR({n})"),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText | ColumnType::Json => {
                "NVARCHAR(MAX)".to_string()
            }
            ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "FLOAT".to_string(),
            ColumnType::Boolean => "BIT".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::DateTime | ColumnType::Timestamp => "DATETIME2".to_string(),
            ColumnType::TimestampTz => "DATETIMEOFFSET".to_string(),
            ColumnType::Jsonb => return Err(unsupported(Driver::SqlServer, "jsonb columns")),
            ColumnType::Uuid => "UNIQUEIDENTIFIER".to_string(),
            ColumnType::Binary => "VARBINARY(MAX)".to_string(),
            ColumnType::Enum(_) => "NVARCHAR(255)".to_string(),
        };
        Ok(name)
    }

    fn auto_increment_clause(&self, column: &ColumnDefinition) -> Result<String, CompileError> {
        Ok(if column.is_inline_primary() {
            " IDENTITY(1,1) PRIMARY KEY".to_string()
        } else {
            " IDENTITY(1,1)".to_string()
        })
    }

    fn comment_statement(&self, table: &str, column: &str, comment: &str) -> Option<String> {
        Some(format!(
            "EXEC sp_addextendedproperty N'MS_Description', {}, N'SCHEMA', N'dbo', \
             N'TABLE', {}, N'COLUMN', {}",
            self.quote_string(comment),
            self.quote_string(table),
            self.quote_string(column)
        ))
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}",
            self.quote_string(from),
            self.quote_string(to)
        )
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String, CompileError> {
        Ok(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.column_definition(column)?
        ))
    }

    fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        format!(
            "EXEC sp_rename {}, {}, N'COLUMN'",
            self.quote_string(&format!("{table}.{from}")),
            self.quote_string(to)
        )
    }

    fn modify_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<String>, CompileError> {
        if column.auto_increment {
            return Err(unsupported(
                Driver::SqlServer,
                format!("changing '{}' into an identity column", column.name),
            ));
        }
        let quoted_table = self.quote_identifier(table);
        let quoted_column = self.quote_identifier(&column.name);
        let check_name = format!("{table}_{}_check", column.name);
        let default_name = format!("{table}_{}_default", column.name);

        // Bound defaults and checks block ALTER COLUMN and would pile up
        // across changes, so they go first.
        let object = self.quote_string(&quoted_table);
        let column_id = format!(
            "COLUMNPROPERTY(OBJECT_ID({object}), {}, 'ColumnId')",
            self.quote_string(&column.name)
        );
        let drop = self.quote_string(&format!("ALTER TABLE {quoted_table} DROP CONSTRAINT "));
        let mut sql = vec![format!(
            "DECLARE @sql NVARCHAR(MAX) = N''; \
             SELECT @sql += {drop} + QUOTENAME(name) + N'; ' FROM sys.default_constraints \
             WHERE parent_object_id = OBJECT_ID({object}) AND parent_column_id = {column_id}; \
             SELECT @sql += {drop} + QUOTENAME(name) + N'; ' FROM sys.check_constraints \
             WHERE parent_object_id = OBJECT_ID({object}) \
             AND (parent_column_id = {column_id} OR name = {}); \
             EXEC sp_executesql @sql",
            self.quote_string(&check_name)
        )];
        sql.push(format!(
            "ALTER TABLE {quoted_table} ALTER COLUMN {quoted_column} {}{}",
            self.type_name(column)?,
            if column.nullable { " NULL" } else { " NOT NULL" }
        ));
        if let Some(ref default) = column.default {
            sql.push(format!(
                "ALTER TABLE {quoted_table} ADD CONSTRAINT {} DEFAULT {} FOR {quoted_column}",
                self.quote_identifier(&default_name),
                self.render_default(default)
            ));
        }
        if let Some(check) = self.column_check(column) {
            sql.push(format!(
                "ALTER TABLE {quoted_table} ADD CONSTRAINT {} {check}",
                self.quote_identifier(&check_name)
            ));
        }
        Ok(sql)
    }

    fn drop_primary(&self, table: &str, name: Option<&str>) -> Result<String, CompileError> {
        let name = name.ok_or_else(|| CompileError::InvalidConstraint {
            table: table.to_string(),
            reason: "dropping a primary key requires its constraint name".to_string(),
        })?;
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_identifier(table),
            self.quote_identifier(name)
        ))
    }

    fn create_index(&self, table: &str, index: &IndexDefinition) -> Result<String, CompileError> {
        let keyword = match index.kind {
            IndexKind::Primary => return self.add_primary(table, index),
            IndexKind::Index => "INDEX",
            IndexKind::Unique => "UNIQUE INDEX",
            IndexKind::Spatial => "SPATIAL INDEX",
            IndexKind::Fulltext => {
                return Err(unsupported(Driver::SqlServer, "full-text indexes"));
            }
        };
        Ok(format!(
            "CREATE {keyword} {} ON {} ({})",
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

    fn has_table(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_NAME = @p1 AND TABLE_TYPE = 'BASE TABLE'"
                .to_string(),
            vec![SqlValue::Text(table.to_string())],
        )
    }

    fn has_column(&self, table: &str, column: &str) -> (String, Vec<SqlValue>) {
        (
            "SELECT COUNT(*) AS aggregate FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = @p1 AND COLUMN_NAME = @p2"
                .to_string(),
            vec![
                SqlValue::Text(table.to_string()),
                SqlValue::Text(column.to_string()),
            ],
        )
    }

    fn list_tables(&self) -> String {
        "SELECT TABLE_NAME AS name FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
            .to_string()
    }

    fn disable_foreign_keys(&self) -> Option<String> {
        Some("EXEC sp_MSforeachtable 'ALTER TABLE ? NOCHECK CONSTRAINT all'".to_string())
    }

    fn enable_foreign_keys(&self) -> Option<String> {
        Some("EXEC sp_MSforeachtable 'ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all'".to_string())
    }
}
