//! Stored table definitions, read back so a table can be recreated.
//!
//! Engines without `ALTER COLUMN` change a column by building a copy of the
//! table. The copy starts from the definition the engine itself stored, so
//! constraints, indexes and triggers the blueprint knows nothing about
//! survive the swap.

use crate::error::CompileError;
use crate::value::{Row, SqlValue};

/// Keywords that open a table constraint instead of a column.
const CONSTRAINT_KEYWORDS: [&str; 5] = ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

/// One line of a stored `CREATE TABLE` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableItem {
    /// A column definition.
    Column {
        /// Unquoted column name.
        name: String,
        /// The definition as stored, comments removed.
        definition: String,
    },
    /// A table constraint, kept verbatim.
    Constraint(String),
}

impl TableItem {
    fn parse(text: String) -> Self {
        match leading_name(&text) {
            Some((name, quoted))
                if quoted
                    || !CONSTRAINT_KEYWORDS
                        .iter()
                        .any(|k| name.eq_ignore_ascii_case(k)) =>
            {
                Self::Column {
                    name,
                    definition: text,
                }
            }
            _ => Self::Constraint(text),
        }
    }

    /// Column name, if this item defines a column.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Self::Column { name, .. } => Some(name),
            Self::Constraint(_) => None,
        }
    }

    /// Text as it goes back into a `CREATE TABLE`.
    #[must_use]
    pub fn sql(&self) -> &str {
        match self {
            Self::Column { definition, .. } => definition,
            Self::Constraint(sql) => sql,
        }
    }

    /// Whether the column is computed and so cannot be copied into.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        let Self::Column { definition, .. } = self else {
            return false;
        };
        let upper = normalized(definition);
        upper.contains(" GENERATED ALWAYS ") || upper.contains(" AS (") || upper.contains(" AS(")
    }

    /// Whether the column declares the table's primary key inline.
    #[must_use]
    pub fn is_inline_primary(&self) -> bool {
        matches!(self, Self::Column { definition, .. } if normalized(definition).contains(" PRIMARY KEY"))
    }

    /// Inline `REFERENCES ...` clause of a column, from the keyword on.
    #[must_use]
    pub fn references_clause(&self) -> Option<&str> {
        let Self::Column { definition, .. } = self else {
            return None;
        };
        let upper = definition.to_ascii_uppercase();
        let start = upper
            .match_indices("REFERENCES")
            .map(|(i, _)| i)
            .find(|&i| i > 0 && upper[..i].ends_with(char::is_whitespace))?;
        Some(&definition[start..])
    }
}

/// The stored definition of one table and the objects hanging off it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    table: String,
    items: Vec<TableItem>,
    options: String,
    dependents: Vec<String>,
}

impl TableSnapshot {
    /// Parses a stored `CREATE TABLE` statement.
    ///
    /// `dependents` are the statements recreating the table's indexes and
    /// triggers, in the order they should run.
    pub fn parse(
        table: &str,
        create_sql: &str,
        dependents: Vec<String>,
    ) -> Result<Self, CompileError> {
        let (items, options) =
            split_definition(create_sql).ok_or_else(|| CompileError::InvalidBlueprint {
                table: table.to_string(),
                reason: "stored table definition could not be read".to_string(),
            })?;
        Ok(Self {
            table: table.to_string(),
            items: items.into_iter().map(TableItem::parse).collect(),
            options,
            dependents,
        })
    }

    /// Builds a snapshot from definition rows carrying `type` and `sql`.
    ///
    /// The row typed `table` is the definition; every other row is a
    /// dependent, kept in row order.
    pub fn from_rows(table: &str, rows: &[Row]) -> Result<Self, CompileError> {
        let mut create = None;
        let mut dependents = Vec::new();
        for row in rows {
            let (Some(SqlValue::Text(kind)), Some(SqlValue::Text(sql))) =
                (row.get("type"), row.get("sql"))
            else {
                continue;
            };
            if kind == "table" {
                create = Some(sql.as_str());
            } else {
                dependents.push(sql.clone());
            }
        }
        let create = create.ok_or_else(|| CompileError::InvalidBlueprint {
            table: table.to_string(),
            reason: "table does not exist".to_string(),
        })?;
        Self::parse(table, create, dependents)
    }

    /// Table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Columns and table constraints, in stored order.
    #[must_use]
    pub fn items(&self) -> &[TableItem] {
        &self.items
    }

    /// Stored column item named `column`, compared case-insensitively.
    #[must_use]
    pub fn column(&self, column: &str) -> Option<&TableItem> {
        self.items
            .iter()
            .find(|item| item.column_name().is_some_and(|n| n.eq_ignore_ascii_case(column)))
    }

    /// Text after the closing parenthesis, such as `WITHOUT ROWID`.
    #[must_use]
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Index and trigger statements.
    #[must_use]
    pub fn dependents(&self) -> &[String] {
        &self.dependents
    }
}

/// First token of a body item, unquoted, and whether it was quoted.
fn leading_name(item: &str) -> Option<(String, bool)> {
    let mut chars = item.chars();
    let first = chars.next()?;
    let close = match first {
        '"' | '`' | '\'' => first,
        '[' => ']',
        _ => {
            let name: String = item
                .chars()
                .take_while(|c| !c.is_whitespace() && *c != '(')
                .collect();
            return Some((name, false));
        }
    };
    let mut name = String::new();
    let mut rest = chars.peekable();
    while let Some(c) = rest.next() {
        if c == close {
            // Doubled quote is an escaped quote
            if close != ']' && rest.peek() == Some(&close) {
                rest.next();
                name.push(c);
                continue;
            }
            return Some((name, true));
        }
        name.push(c);
    }
    None
}

/// Splits a `CREATE TABLE` statement into its top-level body items and the
/// text after the body. Comments are dropped.
fn split_definition(sql: &str) -> Option<(Vec<String>, String)> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = sql.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                if depth > 0 {
                    current.push(c);
                }
                for (_, d) in chars.by_ref() {
                    if depth > 0 {
                        current.push(d);
                    }
                    if d == close {
                        break;
                    }
                }
            }
            '-' if chars.peek().is_some_and(|&(_, n)| n == '-') => {
                for (_, d) in chars.by_ref() {
                    if d == '\n' {
                        break;
                    }
                }
                current.push(' ');
            }
            '/' if chars.peek().is_some_and(|&(_, n)| n == '*') => {
                chars.next();
                let mut previous = ' ';
                for (_, d) in chars.by_ref() {
                    if previous == '*' && d == '/' {
                        break;
                    }
                    previous = d;
                }
                current.push(' ');
            }
            '(' => {
                depth += 1;
                if depth > 1 {
                    current.push(c);
                }
            }
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    items.push(current.trim().to_string());
                    let options = sql[i + 1..].trim().trim_end_matches(';').trim_end();
                    return Some((items, options.to_string()));
                }
                current.push(c);
            }
            ',' if depth == 1 => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ if depth > 0 => current.push(c),
            _ => {}
        }
    }
    None
}

/// Uppercase with whitespace runs folded to single spaces.
fn normalized(definition: &str) -> String {
    definition
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}
