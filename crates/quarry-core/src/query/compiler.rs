//! Query compilation: one linear walk producing SQL and bindings together.

use super::builder::{Direction, Ordering, QueryBuilder, Selection};
use super::join::JoinKind;
use super::predicate::{Conditions, Leaf, Operand, Operator, Predicate};
use crate::dialect::Dialect;
use crate::error::QueryError;
use crate::ident;
use crate::value::{Row, SqlValue};

/// Accumulates SQL text and bindings in lockstep.
///
/// Every bound value goes through [`SqlWriter::bind`], which appends the
/// value and emits the dialect placeholder for its position, so the n-th
/// placeholder always refers to the n-th binding.
pub(crate) struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    bindings: Vec<SqlValue>,
}

impl<'d> SqlWriter<'d> {
    pub(crate) fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            bindings: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn quoted(&mut self, identifier: &str) {
        let quoted = self.dialect.quote_identifier(identifier);
        self.sql.push_str(&quoted);
    }

    fn bind(&mut self, value: SqlValue) {
        self.bindings.push(value);
        let placeholder = self.dialect.placeholder(self.bindings.len());
        self.sql.push_str(&placeholder);
    }

    fn bind_list(&mut self, values: &[SqlValue]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value.clone());
        }
    }

    /// Appends a raw fragment, renumbering its `?` markers.
    fn raw(&mut self, sql: &str, bindings: &[SqlValue]) {
        let dialect = self.dialect;
        let rendered = ident::renumber_markers(sql, self.bindings.len(), |n| dialect.placeholder(n));
        self.sql.push_str(&rendered);
        self.bindings.extend(bindings.iter().cloned());
    }

    /// Walks a flat predicate sequence left to right.
    ///
    /// Raw fragments are parenthesized when they share the sequence with
    /// other predicates, so an `OR` inside one cannot bind across `AND`.
    fn conditions(&mut self, conditions: &Conditions) {
        let tokens = conditions.tokens();
        let shared = tokens
            .iter()
            .filter(|t| matches!(t, Predicate::Leaf(_)))
            .nth(1)
            .is_some();
        for token in tokens {
            match token {
                Predicate::Connector(connector) => self.push(connector.as_sql()),
                Predicate::GroupOpen => self.push("("),
                Predicate::GroupClose => self.push(")"),
                Predicate::Leaf(Leaf::Raw { sql, bindings }) if shared => {
                    self.push("(");
                    self.raw(sql, bindings);
                    self.push(")");
                }
                Predicate::Leaf(leaf) => self.leaf(leaf),
            }
        }
    }

    fn leaf(&mut self, leaf: &Leaf) {
        match leaf {
            Leaf::Compare {
                column,
                operator,
                operand,
            } => match (operator, operand) {
                // Empty IN lists are not valid SQL; keep the truth value instead
                (Operator::In, Operand::List(values)) if values.is_empty() => self.push("1 = 0"),
                (Operator::NotIn, Operand::List(values)) if values.is_empty() => {
                    self.push("1 = 1");
                }
                (Operator::In | Operator::NotIn, Operand::List(values)) => {
                    self.quoted(column);
                    self.push(" ");
                    self.push(operator.as_sql());
                    self.push(" (");
                    self.bind_list(values);
                    self.push(")");
                }
                (Operator::Between | Operator::NotBetween, Operand::List(values)) => {
                    self.quoted(column);
                    self.push(" ");
                    self.push(operator.as_sql());
                    self.push(" ");
                    if let [low, high] = values.as_slice() {
                        self.bind(low.clone());
                        self.push(" AND ");
                        self.bind(high.clone());
                    }
                }
                (_, Operand::Value(value)) => {
                    self.quoted(column);
                    self.push(" ");
                    self.push(operator.as_sql());
                    self.push(" ");
                    self.bind(value.clone());
                }
                (_, Operand::List(values)) => {
                    self.quoted(column);
                    self.push(" ");
                    self.push(operator.as_sql());
                    self.push(" (");
                    self.bind_list(values);
                    self.push(")");
                }
            },
            Leaf::Columns {
                first,
                operator,
                second,
            } => {
                self.quoted(first);
                self.push(" ");
                self.push(operator.as_sql());
                self.push(" ");
                self.quoted(second);
            }
            Leaf::Null { column, negated } => {
                self.quoted(column);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Leaf::Raw { sql, bindings } => self.raw(sql, bindings),
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<SqlValue>) {
        (self.sql, self.bindings)
    }
}

impl QueryBuilder {
    fn ensure_valid(&self) -> Result<&str, QueryError> {
        if let Some(error) = self.error() {
            return Err(error.clone());
        }
        self.table.as_deref().ok_or(QueryError::Missing("table"))
    }

    fn ensure_writable(&self, statement: &str) -> Result<&str, QueryError> {
        let table = self.ensure_valid()?;
        if ident::split_alias(table).is_some() {
            return Err(QueryError::InvalidStatement(format!(
                "{statement} cannot target an aliased table"
            )));
        }
        if !self.joins.is_empty() {
            return Err(QueryError::InvalidStatement(format!(
                "{statement} with joins is not supported"
            )));
        }
        if self.limit.is_some() || self.offset.is_some() {
            return Err(QueryError::InvalidStatement(format!(
                "{statement} with limit or offset is not supported"
            )));
        }
        Ok(table)
    }

    /// Compiles the SELECT statement.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.ensure_valid()?;
        let mut w = SqlWriter::new(dialect);

        w.push("SELECT ");
        self.write_select_list(&mut w, dialect);
        w.push(" FROM ");
        w.quoted(table);

        for join in &self.joins {
            if join.kind != JoinKind::Cross && join.conditions.is_empty() {
                return Err(QueryError::InvalidStatement(format!(
                    "{} {} has no ON condition",
                    join.kind.as_sql(),
                    join.table
                )));
            }
            w.push(" ");
            w.push(join.kind.as_sql());
            w.push(" ");
            w.quoted(&join.table);
            if !join.conditions.is_empty() {
                w.push(" ON ");
                w.conditions(&join.conditions);
            }
        }

        self.write_where(&mut w, true);

        if !self.groups.is_empty() {
            w.push(" GROUP BY ");
            let groups: Vec<String> = self
                .groups
                .iter()
                .map(|g| dialect.quote_identifier(g))
                .collect();
            w.push(&groups.join(", "));
        }

        if !self.havings.is_empty() {
            w.push(" HAVING ");
            w.conditions(&self.havings);
        }

        let ordered = self.write_order_by(&mut w);
        let limited = self.limit.is_some() || self.offset.is_some();
        if limited && !ordered && dialect.requires_order_for_offset() {
            w.push(" ORDER BY (SELECT NULL)");
        }
        w.push(&dialect.limit_offset(self.limit, self.offset));

        Ok(w.finish())
    }

    fn write_select_list(&self, w: &mut SqlWriter<'_>, dialect: &dyn Dialect) {
        if let Some((function, column)) = &self.aggregate {
            let mut argument = if column == "*" {
                String::from("*")
            } else {
                dialect.quote_identifier(column)
            };
            if self.distinct && column != "*" {
                argument = format!("DISTINCT {argument}");
            }
            w.push(&format!(
                "{}({argument}) AS {}",
                function.as_sql(),
                dialect.quote_identifier("aggregate")
            ));
            return;
        }

        if self.distinct {
            w.push("DISTINCT ");
        }
        if self.columns.is_empty() {
            w.push("*");
            return;
        }
        for (i, selection) in self.columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match selection {
                Selection::Column(column) => w.quoted(column),
                Selection::Raw(sql, bindings) => w.raw(sql, bindings),
            }
        }
    }

    fn write_where(&self, w: &mut SqlWriter<'_>, with_cursor: bool) {
        let cursor = if with_cursor {
            self.cursor
                .as_ref()
                .and_then(|c| c.after.as_ref().map(|value| (c, value)))
        } else {
            None
        };

        match cursor {
            Some((cursor, value)) => {
                w.push(" WHERE ");
                if !self.wheres.is_empty() {
                    w.push("(");
                    w.conditions(&self.wheres);
                    w.push(") AND ");
                }
                w.quoted(&cursor.column);
                w.push(" ");
                w.push(cursor.direction.cursor_operator());
                w.push(" ");
                w.bind(value.clone());
            }
            None if !self.wheres.is_empty() => {
                w.push(" WHERE ");
                w.conditions(&self.wheres);
            }
            None => {}
        }
    }

    /// Writes ORDER BY; returns whether anything was written.
    fn write_order_by(&self, w: &mut SqlWriter<'_>) -> bool {
        let mut entries: Vec<(&str, Direction)> = Vec::new();
        if let Some(ref cursor) = self.cursor {
            entries.push((cursor.column.as_str(), cursor.direction));
        }
        let cursor_column = self.cursor.as_ref().map(|c| c.column.as_str());

        if entries.is_empty() && self.orders.is_empty() {
            return false;
        }
        w.push(" ORDER BY ");
        let mut first = true;
        for (column, direction) in entries {
            w.quoted(column);
            w.push(" ");
            w.push(direction.as_sql());
            first = false;
        }
        for order in &self.orders {
            if let Ordering::Column(column, _) = order {
                if Some(column.as_str()) == cursor_column {
                    continue;
                }
            }
            if !first {
                w.push(", ");
            }
            first = false;
            match order {
                Ordering::Column(column, direction) => {
                    w.quoted(column);
                    w.push(" ");
                    w.push(direction.as_sql());
                }
                Ordering::Raw(sql, bindings) => w.raw(sql, bindings),
            }
        }
        true
    }

    /// Compiles the total-count query: same filters, no ordering or limits.
    /// DISTINCT and grouped queries are counted through a derived table.
    pub fn to_count_sql(&self, dialect: &dyn Dialect) -> Result<(String, Vec<SqlValue>), QueryError> {
        let mut base = self.clone().reorder().without_limits();
        base.cursor = None;
        if !base.is_distinct_or_grouped() {
            return base.count("*").to_sql(dialect);
        }
        let (inner, bindings) = base.to_sql(dialect)?;
        Ok((
            format!(
                "SELECT COUNT(*) AS {} FROM ({inner}) AS {}",
                dialect.quote_identifier("aggregate"),
                dialect.quote_identifier("aggregate_table")
            ),
            bindings,
        ))
    }

    /// Compiles a multi-row INSERT. Every row must carry the first row's columns.
    pub fn compile_insert(
        &self,
        dialect: &dyn Dialect,
        rows: &[Row],
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.ensure_writable("insert")?;
        let first = rows.first().ok_or_else(|| {
            QueryError::InvalidStatement("insert needs at least one row".to_string())
        })?;
        let columns: Vec<&String> = first.keys().collect();
        if columns.is_empty() {
            return Err(QueryError::InvalidStatement(
                "insert row has no columns".to_string(),
            ));
        }
        for column in &columns {
            if **column == "*" || !ident::is_identifier(column) {
                return Err(QueryError::InvalidIdentifier {
                    call: "insert",
                    identifier: (*column).clone(),
                });
            }
        }

        let mut w = SqlWriter::new(dialect);
        w.push("INSERT INTO ");
        w.quoted(table);
        w.push(" (");
        let quoted: Vec<String> = columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect();
        w.push(&quoted.join(", "));
        w.push(") VALUES ");

        for (n, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(QueryError::InvalidStatement(format!(
                    "insert row {n} does not match the columns of the first row"
                )));
            }
            if n > 0 {
                w.push(", ");
            }
            w.push("(");
            for (i, column) in columns.iter().enumerate() {
                let value = row.get(*column).ok_or_else(|| {
                    QueryError::InvalidStatement(format!(
                        "insert row {n} is missing column '{column}'"
                    ))
                })?;
                if i > 0 {
                    w.push(", ");
                }
                w.bind(value.clone());
            }
            w.push(")");
        }
        Ok(w.finish())
    }

    /// Compiles an UPDATE of `assignments` restricted by the WHERE clause.
    pub fn compile_update(
        &self,
        dialect: &dyn Dialect,
        assignments: &Row,
    ) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.ensure_writable("update")?;
        if assignments.is_empty() {
            return Err(QueryError::InvalidStatement(
                "update needs at least one assignment".to_string(),
            ));
        }

        let mut w = SqlWriter::new(dialect);
        w.push("UPDATE ");
        w.quoted(table);
        w.push(" SET ");
        for (i, (column, value)) in assignments.iter().enumerate() {
            if column == "*" || !ident::is_identifier(column) {
                return Err(QueryError::InvalidIdentifier {
                    call: "update",
                    identifier: column.clone(),
                });
            }
            if i > 0 {
                w.push(", ");
            }
            w.quoted(column);
            w.push(" = ");
            w.bind(value.clone());
        }
        self.write_where(&mut w, false);
        Ok(w.finish())
    }

    /// Compiles a DELETE restricted by the WHERE clause.
    pub fn compile_delete(&self, dialect: &dyn Dialect) -> Result<(String, Vec<SqlValue>), QueryError> {
        let table = self.ensure_writable("delete")?;
        let mut w = SqlWriter::new(dialect);
        w.push("DELETE FROM ");
        w.quoted(table);
        self.write_where(&mut w, false);
        Ok(w.finish())
    }
}
