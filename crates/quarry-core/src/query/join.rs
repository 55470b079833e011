//! JOIN clauses.

use super::predicate::{Conditions, Connector, IntoOperand};

/// Type of join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// INNER JOIN.
    Inner,
    /// LEFT JOIN.
    Left,
    /// RIGHT JOIN.
    Right,
    /// CROSS JOIN.
    Cross,
}

impl JoinKind {
    /// Returns the SQL keyword for this join type.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// One join: a table and its ON conditions.
///
/// `on` compares two columns; `where_` compares a column with a bound value.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub(crate) kind: JoinKind,
    pub(crate) table: String,
    pub(crate) conditions: Conditions,
}

impl JoinClause {
    /// Starts a join against `table` (may carry an alias: `"users as u"`).
    #[must_use]
    pub fn new(kind: JoinKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            conditions: Conditions::new(),
        }
    }

    /// Join type.
    #[must_use]
    pub const fn kind(&self) -> JoinKind {
        self.kind
    }

    /// Joined table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// ON conditions.
    #[must_use]
    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    /// `first <operator> second`.
    #[must_use]
    pub fn on(mut self, first: &str, operator: &str, second: &str) -> Self {
        self.conditions =
            self.conditions
                .compare_columns("join.on", Connector::And, first, operator, second);
        self
    }

    /// `OR first <operator> second`.
    #[must_use]
    pub fn or_on(mut self, first: &str, operator: &str, second: &str) -> Self {
        self.conditions =
            self.conditions
                .compare_columns("join.or_on", Connector::Or, first, operator, second);
        self
    }

    /// `column = value`, bound.
    #[must_use]
    pub fn where_(mut self, column: &str, value: impl IntoOperand) -> Self {
        self.conditions = self.conditions.compare(
            "join.where",
            Connector::And,
            column,
            "=",
            value.into_operand(),
        );
        self
    }

    /// `column <operator> value`, bound.
    #[must_use]
    pub fn where_op(mut self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.conditions = self.conditions.compare(
            "join.where",
            Connector::And,
            column,
            operator,
            value.into_operand(),
        );
        self
    }

    /// `OR column = value`, bound.
    #[must_use]
    pub fn or_where(mut self, column: &str, value: impl IntoOperand) -> Self {
        self.conditions = self.conditions.compare(
            "join.or_where",
            Connector::Or,
            column,
            "=",
            value.into_operand(),
        );
        self
    }
}
