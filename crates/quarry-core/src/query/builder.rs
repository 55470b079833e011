//! The fluent query builder.

use super::join::{JoinClause, JoinKind};
use super::predicate::{Conditions, Connector, IntoOperand};
use crate::error::QueryError;
use crate::ident;
use crate::value::{SqlValue, ToSqlValue};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison that moves past a cursor in this direction.
    #[must_use]
    pub const fn cursor_operator(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// AVG
    Avg,
    /// MIN
    Min,
    /// MAX
    Max,
}

impl Aggregate {
    /// SQL function name.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// One select-list entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Selection {
    Column(String),
    Raw(String, Vec<SqlValue>),
}

/// One ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Ordering {
    Column(String, Direction),
    Raw(String, Vec<SqlValue>),
}

/// Keyset pagination constraint: order by `column` and, when `after` is
/// set, only keep rows strictly past it.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorConstraint {
    /// Sort column.
    pub column: String,
    /// Sort direction.
    pub direction: Direction,
    /// Last value already seen.
    pub after: Option<SqlValue>,
}

/// Accumulated query state.
///
/// Every clause method takes `self` by value and returns it, so calls chain.
/// Nothing here performs I/O: compile with [`QueryBuilder::to_sql`] (or the
/// write variants) and hand the SQL and bindings to a connection.
///
/// ```rust
/// use quarry_core::dialect::Driver;
/// use quarry_core::query::QueryBuilder;
///
/// let (sql, params) = QueryBuilder::table("users")
///     .select(&["id", "name"])
///     .where_("active", true)
///     .where_op("age", ">=", 18)
///     .order_by("name")
///     .limit(10)
///     .to_sql(Driver::Postgres.dialect())
///     .unwrap();
///
/// assert_eq!(
///     sql,
///     "SELECT \"id\", \"name\" FROM \"users\" WHERE \"active\" = $1 AND \"age\" >= $2 \
///      ORDER BY \"name\" ASC LIMIT 10"
/// );
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryBuilder {
    pub(crate) table: Option<String>,
    pub(crate) columns: Vec<Selection>,
    pub(crate) distinct: bool,
    pub(crate) aggregate: Option<(Aggregate, String)>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) wheres: Conditions,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Conditions,
    pub(crate) orders: Vec<Ordering>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) cursor: Option<CursorConstraint>,
    pub(crate) error: Option<QueryError>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder over `table`.
    #[must_use]
    pub fn table(table: &str) -> Self {
        Self::new().from(table)
    }

    /// Sets the FROM table (may carry an alias: `"users as u"`).
    #[must_use]
    pub fn from(mut self, table: &str) -> Self {
        if ident::is_aliased_identifier(table) && table != "*" {
            self.table = Some(table.to_string());
        } else {
            self.fail(QueryError::InvalidIdentifier {
                call: "from",
                identifier: table.to_string(),
            });
        }
        self
    }

    /// FROM table, if set.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// First error recorded by any clause call.
    #[must_use]
    pub fn error(&self) -> Option<&QueryError> {
        self.error
            .as_ref()
            .or_else(|| self.wheres.error())
            .or_else(|| self.havings.error())
            .or_else(|| self.joins.iter().find_map(|j| j.conditions.error()))
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_column(&mut self, call: &'static str, column: &str) -> bool {
        if ident::is_aliased_identifier(column) {
            true
        } else {
            self.fail(QueryError::InvalidIdentifier {
                call,
                identifier: column.to_string(),
            });
            false
        }
    }

    // ---------------------------------------------------------------------
    // SELECT list
    // ---------------------------------------------------------------------

    /// Replaces the select list.
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns.clear();
        self.add_select(columns)
    }

    /// Appends to the select list.
    #[must_use]
    pub fn add_select(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if self.check_column("select", column) {
                self.columns.push(Selection::Column((*column).to_string()));
            }
        }
        self
    }

    /// Appends a raw expression with `?` markers to the select list.
    #[must_use]
    pub fn select_raw(mut self, expression: &str, bindings: Vec<SqlValue>) -> Self {
        let markers = ident::count_markers(expression);
        if markers == bindings.len() {
            self.columns
                .push(Selection::Raw(expression.to_string(), bindings));
        } else {
            self.fail(QueryError::BindingMismatch {
                call: "select_raw",
                markers,
                bindings: bindings.len(),
            });
        }
        self
    }

    /// SELECT DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Replaces the select list with one aggregate aliased `aggregate`.
    #[must_use]
    pub fn aggregate(mut self, function: Aggregate, column: &str) -> Self {
        if column == "*" || self.check_column("aggregate", column) {
            self.aggregate = Some((function, column.to_string()));
        }
        self
    }

    /// `COUNT(column)`.
    #[must_use]
    pub fn count(self, column: &str) -> Self {
        self.aggregate(Aggregate::Count, column)
    }

    /// `SUM(column)`.
    #[must_use]
    pub fn sum(self, column: &str) -> Self {
        self.aggregate(Aggregate::Sum, column)
    }

    /// `AVG(column)`.
    #[must_use]
    pub fn avg(self, column: &str) -> Self {
        self.aggregate(Aggregate::Avg, column)
    }

    /// `MIN(column)`.
    #[must_use]
    pub fn min(self, column: &str) -> Self {
        self.aggregate(Aggregate::Min, column)
    }

    /// `MAX(column)`.
    #[must_use]
    pub fn max(self, column: &str) -> Self {
        self.aggregate(Aggregate::Max, column)
    }

    // ---------------------------------------------------------------------
    // Joins
    // ---------------------------------------------------------------------

    fn push_join(mut self, join: JoinClause) -> Self {
        if ident::is_aliased_identifier(&join.table) {
            self.joins.push(join);
        } else {
            self.fail(QueryError::InvalidIdentifier {
                call: "join",
                identifier: join.table.clone(),
            });
        }
        self
    }

    /// INNER JOIN `table` ON `first <operator> second`.
    #[must_use]
    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        let join = JoinClause::new(JoinKind::Inner, table).on(first, operator, second);
        self.push_join(join)
    }

    /// LEFT JOIN `table` ON `first <operator> second`.
    #[must_use]
    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        let join = JoinClause::new(JoinKind::Left, table).on(first, operator, second);
        self.push_join(join)
    }

    /// RIGHT JOIN `table` ON `first <operator> second`.
    #[must_use]
    pub fn right_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        let join = JoinClause::new(JoinKind::Right, table).on(first, operator, second);
        self.push_join(join)
    }

    /// CROSS JOIN `table`.
    #[must_use]
    pub fn cross_join(self, table: &str) -> Self {
        self.push_join(JoinClause::new(JoinKind::Cross, table))
    }

    /// Join with conditions built by `build`.
    #[must_use]
    pub fn join_with(
        self,
        kind: JoinKind,
        table: &str,
        build: impl FnOnce(JoinClause) -> JoinClause,
    ) -> Self {
        let join = build(JoinClause::new(kind, table));
        self.push_join(join)
    }

    // ---------------------------------------------------------------------
    // WHERE
    // ---------------------------------------------------------------------

    /// `column = value`; a list value becomes `IN`.
    #[must_use]
    pub fn where_(mut self, column: &str, value: impl IntoOperand) -> Self {
        self.wheres = self.wheres.where_(column, value);
        self
    }

    /// `OR column = value`.
    #[must_use]
    pub fn or_where(mut self, column: &str, value: impl IntoOperand) -> Self {
        self.wheres = self.wheres.or_where(column, value);
        self
    }

    /// `column <operator> value`.
    #[must_use]
    pub fn where_op(mut self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.wheres = self.wheres.where_op(column, operator, value);
        self
    }

    /// `OR column <operator> value`.
    #[must_use]
    pub fn or_where_op(mut self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.wheres = self.wheres.or_where_op(column, operator, value);
        self
    }

    /// `column IN (...)`.
    #[must_use]
    pub fn where_in(mut self, column: &str, values: impl IntoOperand) -> Self {
        self.wheres = self.wheres.where_in(column, values);
        self
    }

    /// `column NOT IN (...)`.
    #[must_use]
    pub fn where_not_in(mut self, column: &str, values: impl IntoOperand) -> Self {
        self.wheres = self.wheres.where_not_in(column, values);
        self
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn where_null(mut self, column: &str) -> Self {
        self.wheres = self.wheres.where_null(column);
        self
    }

    /// `column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(mut self, column: &str) -> Self {
        self.wheres = self.wheres.where_not_null(column);
        self
    }

    /// `column BETWEEN low AND high`.
    #[must_use]
    pub fn where_between(
        mut self,
        column: &str,
        low: impl ToSqlValue,
        high: impl ToSqlValue,
    ) -> Self {
        self.wheres = self.wheres.where_between(column, low, high);
        self
    }

    /// `first <operator> second`, comparing two columns.
    #[must_use]
    pub fn where_column(mut self, first: &str, operator: &str, second: &str) -> Self {
        self.wheres = self.wheres.where_column(first, operator, second);
        self
    }

    /// Raw fragment with `?` markers.
    #[must_use]
    pub fn where_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.wheres = self.wheres.where_raw(sql, bindings);
        self
    }

    /// `OR` raw fragment with `?` markers.
    #[must_use]
    pub fn or_where_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.wheres = self.wheres.or_where_raw(sql, bindings);
        self
    }

    /// Parenthesized group.
    ///
    /// ```rust
    /// use quarry_core::dialect::Driver;
    /// use quarry_core::query::QueryBuilder;
    ///
    /// let (sql, _) = QueryBuilder::table("users")
    ///     .where_("active", true)
    ///     .where_group(|g| g.where_("role", "admin").or_where("role", "owner"))
    ///     .to_sql(Driver::Sqlite.dialect())
    ///     .unwrap();
    /// assert!(sql.ends_with("WHERE \"active\" = ? AND (\"role\" = ? OR \"role\" = ?)"));
    /// ```
    #[must_use]
    pub fn where_group(mut self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.wheres = self.wheres.where_group(build);
        self
    }

    /// `OR` parenthesized group.
    #[must_use]
    pub fn or_where_group(mut self, build: impl FnOnce(Conditions) -> Conditions) -> Self {
        self.wheres = self.wheres.or_where_group(build);
        self
    }

    // ---------------------------------------------------------------------
    // GROUP BY / HAVING
    // ---------------------------------------------------------------------

    /// GROUP BY columns.
    #[must_use]
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if self.check_column("group_by", column) {
                self.groups.push((*column).to_string());
            }
        }
        self
    }

    /// `HAVING column <operator> value`.
    #[must_use]
    pub fn having(mut self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.havings =
            self.havings
                .compare("having", Connector::And, column, operator, value.into_operand());
        self
    }

    /// `OR HAVING column <operator> value`.
    #[must_use]
    pub fn or_having(mut self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.havings =
            self.havings
                .compare("or_having", Connector::Or, column, operator, value.into_operand());
        self
    }

    /// Raw HAVING fragment with `?` markers.
    #[must_use]
    pub fn having_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.havings = self.havings.raw("having_raw", Connector::And, sql, bindings);
        self
    }

    // ---------------------------------------------------------------------
    // ORDER BY / LIMIT / OFFSET
    // ---------------------------------------------------------------------

    /// ORDER BY `column` in `direction`.
    #[must_use]
    pub fn order_by_dir(mut self, column: &str, direction: Direction) -> Self {
        if self.check_column("order_by", column) {
            self.orders
                .push(Ordering::Column(column.to_string(), direction));
        }
        self
    }

    /// ORDER BY `column` ASC.
    #[must_use]
    pub fn order_by(self, column: &str) -> Self {
        self.order_by_dir(column, Direction::Asc)
    }

    /// ORDER BY `column` DESC.
    #[must_use]
    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by_dir(column, Direction::Desc)
    }

    /// Raw ORDER BY expression with `?` markers.
    #[must_use]
    pub fn order_by_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        let markers = ident::count_markers(sql);
        if markers == bindings.len() {
            self.orders.push(Ordering::Raw(sql.to_string(), bindings));
        } else {
            self.fail(QueryError::BindingMismatch {
                call: "order_by_raw",
                markers,
                bindings: bindings.len(),
            });
        }
        self
    }

    /// Drops every ORDER BY entry.
    #[must_use]
    pub fn reorder(mut self) -> Self {
        self.orders.clear();
        self
    }

    /// LIMIT.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// OFFSET.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Removes LIMIT and OFFSET.
    #[must_use]
    pub fn without_limits(mut self) -> Self {
        self.limit = None;
        self.offset = None;
        self
    }

    /// Current LIMIT.
    #[must_use]
    pub const fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    /// Whether the query is DISTINCT or grouped.
    #[must_use]
    pub fn is_distinct_or_grouped(&self) -> bool {
        self.distinct || !self.groups.is_empty()
    }

    // ---------------------------------------------------------------------
    // Cursor
    // ---------------------------------------------------------------------

    /// Orders by `column` first and, with `after`, keeps rows strictly past it.
    #[must_use]
    pub fn cursor(mut self, column: &str, direction: Direction, after: Option<SqlValue>) -> Self {
        if self.check_column("cursor", column) {
            self.cursor = Some(CursorConstraint {
                column: column.to_string(),
                direction,
                after,
            });
        }
        self
    }

    /// Active cursor constraint.
    #[must_use]
    pub fn cursor_constraint(&self) -> Option<&CursorConstraint> {
        self.cursor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clause_errors_surface_from_any_part() {
        let q = QueryBuilder::table("users").having("total", "~", 1);
        assert!(matches!(
            q.error(),
            Some(QueryError::UnknownOperator { call: "having", .. })
        ));

        let q = QueryBuilder::table("users").join("posts", "users.id", "=", "posts.user id");
        assert!(matches!(
            q.error(),
            Some(QueryError::InvalidIdentifier { call: "join.on", .. })
        ));

        let q = QueryBuilder::table("users; DROP TABLE users");
        assert!(matches!(
            q.error(),
            Some(QueryError::InvalidIdentifier { call: "from", .. })
        ));
    }

    #[test]
    fn test_select_replaces_and_add_select_appends() {
        let q = QueryBuilder::table("users")
            .select(&["id"])
            .select(&["name"])
            .add_select(&["email as contact"]);
        assert_eq!(
            q.columns,
            vec![
                Selection::Column("name".into()),
                Selection::Column("email as contact".into())
            ]
        );
    }

    #[test]
    fn test_select_raw_checks_bindings() {
        let q = QueryBuilder::table("t").select_raw("price * ? as gross", vec![]);
        assert!(matches!(
            q.error(),
            Some(QueryError::BindingMismatch { call: "select_raw", .. })
        ));
    }

    #[test]
    fn test_cursor_operator_follows_direction() {
        assert_eq!(Direction::Asc.cursor_operator(), ">");
        assert_eq!(Direction::Desc.cursor_operator(), "<");
    }
}
