//! Flat predicate sequences for WHERE, HAVING and JOIN ... ON.
//!
//! Predicates are stored as a flat list of tokens rather than a tree:
//! leaves, AND/OR connectors and group open/close markers. Compilation is a
//! single left-to-right walk that emits each token in turn, so placeholders
//! and bindings can never drift out of order.

use crate::error::QueryError;
use crate::ident;
use crate::value::{SqlValue, ToSqlValue};

/// Comparison operator accepted by the `where` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `LIKE`
    Like,
    /// `NOT LIKE`
    NotLike,
    /// `IN (...)`
    In,
    /// `NOT IN (...)`
    NotIn,
    /// `BETWEEN ? AND ?`
    Between,
    /// `NOT BETWEEN ? AND ?`
    NotBetween,
}

impl Operator {
    /// Parses an operator string, case- and whitespace-insensitively.
    #[must_use]
    pub fn parse(operator: &str) -> Option<Self> {
        let normalized = operator
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" | "==" => Self::Eq,
            "!=" | "<>" => Self::NotEq,
            "<" => Self::Lt,
            "<=" => Self::LtEq,
            ">" => Self::Gt,
            ">=" => Self::GtEq,
            "like" => Self::Like,
            "not like" => Self::NotLike,
            "in" => Self::In,
            "not in" => Self::NotIn,
            "between" => Self::Between,
            "not between" => Self::NotBetween,
            _ => return None,
        };
        Some(op)
    }

    /// SQL keyword or symbol.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Between => "BETWEEN",
            Self::NotBetween => "NOT BETWEEN",
        }
    }

    const fn takes_list(self) -> bool {
        matches!(
            self,
            Self::In | Self::NotIn | Self::Between | Self::NotBetween
        )
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single bound value.
    Value(SqlValue),
    /// A list of bound values (IN, BETWEEN).
    List(Vec<SqlValue>),
}

/// Conversion into an [`Operand`].
///
/// Scalars become a single value; vectors, arrays and slices become a list,
/// which turns `=` into the IN shorthand.
pub trait IntoOperand {
    /// Converts self into an operand.
    fn into_operand(self) -> Operand;
}

macro_rules! scalar_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOperand for $ty {
                fn into_operand(self) -> Operand {
                    Operand::Value(self.to_sql_value())
                }
            }
        )*
    };
}

scalar_operand!(SqlValue, &SqlValue, bool, i64, i32, i16, u32, u16, u8, f64, f32, String, &String, &str);

impl<T: ToSqlValue> IntoOperand for Option<T> {
    fn into_operand(self) -> Operand {
        Operand::Value(self.to_sql_value())
    }
}

impl<T: ToSqlValue> IntoOperand for Vec<T> {
    fn into_operand(self) -> Operand {
        Operand::List(self.into_iter().map(ToSqlValue::to_sql_value).collect())
    }
}

impl<T: ToSqlValue, const N: usize> IntoOperand for [T; N] {
    fn into_operand(self) -> Operand {
        Operand::List(self.into_iter().map(ToSqlValue::to_sql_value).collect())
    }
}

impl<T: ToSqlValue + Clone> IntoOperand for &[T] {
    fn into_operand(self) -> Operand {
        Operand::List(self.iter().cloned().map(ToSqlValue::to_sql_value).collect())
    }
}

/// AND / OR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// AND
    And,
    /// OR
    Or,
}

impl Connector {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// A single condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// `column <op> value(s)`.
    Compare {
        /// Left-hand column.
        column: String,
        /// Operator.
        operator: Operator,
        /// Bound right-hand side.
        operand: Operand,
    },
    /// `first <op> second`, both columns.
    Columns {
        /// Left-hand column.
        first: String,
        /// Operator.
        operator: Operator,
        /// Right-hand column.
        second: String,
    },
    /// `column IS [NOT] NULL`.
    Null {
        /// Column.
        column: String,
        /// IS NOT NULL when true.
        negated: bool,
    },
    /// Raw SQL with `?` markers and their bindings.
    Raw {
        /// SQL fragment.
        sql: String,
        /// One binding per marker.
        bindings: Vec<SqlValue>,
    },
}

/// One token of a flat predicate sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A condition.
    Leaf(Leaf),
    /// AND / OR between two operands.
    Connector(Connector),
    /// `(`
    GroupOpen,
    /// `)`
    GroupClose,
}

/// A flat predicate sequence plus the first error seen while building it.
///
/// Every method validates its input at call time. The first failure is kept
/// and later surfaced by the compiler before any SQL is produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    tokens: Vec<Predicate>,
    error: Option<QueryError>,
}

impl Conditions {
    /// Empty sequence.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens in emission order.
    #[must_use]
    pub fn tokens(&self) -> &[Predicate] {
        &self.tokens
    }

    /// Whether no condition was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// First error recorded by a builder call, if any.
    #[must_use]
    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    pub(crate) fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn push(&mut self, connector: Connector, leaf: Leaf) {
        self.connect(connector);
        self.tokens.push(Predicate::Leaf(leaf));
    }

    fn connect(&mut self, connector: Connector) {
        match self.tokens.last() {
            None | Some(Predicate::GroupOpen) => {}
            Some(_) => self.tokens.push(Predicate::Connector(connector)),
        }
    }

    fn check_column(&mut self, call: &'static str, column: &str) -> bool {
        if column == "*" || !ident::is_identifier(column) {
            self.fail(QueryError::InvalidIdentifier {
                call,
                identifier: column.to_string(),
            });
            return false;
        }
        true
    }

    pub(crate) fn compare(
        mut self,
        call: &'static str,
        connector: Connector,
        column: &str,
        operator: &str,
        operand: Operand,
    ) -> Self {
        if !self.check_column(call, column) {
            return self;
        }
        let Some(operator) = Operator::parse(operator) else {
            self.fail(QueryError::UnknownOperator {
                call,
                operator: operator.to_string(),
            });
            return self;
        };
        match shape_leaf(call, column, operator, operand) {
            Ok(leaf) => self.push(connector, leaf),
            Err(e) => self.fail(e),
        }
        self
    }

    pub(crate) fn compare_columns(
        mut self,
        call: &'static str,
        connector: Connector,
        first: &str,
        operator: &str,
        second: &str,
    ) -> Self {
        if !self.check_column(call, first) || !self.check_column(call, second) {
            return self;
        }
        match Operator::parse(operator) {
            Some(op) if !op.takes_list() => self.push(
                connector,
                Leaf::Columns {
                    first: first.to_string(),
                    operator: op,
                    second: second.to_string(),
                },
            ),
            _ => self.fail(QueryError::UnknownOperator {
                call,
                operator: operator.to_string(),
            }),
        }
        self
    }

    pub(crate) fn null(
        mut self,
        call: &'static str,
        connector: Connector,
        column: &str,
        negated: bool,
    ) -> Self {
        if self.check_column(call, column) {
            self.push(
                connector,
                Leaf::Null {
                    column: column.to_string(),
                    negated,
                },
            );
        }
        self
    }

    pub(crate) fn raw(
        mut self,
        call: &'static str,
        connector: Connector,
        sql: &str,
        bindings: Vec<SqlValue>,
    ) -> Self {
        if sql.trim().is_empty() {
            self.fail(QueryError::InvalidOperand {
                call,
                reason: "raw fragment is empty".to_string(),
            });
            return self;
        }
        let markers = ident::count_markers(sql);
        if markers != bindings.len() {
            self.fail(QueryError::BindingMismatch {
                call,
                markers,
                bindings: bindings.len(),
            });
            return self;
        }
        self.push(
            connector,
            Leaf::Raw {
                sql: sql.to_string(),
                bindings,
            },
        );
        self
    }

    pub(crate) fn group(mut self, connector: Connector, inner: Self) -> Self {
        if let Some(e) = inner.error {
            self.fail(e);
            return self;
        }
        // An empty group would render as `()`
        if inner.tokens.is_empty() {
            return self;
        }
        self.connect(connector);
        self.tokens.push(Predicate::GroupOpen);
        self.tokens.extend(inner.tokens);
        self.tokens.push(Predicate::GroupClose);
        self
    }

    /// `column = value`; a list value becomes `IN`.
    #[must_use]
    pub fn where_(self, column: &str, value: impl IntoOperand) -> Self {
        self.compare("where", Connector::And, column, "=", value.into_operand())
    }

    /// `OR column = value`.
    #[must_use]
    pub fn or_where(self, column: &str, value: impl IntoOperand) -> Self {
        self.compare("or_where", Connector::Or, column, "=", value.into_operand())
    }

    /// `column <operator> value`.
    #[must_use]
    pub fn where_op(self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.compare("where", Connector::And, column, operator, value.into_operand())
    }

    /// `OR column <operator> value`.
    #[must_use]
    pub fn or_where_op(self, column: &str, operator: &str, value: impl IntoOperand) -> Self {
        self.compare("or_where", Connector::Or, column, operator, value.into_operand())
    }

    /// `column IN (...)`.
    #[must_use]
    pub fn where_in(self, column: &str, values: impl IntoOperand) -> Self {
        self.compare("where_in", Connector::And, column, "in", values.into_operand())
    }

    /// `column NOT IN (...)`.
    #[must_use]
    pub fn where_not_in(self, column: &str, values: impl IntoOperand) -> Self {
        self.compare("where_not_in", Connector::And, column, "not in", values.into_operand())
    }

    /// `column IS NULL`.
    #[must_use]
    pub fn where_null(self, column: &str) -> Self {
        self.null("where_null", Connector::And, column, false)
    }

    /// `column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(self, column: &str) -> Self {
        self.null("where_not_null", Connector::And, column, true)
    }

    /// `column BETWEEN low AND high`.
    #[must_use]
    pub fn where_between(self, column: &str, low: impl ToSqlValue, high: impl ToSqlValue) -> Self {
        let operand = Operand::List(vec![low.to_sql_value(), high.to_sql_value()]);
        self.compare("where_between", Connector::And, column, "between", operand)
    }

    /// `first <operator> second`, comparing two columns.
    #[must_use]
    pub fn where_column(self, first: &str, operator: &str, second: &str) -> Self {
        self.compare_columns("where_column", Connector::And, first, operator, second)
    }

    /// Raw fragment with `?` markers.
    #[must_use]
    pub fn where_raw(self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.raw("where_raw", Connector::And, sql, bindings)
    }

    /// `OR` raw fragment with `?` markers.
    #[must_use]
    pub fn or_where_raw(self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.raw("or_where_raw", Connector::Or, sql, bindings)
    }

    /// Parenthesized group built by `build`.
    #[must_use]
    pub fn where_group(self, build: impl FnOnce(Self) -> Self) -> Self {
        let inner = build(Self::new());
        self.group(Connector::And, inner)
    }

    /// `OR` parenthesized group built by `build`.
    #[must_use]
    pub fn or_where_group(self, build: impl FnOnce(Self) -> Self) -> Self {
        let inner = build(Self::new());
        self.group(Connector::Or, inner)
    }
}

/// Normalizes an operator/operand pair into a leaf or rejects it.
fn shape_leaf(
    call: &'static str,
    column: &str,
    operator: Operator,
    operand: Operand,
) -> Result<Leaf, QueryError> {
    let column = column.to_string();
    let invalid = |reason: String| QueryError::InvalidOperand { call, reason };
    match (operator, operand) {
        (Operator::Eq, Operand::Value(SqlValue::Null)) => Ok(Leaf::Null {
            column,
            negated: false,
        }),
        (Operator::NotEq, Operand::Value(SqlValue::Null)) => Ok(Leaf::Null {
            column,
            negated: true,
        }),
        (op, Operand::Value(SqlValue::Null)) => Err(invalid(format!(
            "NULL cannot be compared with {}",
            op.as_sql()
        ))),
        // A list with = / <> is the IN shorthand
        (Operator::Eq, Operand::List(values)) => Ok(Leaf::Compare {
            column,
            operator: Operator::In,
            operand: Operand::List(values),
        }),
        (Operator::NotEq, Operand::List(values)) => Ok(Leaf::Compare {
            column,
            operator: Operator::NotIn,
            operand: Operand::List(values),
        }),
        (op @ (Operator::In | Operator::NotIn), Operand::Value(value)) => Ok(Leaf::Compare {
            column,
            operator: op,
            operand: Operand::List(vec![value]),
        }),
        (op @ (Operator::Between | Operator::NotBetween), Operand::List(values)) => {
            if values.len() == 2 {
                Ok(Leaf::Compare {
                    column,
                    operator: op,
                    operand: Operand::List(values),
                })
            } else {
                Err(invalid(format!(
                    "{} needs exactly two values, got {}",
                    op.as_sql(),
                    values.len()
                )))
            }
        }
        (op @ (Operator::Between | Operator::NotBetween), Operand::Value(_)) => Err(invalid(
            format!("{} needs exactly two values", op.as_sql()),
        )),
        (op, Operand::List(_)) if !op.takes_list() => Err(invalid(format!(
            "{} cannot take a list of values",
            op.as_sql()
        ))),
        (op, operand) => Ok(Leaf::Compare {
            column,
            operator: op,
            operand,
        }),
    }
}
