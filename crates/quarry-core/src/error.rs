//! Error types for query building, schema compilation and pagination.

use crate::dialect::Driver;

/// A blueprint or schema operation that cannot be rendered for a dialect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The active dialect has no rendering for this type or feature.
    #[error("{feature} is not supported by the {driver} dialect")]
    Unsupported {
        /// Dialect that rejected the feature.
        driver: Driver,
        /// What was requested.
        feature: String,
    },

    /// A column definition breaks one of its own invariants.
    #[error("invalid column '{column}': {reason}")]
    InvalidColumn {
        /// Column name.
        column: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An index or foreign key definition is malformed.
    #[error("invalid constraint on '{table}': {reason}")]
    InvalidConstraint {
        /// Owning table.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The blueprint as a whole cannot be compiled.
    #[error("invalid blueprint for '{table}': {reason}")]
    InvalidBlueprint {
        /// Table name.
        table: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A name could not be used as a SQL identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Malformed query builder input, detected at the call that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The operator string is not one the builder knows.
    #[error("{call}: unknown operator '{operator}'")]
    UnknownOperator {
        /// Builder method that received the operator.
        call: &'static str,
        /// The rejected operator.
        operator: String,
    },

    /// A column or table name is not a valid identifier.
    #[error("{call}: invalid identifier '{identifier}'")]
    InvalidIdentifier {
        /// Builder method that received the identifier.
        call: &'static str,
        /// The rejected identifier.
        identifier: String,
    },

    /// The operand does not fit the operator (e.g. BETWEEN with three values).
    #[error("{call}: {reason}")]
    InvalidOperand {
        /// Builder method that received the operand.
        call: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A raw fragment's `?` markers do not match its bindings.
    #[error("{call}: raw fragment has {markers} placeholder(s) but {bindings} binding(s)")]
    BindingMismatch {
        /// Builder method that received the fragment.
        call: &'static str,
        /// Number of `?` markers in the fragment.
        markers: usize,
        /// Number of bindings supplied.
        bindings: usize,
    },

    /// The statement is missing something it needs (e.g. a table).
    #[error("missing {0}")]
    Missing(&'static str),

    /// The statement cannot be built from the current state.
    #[error("{0}")]
    InvalidStatement(String),
}

/// Invalid pagination input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    /// Page numbers start at 1 and page sizes must be positive.
    #[error("invalid page request: {0}")]
    InvalidPage(String),

    /// The cursor token failed to decode or verify.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// A row did not carry the sort column needed to build the next cursor.
    #[error("row is missing cursor column '{0}'")]
    MissingCursorColumn(String),

    /// The sort column value cannot be carried in a cursor.
    #[error("cursor column '{column}' holds an unsupported {kind} value")]
    UnsupportedCursorValue {
        /// Sort column.
        column: String,
        /// Value type name.
        kind: &'static str,
    },

    /// The underlying query was malformed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Umbrella error for callers that mix the three stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Schema compilation failed.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Query building failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Pagination input was invalid.
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

/// Result type for the core crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
