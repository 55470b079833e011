//! Error types for query execution and migrations.

use std::path::PathBuf;

use quarry_core::{CompileError, PaginationError, QueryError};

/// Errors that can occur while running queries or migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A schema blueprint could not be compiled for the connection's dialect.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A query builder carried malformed input.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Pagination input was invalid.
    #[error(transparent)]
    Pagination(#[from] PaginationError),

    /// A statement failed on the connection.
    ///
    /// Carries the SQL text and the number of bindings, never their values.
    #[error("Database error: {message} (SQL: {sql}; {bindings} binding(s))")]
    Connection {
        /// Driver error message.
        message: String,
        /// Statement that failed.
        sql: String,
        /// Number of bound values.
        bindings: usize,
    },

    /// Database error outside a statement (connecting, beginning a transaction).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration failed; units applied earlier in the batch stay recorded.
    #[error("Migration '{id}' failed in batch {batch} after applying [{}]: {source}", .applied.join(", "))]
    MigrationFailed {
        /// Identifier of the failing unit.
        id: String,
        /// Batch the run was recording into.
        batch: i64,
        /// Units of this run that were applied before the failure.
        applied: Vec<String>,
        /// Underlying failure.
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),
}

impl MigrateError {
    /// Whether the failure looks like lock contention worth retrying.
    #[must_use]
    pub fn is_concurrency_error(&self) -> bool {
        let Self::Connection { message, .. } = self else {
            return false;
        };
        let message = message.to_lowercase();
        [
            "deadlock",
            "database is locked",
            "database table is locked",
            "lock wait timeout",
            "serialization failure",
            "could not serialize access",
        ]
        .iter()
        .any(|needle| message.contains(needle))
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_hides_binding_values() {
        let err = MigrateError::Connection {
            message: "no such table: users".into(),
            sql: "SELECT * FROM \"users\" WHERE \"email\" = ?".into(),
            bindings: 1,
        };
        let text = err.to_string();
        assert!(text.contains("no such table"));
        assert!(text.contains("1 binding(s)"));
    }

    #[test]
    fn test_concurrency_detection() {
        let locked = MigrateError::Connection {
            message: "database is locked".into(),
            sql: String::new(),
            bindings: 0,
        };
        assert!(locked.is_concurrency_error());
        assert!(!MigrateError::Configuration("x".into()).is_concurrency_error());
    }
}
