//! # quarry-core
//!
//! A dialect-aware SQL query builder and schema compiler.
//!
//! This crate provides:
//! - A fluent query builder compiled to parameterized SQL for SQLite,
//!   PostgreSQL, MySQL and SQL Server
//! - Table blueprints compiled to ordered DDL statements
//! - Offset and cursor pagination on top of the builder
//!
//! Nothing here performs I/O. Compiled statements are handed to a
//! connection by the caller (see the `quarry-migrate` crate).
//!
//! ## Building Queries
//!
//! ```rust
//! use quarry_core::dialect::Driver;
//! use quarry_core::query::QueryBuilder;
//!
//! let user_input = "'; DROP TABLE users; --";
//! let (sql, params) = QueryBuilder::table("users")
//!     .select(&["id"])
//!     .where_("name", user_input)
//!     .to_sql(Driver::Sqlite.dialect())
//!     .unwrap();
//!
//! assert_eq!(sql, "SELECT \"id\" FROM \"users\" WHERE \"name\" = ?");
//! assert_eq!(params.len(), 1);
//! ```
//!
//! ## Compiling Schema Changes
//!
//! ```rust
//! use quarry_core::dialect::Driver;
//! use quarry_core::schema::{Blueprint, SchemaCompiler};
//!
//! let mut users = Blueprint::create("users");
//! users.id();
//! users.string("email", 255).unique();
//!
//! let statements = SchemaCompiler::new(Driver::Sqlite.dialect())
//!     .compile(&users)
//!     .unwrap();
//! assert_eq!(statements.len(), 2);
//! assert!(statements[1].starts_with("CREATE UNIQUE INDEX"));
//! ```

pub mod dialect;
pub mod error;
pub mod ident;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod value;

pub use dialect::{Dialect, Driver};
pub use error::{CompileError, Error, PaginationError, QueryError, Result};
pub use pagination::{CursorPage, CursorPaginator, OffsetPage, OffsetPaginator};
pub use query::{Direction, QueryBuilder};
pub use schema::{Blueprint, SchemaCompiler, SchemaPlan};
pub use value::{row, Row, SqlValue, ToSqlValue};
