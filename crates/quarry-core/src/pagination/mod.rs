//! Offset and cursor pagination layered on [`QueryBuilder`](crate::query::QueryBuilder).
//!
//! Both strategies only reshape the query and the fetched rows; running the
//! queries is left to the caller's connection.

mod cursor;
mod offset;
mod token;

pub use cursor::{CursorPage, CursorPaginator};
pub use offset::{OffsetPage, OffsetPaginator};
pub use token::CursorCodec;
