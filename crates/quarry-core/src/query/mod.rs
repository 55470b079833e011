//! Fluent query builder and its compiler.
//!
//! A [`QueryBuilder`] accumulates clause state; [`QueryBuilder::to_sql`]
//! and the `compile_*` write variants render it for a dialect in a single
//! pass, appending one binding per placeholder.

mod builder;
mod compiler;
mod join;
mod predicate;

pub use builder::{Aggregate, CursorConstraint, Direction, QueryBuilder};
pub use join::{JoinClause, JoinKind};
pub use predicate::{Conditions, Connector, IntoOperand, Leaf, Operand, Operator, Predicate};
