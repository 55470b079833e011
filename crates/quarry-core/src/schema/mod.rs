//! Schema blueprints and the DDL compiler.
//!
//! Schema changes are described with a [`Blueprint`] (one table) or a
//! [`SchemaPlan`] (an ordered list of operations) and compiled to dialect
//! DDL by [`SchemaCompiler`].

mod blueprint;
mod column;
mod compiler;
mod index;
mod operation;
mod snapshot;

pub use blueprint::{Blueprint, BlueprintCommand, BlueprintMode, ConstraintRef};
pub use column::{ColumnDefinition, ColumnType, DefaultValue, IndexFlag};
pub use compiler::SchemaCompiler;
pub use index::{
    default_name, ForeignKeyAction, ForeignKeyDefinition, IndexDefinition, IndexKind,
};
pub use operation::{SchemaOperation, SchemaPlan};
pub use snapshot::{TableItem, TableSnapshot};
