//! Schema operations and the plan recorder used by migrations.

use super::blueprint::Blueprint;

/// One schema change, ready to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOperation {
    /// CREATE or ALTER, depending on the blueprint's mode.
    Table(Blueprint),
    /// DROP TABLE.
    Drop(String),
    /// DROP TABLE IF EXISTS.
    DropIfExists(String),
    /// Table rename.
    Rename {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Raw SQL, passed through verbatim.
    Raw(String),
}

/// Ordered list of schema operations.
///
/// Migrations describe their `up` and `down` steps by recording into a
/// plan; the migrator compiles and runs it (or prints it when pretending).
///
/// ```rust
/// use quarry_core::schema::SchemaPlan;
///
/// let mut plan = SchemaPlan::new();
/// plan.create("flights", |table| {
///     table.id();
///     table.string("name", 120);
///     table.timestamps();
/// });
/// plan.drop_if_exists("legacy_flights");
/// assert_eq!(plan.operations().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaPlan {
    operations: Vec<SchemaOperation>,
}

impl SchemaPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a CREATE TABLE built by `build`.
    pub fn create(&mut self, table: &str, build: impl FnOnce(&mut Blueprint)) -> &mut Self {
        let mut blueprint = Blueprint::create(table);
        build(&mut blueprint);
        self.operations.push(SchemaOperation::Table(blueprint));
        self
    }

    /// Records an ALTER TABLE built by `build`.
    pub fn table(&mut self, table: &str, build: impl FnOnce(&mut Blueprint)) -> &mut Self {
        let mut blueprint = Blueprint::alter(table);
        build(&mut blueprint);
        self.operations.push(SchemaOperation::Table(blueprint));
        self
    }

    /// Records DROP TABLE.
    pub fn drop(&mut self, table: &str) -> &mut Self {
        self.operations.push(SchemaOperation::Drop(table.to_string()));
        self
    }

    /// Records DROP TABLE IF EXISTS.
    pub fn drop_if_exists(&mut self, table: &str) -> &mut Self {
        self.operations
            .push(SchemaOperation::DropIfExists(table.to_string()));
        self
    }

    /// Records a table rename.
    pub fn rename(&mut self, from: &str, to: &str) -> &mut Self {
        self.operations.push(SchemaOperation::Rename {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    /// Records raw SQL.
    pub fn raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.operations.push(SchemaOperation::Raw(sql.into()));
        self
    }

    /// Recorded operations, in order.
    #[must_use]
    pub fn operations(&self) -> &[SchemaOperation] {
        &self.operations
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Consumes the plan.
    #[must_use]
    pub fn into_operations(self) -> Vec<SchemaOperation> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BlueprintMode;

    #[test]
    fn test_plan_records_in_order() {
        let mut plan = SchemaPlan::new();
        plan.create("a", |t| {
            t.id();
        })
        .table("b", |t| {
            t.drop_column("c");
        })
        .rename("b", "c")
        .raw("VACUUM");

        let ops = plan.operations();
        assert_eq!(ops.len(), 4);
        assert!(matches!(&ops[0], SchemaOperation::Table(b) if b.mode() == BlueprintMode::Create));
        assert!(matches!(&ops[1], SchemaOperation::Table(b) if b.mode() == BlueprintMode::Alter));
        assert_eq!(
            ops[2],
            SchemaOperation::Rename {
                from: "b".into(),
                to: "c".into()
            }
        );
        assert_eq!(ops[3], SchemaOperation::Raw("VACUUM".into()));
    }
}
