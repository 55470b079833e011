//! Index and foreign key definitions.

/// Index flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Plain index.
    Index,
    /// Unique index.
    Unique,
    /// Primary key.
    Primary,
    /// Spatial index.
    Spatial,
    /// Full-text index.
    Fulltext,
}

impl IndexKind {
    /// Suffix used in generated names.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Unique => "unique",
            Self::Primary => "primary",
            Self::Spatial => "spatialindex",
            Self::Fulltext => "fulltext",
        }
    }
}

/// Builds the default constraint name `<table>_<col1>_..._<suffix>`.
///
/// Dots and dashes become underscores and the result is lowercased, so the
/// same inputs always resolve to the same name when dropping later.
#[must_use]
pub fn default_name(table: &str, columns: &[String], suffix: &str) -> String {
    let mut parts = Vec::with_capacity(columns.len() + 2);
    parts.push(table.to_string());
    parts.extend(columns.iter().cloned());
    parts.push(suffix.to_string());
    parts.join("_").replace(['-', '.'], "_").to_lowercase()
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index flavour.
    pub kind: IndexKind,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Explicit name, if any.
    pub name: Option<String>,
    /// Index method (`btree`, `hash`, `gin`...).
    pub algorithm: Option<String>,
    /// Operator class (PostgreSQL).
    pub operator_class: Option<String>,
}

impl IndexDefinition {
    /// Creates an index over the given columns.
    #[must_use]
    pub fn new(kind: IndexKind, columns: &[&str]) -> Self {
        Self {
            kind,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            name: None,
            algorithm: None,
            operator_class: None,
        }
    }

    /// Sets an explicit name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the index method.
    pub fn algorithm(&mut self, algorithm: impl Into<String>) -> &mut Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    /// Sets the operator class.
    pub fn operator_class(&mut self, class: impl Into<String>) -> &mut Self {
        self.operator_class = Some(class.into());
        self
    }

    /// Explicit name or the generated default.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_name(table, &self.columns, self.kind.suffix()))
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    /// Cascade the operation.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Restrict deletion/update.
    Restrict,
    /// No action.
    NoAction,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDefinition {
    /// Owning table.
    pub table: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns (same arity as `columns`).
    pub references_columns: Vec<String>,
    /// ON DELETE action; `None` leaves the engine default.
    pub on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action; `None` leaves the engine default.
    pub on_update: Option<ForeignKeyAction>,
    /// Explicit constraint name.
    pub name: Option<String>,
}

impl ForeignKeyDefinition {
    /// Starts a foreign key on `table` over `columns`.
    #[must_use]
    pub fn new(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            references_table: String::new(),
            references_columns: Vec::new(),
            on_delete: None,
            on_update: None,
            name: None,
        }
    }

    /// Sets the referenced columns.
    pub fn references(&mut self, columns: &[&str]) -> &mut Self {
        self.references_columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Sets the referenced table.
    pub fn on(&mut self, table: impl Into<String>) -> &mut Self {
        self.references_table = table.into();
        self
    }

    /// Sets the ON DELETE action.
    pub fn on_delete(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    pub fn on_update(&mut self, action: ForeignKeyAction) -> &mut Self {
        self.on_update = Some(action);
        self
    }

    /// Shorthand for `on_delete(Cascade)`.
    pub fn cascade_on_delete(&mut self) -> &mut Self {
        self.on_delete(ForeignKeyAction::Cascade)
    }

    /// Sets an explicit constraint name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name or `<table>_<cols>_foreign`.
    #[must_use]
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| default_name(&self.table, &self.columns, "foreign"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_index_names() {
        let idx = IndexDefinition::new(IndexKind::Unique, &["email"]);
        assert_eq!(idx.resolved_name("users"), "users_email_unique");

        let idx = IndexDefinition::new(IndexKind::Index, &["first_name", "last_name"]);
        assert_eq!(idx.resolved_name("users"), "users_first_name_last_name_index");
    }

    #[test]
    fn test_generated_names_normalize_separators() {
        assert_eq!(
            default_name("app.Users", &["Created-At".to_string()], "index"),
            "app_users_created_at_index"
        );
    }

    #[test]
    fn test_explicit_name_wins() {
        let mut idx = IndexDefinition::new(IndexKind::Index, &["a"]);
        idx.name("custom");
        assert_eq!(idx.resolved_name("t"), "custom");
    }

    #[test]
    fn test_foreign_key_builder() {
        let mut fk = ForeignKeyDefinition::new("posts", &["user_id"]);
        fk.references(&["id"]).on("users").cascade_on_delete();
        assert_eq!(fk.references_table, "users");
        assert_eq!(fk.on_delete, Some(ForeignKeyAction::Cascade));
        assert_eq!(fk.resolved_name(), "posts_user_id_foreign");
    }
}
