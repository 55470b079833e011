//! Column definitions.
//!
//! A [`ColumnDefinition`] is a value object: a name, a logical
//! [`ColumnType`] and modifiers. Blueprint methods hand out `&mut`
//! references so modifiers chain in place:
//!
//! ```rust
//! use quarry_core::schema::Blueprint;
//!
//! let mut table = Blueprint::create("users");
//! table.string("email", 255).unique().comment("login name");
//! table.integer("age").unsigned().nullable();
//! ```

use crate::value::{SqlValue, ToSqlValue};

/// Logical column type, independent of any dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    /// 8-bit integer.
    TinyInteger,
    /// 16-bit integer.
    SmallInteger,
    /// 24-bit integer (MySQL); other engines fall back to a wider type.
    MediumInteger,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Fixed-length string.
    Char(u32),
    /// Bounded variable-length string.
    String(u32),
    /// Unbounded text.
    Text,
    /// Medium text (MySQL); other engines use their text type.
    MediumText,
    /// Long text (MySQL); other engines use their text type.
    LongText,
    /// Exact decimal.
    Decimal {
        /// Total digits.
        precision: u8,
        /// Digits after the decimal point.
        scale: u8,
    },
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time without zone.
    DateTime,
    /// Timestamp.
    Timestamp,
    /// Timestamp with time zone.
    TimestampTz,
    /// JSON document.
    Json,
    /// Binary JSON (PostgreSQL only).
    Jsonb,
    /// UUID.
    Uuid,
    /// Binary data.
    Binary,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
}

impl ColumnType {
    /// Returns true for the integer family.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInteger
                | Self::SmallInteger
                | Self::MediumInteger
                | Self::Integer
                | Self::BigInteger
        )
    }

    /// Returns true for types where `unsigned` means anything.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Decimal { .. } | Self::Float | Self::Double)
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal, rendered with escaping.
    Literal(SqlValue),
    /// Raw SQL expression (e.g. `CURRENT_TIMESTAMP`), rendered verbatim.
    Raw(String),
}

/// Fluent index flag set directly on a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexFlag {
    /// Name generated from table, column and kind.
    Generated,
    /// Explicit name.
    Named(String),
}

impl IndexFlag {
    pub(crate) fn name(&self) -> Option<String> {
        match self {
            Self::Generated => None,
            Self::Named(name) => Some(name.clone()),
        }
    }
}

/// A complete column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed. Columns are NOT NULL unless marked.
    pub nullable: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Unsigned numeric.
    pub unsigned: bool,
    /// Auto-incrementing integer.
    pub auto_increment: bool,
    /// Auto-increment columns are the primary key unless this is set.
    pub suppress_primary: bool,
    /// Fluent primary key flag.
    pub primary: Option<IndexFlag>,
    /// Fluent unique index flag.
    pub unique: Option<IndexFlag>,
    /// Fluent plain index flag.
    pub index: Option<IndexFlag>,
    /// Column comment.
    pub comment: Option<String>,
    /// Advisory placement: put this column after another.
    pub after: Option<String>,
    /// On ALTER, modify the existing column instead of adding it.
    pub change: bool,
}

impl ColumnDefinition {
    /// Creates a NOT NULL column with no modifiers.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
            unsigned: false,
            auto_increment: false,
            suppress_primary: false,
            primary: None,
            unique: None,
            index: None,
            comment: None,
            after: None,
            change: false,
        }
    }

    /// Allows NULL.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Sets a literal default.
    pub fn default(&mut self, value: impl ToSqlValue) -> &mut Self {
        self.default = Some(DefaultValue::Literal(value.to_sql_value()));
        self
    }

    /// Sets a raw SQL default expression.
    pub fn default_raw(&mut self, expr: impl Into<String>) -> &mut Self {
        self.default = Some(DefaultValue::Raw(expr.into()));
        self
    }

    /// Shorthand for `default_raw("CURRENT_TIMESTAMP")`.
    pub fn use_current(&mut self) -> &mut Self {
        self.default_raw("CURRENT_TIMESTAMP")
    }

    /// Marks the column unsigned.
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Marks the column auto-incrementing (implies primary key).
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    /// Keeps an auto-increment column out of the primary key.
    pub fn without_primary(&mut self) -> &mut Self {
        self.suppress_primary = true;
        self
    }

    /// Makes this column the primary key.
    pub fn primary(&mut self) -> &mut Self {
        self.primary = Some(IndexFlag::Generated);
        self
    }

    /// Adds a unique index on this column.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = Some(IndexFlag::Generated);
        self
    }

    /// Adds a unique index with an explicit name.
    pub fn unique_as(&mut self, name: impl Into<String>) -> &mut Self {
        self.unique = Some(IndexFlag::Named(name.into()));
        self
    }

    /// Adds a plain index on this column.
    pub fn index(&mut self) -> &mut Self {
        self.index = Some(IndexFlag::Generated);
        self
    }

    /// Adds a plain index with an explicit name.
    pub fn index_as(&mut self, name: impl Into<String>) -> &mut Self {
        self.index = Some(IndexFlag::Named(name.into()));
        self
    }

    /// Sets the column comment.
    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// Places the column after another (MySQL only; ignored elsewhere).
    pub fn after(&mut self, column: impl Into<String>) -> &mut Self {
        self.after = Some(column.into());
        self
    }

    /// On ALTER, modifies the existing column to this definition.
    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }

    /// Whether this column is rendered as an inline auto-increment primary key.
    #[must_use]
    pub const fn is_inline_primary(&self) -> bool {
        self.auto_increment && !self.suppress_primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_default_to_not_null() {
        let col = ColumnDefinition::new("id", ColumnType::Integer);
        assert!(!col.nullable);
        assert!(col.default.is_none());
    }

    #[test]
    fn test_modifiers_chain_in_place() {
        let mut col = ColumnDefinition::new("email", ColumnType::String(255));
        col.nullable().unique().comment("contact").default("n/a");
        assert!(col.nullable);
        assert_eq!(col.unique, Some(IndexFlag::Generated));
        assert_eq!(col.comment.as_deref(), Some("contact"));
        assert_eq!(
            col.default,
            Some(DefaultValue::Literal(SqlValue::Text("n/a".into())))
        );
    }

    #[test]
    fn test_auto_increment_implies_primary_unless_suppressed() {
        let mut col = ColumnDefinition::new("id", ColumnType::BigInteger);
        col.auto_increment();
        assert!(col.is_inline_primary());
        col.without_primary();
        assert!(!col.is_inline_primary());
    }

    #[test]
    fn test_type_families() {
        assert!(ColumnType::MediumInteger.is_integer());
        assert!(!ColumnType::Double.is_integer());
        assert!(ColumnType::Double.is_numeric());
        assert!(!ColumnType::Text.is_numeric());
    }
}
