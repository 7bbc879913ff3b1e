//! Destination specs: keyspaces, tables and columns.
//!
//! Specs are built once from validated configuration and are immutable
//! afterwards, except for each table's prepared-statement slot which the
//! connection manager fills while holding its connect lock.

use crate::config::{ColumnConfig, KeyspaceConfig, TableConfig};
use crate::driver::PreparedStatement;
use crate::layout::Layout;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Scalar CQL types a rendered value can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// text
    Text,
    /// single character, stored as text
    Char,
    /// boolean
    Boolean,
    /// tinyint
    TinyInt,
    /// smallint
    SmallInt,
    /// int
    Int,
    /// bigint
    BigInt,
    /// float
    Float,
    /// double
    Double,
    /// decimal
    Decimal,
    /// timestamp
    Timestamp,
}

impl ScalarKind {
    /// Look up a kind by its configured spelling (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "varchar" | "ascii" => Self::Text,
            "char" => Self::Char,
            "boolean" | "bool" => Self::Boolean,
            "sbyte" | "byte" | "tinyint" | "int8" => Self::TinyInt,
            "int16" | "smallint" | "short" => Self::SmallInt,
            "int32" | "int" | "integer" => Self::Int,
            "int64" | "bigint" | "long" | "counter" => Self::BigInt,
            "single" | "float" => Self::Float,
            "double" => Self::Double,
            "decimal" => Self::Decimal,
            "datetime" | "timestamp" => Self::Timestamp,
            _ => return None,
        };
        Some(kind)
    }

    /// CQL type name.
    pub fn cql_name(&self) -> &'static str {
        match self {
            Self::Text | Self::Char => "text",
            Self::Boolean => "boolean",
            Self::TinyInt => "tinyint",
            Self::SmallInt => "smallint",
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Hint attached to an untyped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHint {
    /// Rendered text is a GUID; bind as uuid, nil on parse failure
    Guid,
    /// No usable type; bind the unset placeholder
    None,
}

/// How a column's rendered text becomes a bind value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    /// Convert to a scalar kind; null on conversion failure
    Typed(ScalarKind),
    /// No scalar kind declared
    RawString(RawHint),
}

impl DeclaredType {
    /// Resolve a configured `data_type` string.
    ///
    /// Returns the declared type and whether the spelling was recognized.
    pub fn resolve(data_type: Option<&str>) -> (Self, bool) {
        let Some(name) = data_type.map(str::trim).filter(|n| !n.is_empty()) else {
            return (Self::RawString(RawHint::None), true);
        };
        if name.eq_ignore_ascii_case("guid") || name.eq_ignore_ascii_case("uuid") {
            return (Self::RawString(RawHint::Guid), true);
        }
        match ScalarKind::from_name(name) {
            Some(kind) => (Self::Typed(kind), true),
            None => (Self::RawString(RawHint::None), false),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed(kind) => write!(f, "{}", kind.cql_name()),
            Self::RawString(RawHint::Guid) => write!(f, "uuid"),
            Self::RawString(RawHint::None) => write!(f, "untyped"),
        }
    }
}

/// One destination column.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column identifier
    pub name: String,
    /// Template rendered against each record
    pub layout: Layout,
    /// Conversion applied to the rendered text
    pub declared_type: DeclaredType,
}

impl ColumnSpec {
    /// Create a column spec.
    pub fn new(name: impl Into<String>, layout: Layout, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            layout,
            declared_type,
        }
    }

    /// Build from validated configuration.
    pub fn from_config(config: &ColumnConfig) -> Self {
        let (declared_type, _) = DeclaredType::resolve(config.data_type.as_deref());
        Self::new(config.name.clone(), config.layout.clone(), declared_type)
    }
}

/// One destination table and its prepared insert.
pub struct TableSpec {
    name: String,
    columns: Vec<ColumnSpec>,
    prepared: RwLock<Option<Arc<dyn PreparedStatement>>>,
}

impl TableSpec {
    /// Create a table spec with no prepared statement.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
            prepared: RwLock::new(None),
        }
    }

    /// Build from validated configuration.
    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.columns.iter().map(ColumnSpec::from_config).collect(),
        )
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in bind order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// `INSERT INTO <table> (<c1>,<c2>,...) VALUES (?,?,...)` in column order.
    pub fn insert_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let placeholders = vec!["?"; self.columns.len()].join(",");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name, columns, placeholders
        )
    }

    /// Current prepared statement, if the table has been prepared.
    pub fn prepared(&self) -> Option<Arc<dyn PreparedStatement>> {
        self.prepared.read().clone()
    }

    /// Whether a prepared statement is installed.
    pub fn is_prepared(&self) -> bool {
        self.prepared.read().is_some()
    }

    /// Install a prepared statement. Caller holds the connect lock.
    pub(crate) fn set_prepared(&self, statement: Arc<dyn PreparedStatement>) {
        *self.prepared.write() = Some(statement);
    }

    /// Drop the prepared statement. Caller holds the connect lock.
    pub(crate) fn clear_prepared(&self) {
        *self.prepared.write() = None;
    }
}

impl fmt::Debug for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSpec")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("prepared", &self.is_prepared())
            .finish()
    }
}

/// A keyspace and the tables written inside it.
#[derive(Debug)]
pub struct KeyspaceSpec {
    name: String,
    tables: Vec<TableSpec>,
}

impl KeyspaceSpec {
    /// Create a keyspace spec.
    pub fn new(name: impl Into<String>, tables: Vec<TableSpec>) -> Self {
        Self {
            name: name.into(),
            tables,
        }
    }

    /// Build from validated configuration.
    pub fn from_config(config: &KeyspaceConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.tables.iter().map(TableSpec::from_config).collect(),
        )
    }

    /// Keyspace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tables in configured order.
    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    /// True when every table has a prepared statement.
    pub fn all_prepared(&self) -> bool {
        self.tables.iter().all(TableSpec::is_prepared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnSpec {
        ColumnSpec::new(
            name,
            Layout::parse("${message}").unwrap(),
            DeclaredType::RawString(RawHint::None),
        )
    }

    #[test]
    fn test_insert_statement_shape() {
        let table = TableSpec::new("events", vec![column("id"), column("message")]);
        assert_eq!(
            table.insert_statement(),
            "INSERT INTO events (id,message) VALUES (?,?)"
        );
    }

    #[test]
    fn test_insert_statement_single_column() {
        let table = TableSpec::new("audit", vec![column("payload")]);
        assert_eq!(
            table.insert_statement(),
            "INSERT INTO audit (payload) VALUES (?)"
        );
    }

    #[test]
    fn test_declared_type_resolution() {
        assert_eq!(
            DeclaredType::resolve(None),
            (DeclaredType::RawString(RawHint::None), true)
        );
        assert_eq!(
            DeclaredType::resolve(Some("Int32")),
            (DeclaredType::Typed(ScalarKind::Int), true)
        );
        assert_eq!(
            DeclaredType::resolve(Some("timestamp")),
            (DeclaredType::Typed(ScalarKind::Timestamp), true)
        );
        assert_eq!(
            DeclaredType::resolve(Some("Guid")),
            (DeclaredType::RawString(RawHint::Guid), true)
        );
        assert_eq!(
            DeclaredType::resolve(Some("Int23")),
            (DeclaredType::RawString(RawHint::None), false)
        );
    }

    #[test]
    fn test_new_table_is_unprepared() {
        let table = TableSpec::new("events", vec![column("id")]);
        assert!(!table.is_prepared());
        assert!(table.prepared().is_none());

        let keyspace = KeyspaceSpec::new("logging", vec![table]);
        assert!(!keyspace.all_prepared());
    }
}
