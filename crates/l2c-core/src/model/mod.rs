//! Destination data model.

mod spec;
mod value;

pub use spec::{ColumnSpec, DeclaredType, KeyspaceSpec, RawHint, ScalarKind, TableSpec};
pub use value::Value;
