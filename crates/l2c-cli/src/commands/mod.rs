//! CLI command implementations.

pub mod replay;
pub mod statements;
pub mod validate;
