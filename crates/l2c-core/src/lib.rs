//! L2C Core - structured log delivery to Cassandra-style column stores
//!
//! This library renders each log record into the columns of one or more
//! destination tables, spread across keyspaces, and writes it with prepared
//! inserts:
//!
//! - Lazy, thread-safe connection and statement preparation
//! - Partial connectivity: reachable keyspaces keep receiving writes
//! - Failure isolation: every destination is attempted, failures aggregated
//! - Best-effort type coercion of rendered column values

pub mod circuit_breaker;
pub mod coerce;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod health;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod target;

// Re-export commonly used types
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionManagerBuilder, Readiness};
pub use dispatch::{DispatchSummary, WriteDispatcher};
pub use error::{AggregatedWriteError, DestinationWriteError, DriverError, WriteStage};
pub use error::{Error, Result};
pub use layout::{Layout, Level, LogRecord};
pub use target::LogTarget;
