//! Cluster driver capability.
//!
//! The write path talks to the cluster only through these traits. Wire
//! protocol, pooling, retries and load balancing belong to the driver:
//!
//! - [`ClusterDriver`]: builds a cluster handle from contact points
//! - [`ClusterHandle`]: opens one session per keyspace
//! - [`Session`]: prepares and executes statements
//! - [`PreparedStatement`]: a parsed insert that values are bound to
//!
//! All calls are blocking and may be made from many threads at once.

pub mod memory;

use crate::error::{DriverError, DriverResult};
use crate::model::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Options passed through to the driver when building a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverOptions {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            request_timeout: Duration::from_millis(12_000),
        }
    }
}

/// Factory for cluster handles.
pub trait ClusterDriver: Send + Sync {
    /// Build a cluster handle from contact points.
    fn build_cluster(
        &self,
        contact_points: &[String],
        options: &DriverOptions,
    ) -> DriverResult<Box<dyn ClusterHandle>>;
}

/// A cluster connection from which keyspace sessions are opened.
pub trait ClusterHandle: Send + Sync {
    /// Open a session bound to a keyspace.
    fn connect(&self, keyspace: &str) -> DriverResult<Arc<dyn Session>>;

    /// Release the cluster and everything opened from it.
    fn shutdown(&self);
}

/// A live session scoped to one keyspace.
pub trait Session: Send + Sync {
    /// Prepare a statement for repeated execution.
    fn prepare(&self, statement: &str) -> DriverResult<Arc<dyn PreparedStatement>>;

    /// Execute a bound statement.
    fn execute(&self, statement: &BoundStatement) -> DriverResult<()>;

    /// Release the session.
    fn close(&self);
}

/// A prepared, parameterized statement.
pub trait PreparedStatement: Send + Sync {
    /// Statement text this handle was prepared from.
    fn statement(&self) -> &str;

    /// Number of positional bind markers.
    fn parameter_count(&self) -> usize;
}

/// A prepared statement with its positional values, ready to execute.
#[derive(Clone)]
pub struct BoundStatement {
    prepared: Arc<dyn PreparedStatement>,
    values: Vec<Value>,
}

impl BoundStatement {
    /// Bind values positionally, checking the marker count.
    pub fn bind(prepared: Arc<dyn PreparedStatement>, values: Vec<Value>) -> DriverResult<Self> {
        let expected = prepared.parameter_count();
        if values.len() != expected {
            return Err(DriverError::Bind {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { prepared, values })
    }

    /// The prepared statement being executed.
    pub fn prepared(&self) -> &Arc<dyn PreparedStatement> {
        &self.prepared
    }

    /// Statement text.
    pub fn statement(&self) -> &str {
        self.prepared.statement()
    }

    /// Bound values in marker order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Debug for BoundStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundStatement")
            .field("statement", &self.statement())
            .field("values", &self.values)
            .finish()
    }
}

/// Number of `?` bind markers in a statement, ignoring quoted text.
pub fn count_bind_markers(statement: &str) -> usize {
    let mut count = 0;
    let mut in_quote = false;
    for c in statement.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '?' if !in_quote => count += 1,
            _ => {}
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stmt(String);

    impl PreparedStatement for Stmt {
        fn statement(&self) -> &str {
            &self.0
        }

        fn parameter_count(&self) -> usize {
            count_bind_markers(&self.0)
        }
    }

    #[test]
    fn test_count_bind_markers() {
        assert_eq!(
            count_bind_markers("INSERT INTO events (id,message) VALUES (?,?)"),
            2
        );
        assert_eq!(count_bind_markers("INSERT INTO t (a) VALUES ('?')"), 0);
    }

    #[test]
    fn test_bind_checks_parameter_count() {
        let prepared: Arc<dyn PreparedStatement> =
            Arc::new(Stmt("INSERT INTO events (id,message) VALUES (?,?)".into()));

        let bound = BoundStatement::bind(prepared.clone(), vec![Value::Null, Value::Unset]).unwrap();
        assert_eq!(bound.values().len(), 2);

        let err = BoundStatement::bind(prepared, vec![Value::Null]).unwrap_err();
        assert_eq!(
            err,
            DriverError::Bind {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_default_options() {
        let options = DriverOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.request_timeout, Duration::from_secs(12));
    }
}
