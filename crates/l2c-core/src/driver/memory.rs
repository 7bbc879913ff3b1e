//! In-process cluster driver.
//!
//! Stores executed rows in memory per `keyspace.table` and counts every
//! driver call. Faults can be injected per keyspace or table, which makes it
//! the driver behind dry runs and the test suites.

use super::{BoundStatement, ClusterDriver, ClusterHandle, DriverOptions, PreparedStatement, Session};
use crate::error::{DriverError, DriverResult};
use crate::model::Value;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type Destination = (String, String);

#[derive(Default)]
struct MemoryState {
    reject_contact_points: Option<String>,
    connect_faults: HashSet<String>,
    prepare_faults: HashSet<Destination>,
    execute_faults: HashSet<Destination>,
    connect_delay: Option<Duration>,

    build_calls: usize,
    connect_calls: HashMap<String, usize>,
    prepare_calls: HashMap<Destination, usize>,
    execute_calls: usize,
    open_sessions: usize,
    shut_down: bool,

    rows: BTreeMap<Destination, Vec<Vec<Value>>>,
}

/// Driver that keeps everything in memory.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDriver {
    /// Create a driver with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `build_cluster` fail with the given reason.
    pub fn reject_contact_points(&self, reason: impl Into<String>) {
        self.state.lock().reject_contact_points = Some(reason.into());
    }

    /// Make connects to a keyspace fail until healed.
    pub fn fail_connect(&self, keyspace: &str) {
        self.state.lock().connect_faults.insert(keyspace.to_string());
    }

    /// Let connects to a keyspace succeed again.
    pub fn heal_connect(&self, keyspace: &str) {
        self.state.lock().connect_faults.remove(keyspace);
    }

    /// Make preparing inserts into a table fail until healed.
    pub fn fail_prepare(&self, keyspace: &str, table: &str) {
        self.state
            .lock()
            .prepare_faults
            .insert((keyspace.to_string(), table.to_string()));
    }

    /// Let preparing inserts into a table succeed again.
    pub fn heal_prepare(&self, keyspace: &str, table: &str) {
        self.state
            .lock()
            .prepare_faults
            .remove(&(keyspace.to_string(), table.to_string()));
    }

    /// Make executing inserts into a table fail until healed.
    pub fn fail_execute(&self, keyspace: &str, table: &str) {
        self.state
            .lock()
            .execute_faults
            .insert((keyspace.to_string(), table.to_string()));
    }

    /// Let executing inserts into a table succeed again.
    pub fn heal_execute(&self, keyspace: &str, table: &str) {
        self.state
            .lock()
            .execute_faults
            .remove(&(keyspace.to_string(), table.to_string()));
    }

    /// Sleep inside every connect call.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Number of `build_cluster` calls.
    pub fn build_calls(&self) -> usize {
        self.state.lock().build_calls
    }

    /// Number of connect calls for a keyspace.
    pub fn connect_calls(&self, keyspace: &str) -> usize {
        self.state
            .lock()
            .connect_calls
            .get(keyspace)
            .copied()
            .unwrap_or(0)
    }

    /// Number of prepare calls for a table.
    pub fn prepare_calls(&self, keyspace: &str, table: &str) -> usize {
        self.state
            .lock()
            .prepare_calls
            .get(&(keyspace.to_string(), table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of prepare calls across all tables.
    pub fn total_prepare_calls(&self) -> usize {
        self.state.lock().prepare_calls.values().sum()
    }

    /// Number of execute calls, failed ones included.
    pub fn execute_calls(&self) -> usize {
        self.state.lock().execute_calls
    }

    /// Total driver calls of any kind.
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock();
        state.build_calls
            + state.connect_calls.values().sum::<usize>()
            + state.prepare_calls.values().sum::<usize>()
            + state.execute_calls
    }

    /// Rows written to a table, in execution order.
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Vec<Value>> {
        self.state
            .lock()
            .rows
            .get(&(keyspace.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Row counts keyed by `keyspace.table`.
    pub fn row_counts(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .rows
            .iter()
            .map(|((ks, table), rows)| (format!("{}.{}", ks, table), rows.len()))
            .collect()
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    /// Whether the cluster handle was shut down.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }
}

impl ClusterDriver for MemoryDriver {
    fn build_cluster(
        &self,
        contact_points: &[String],
        options: &DriverOptions,
    ) -> DriverResult<Box<dyn ClusterHandle>> {
        let mut state = self.state.lock();
        state.build_calls += 1;

        if let Some(reason) = &state.reject_contact_points {
            return Err(DriverError::InvalidContactPoints(reason.clone()));
        }
        if contact_points.is_empty() {
            return Err(DriverError::InvalidContactPoints(
                "no contact points".into(),
            ));
        }

        state.shut_down = false;
        debug!(
            nodes = ?contact_points,
            connect_timeout_ms = options.connect_timeout.as_millis() as u64,
            "Memory cluster built"
        );
        Ok(Box::new(MemoryCluster {
            state: Arc::clone(&self.state),
            connect_timeout: options.connect_timeout,
        }))
    }
}

struct MemoryCluster {
    state: Arc<Mutex<MemoryState>>,
    connect_timeout: Duration,
}

impl ClusterHandle for MemoryCluster {
    fn connect(&self, keyspace: &str) -> DriverResult<Arc<dyn Session>> {
        let delay = {
            let mut state = self.state.lock();
            *state.connect_calls.entry(keyspace.to_string()).or_insert(0) += 1;
            state.connect_delay
        };
        if let Some(delay) = delay {
            if delay > self.connect_timeout {
                std::thread::sleep(self.connect_timeout);
                return Err(DriverError::Timeout(format!(
                    "connect to keyspace {} exceeded {}ms",
                    keyspace,
                    self.connect_timeout.as_millis()
                )));
            }
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.shut_down {
            return Err(DriverError::Closed);
        }
        if state.connect_faults.contains(keyspace) {
            return Err(DriverError::Unavailable(format!(
                "keyspace {} unreachable",
                keyspace
            )));
        }
        state.open_sessions += 1;

        Ok(Arc::new(MemorySession {
            keyspace: keyspace.to_string(),
            state: Arc::clone(&self.state),
            closed: Mutex::new(false),
        }))
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.open_sessions = 0;
    }
}

struct MemorySession {
    keyspace: String,
    state: Arc<Mutex<MemoryState>>,
    closed: Mutex<bool>,
}

impl Session for MemorySession {
    fn prepare(&self, statement: &str) -> DriverResult<Arc<dyn PreparedStatement>> {
        if *self.closed.lock() {
            return Err(DriverError::Closed);
        }
        let table = table_of(statement).ok_or_else(|| DriverError::Prepare {
            statement: statement.to_string(),
            message: "not an INSERT statement".into(),
        })?;
        let destination = (self.keyspace.clone(), table.clone());

        let mut state = self.state.lock();
        *state.prepare_calls.entry(destination.clone()).or_insert(0) += 1;
        if state.prepare_faults.contains(&destination) {
            return Err(DriverError::Prepare {
                statement: statement.to_string(),
                message: format!("table {}.{} does not exist", self.keyspace, table),
            });
        }

        Ok(Arc::new(MemoryPrepared {
            keyspace: self.keyspace.clone(),
            table,
            parameter_count: super::count_bind_markers(statement),
            statement: statement.to_string(),
        }))
    }

    fn execute(&self, statement: &BoundStatement) -> DriverResult<()> {
        if *self.closed.lock() {
            return Err(DriverError::Closed);
        }
        let table = table_of(statement.statement()).ok_or_else(|| {
            DriverError::Execute(format!("unsupported statement: {}", statement.statement()))
        })?;
        let destination = (self.keyspace.clone(), table);

        let mut state = self.state.lock();
        state.execute_calls += 1;
        if state.shut_down {
            return Err(DriverError::Closed);
        }
        if state.execute_faults.contains(&destination) {
            return Err(DriverError::Execute(format!(
                "write rejected by {}.{}",
                destination.0, destination.1
            )));
        }

        debug!(
            keyspace = %destination.0,
            table = %destination.1,
            types = ?statement.values().iter().map(crate::model::Value::cql_type).collect::<Vec<_>>(),
            "Memory insert executed"
        );
        state
            .rows
            .entry(destination)
            .or_default()
            .push(statement.values().to_vec());
        Ok(())
    }

    fn close(&self) {
        let mut closed = self.closed.lock();
        if !*closed {
            *closed = true;
            let mut state = self.state.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
    }
}

struct MemoryPrepared {
    keyspace: String,
    table: String,
    parameter_count: usize,
    statement: String,
}

impl PreparedStatement for MemoryPrepared {
    fn statement(&self) -> &str {
        &self.statement
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }
}

impl std::fmt::Debug for MemoryPrepared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryPrepared({}.{})", self.keyspace, self.table)
    }
}

/// Table name from `INSERT INTO <table> (...)`.
fn table_of(statement: &str) -> Option<String> {
    let mut words = statement.split_whitespace();
    let insert = words.next()?;
    let into = words.next()?;
    if !insert.eq_ignore_ascii_case("insert") || !into.eq_ignore_ascii_case("into") {
        return None;
    }
    let table = words.next()?;
    let table = table.split('(').next().unwrap_or(table);
    if table.is_empty() {
        None
    } else {
        Some(table.to_string())
    }
}
