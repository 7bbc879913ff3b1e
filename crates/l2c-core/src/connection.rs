//! Cluster connection and statement lifecycle.
//!
//! The [`ConnectionManager`] owns the cluster handle and one session slot per
//! configured keyspace. [`ConnectionManager::ensure_ready`] connects missing
//! keyspaces and prepares their inserts; it tolerates partial availability and
//! is safe to call from any number of writer threads.
//!
//! ## Synchronization
//!
//! - Readiness lives in an atomic. `Connected` is stored with `Release` after
//!   every session and prepared statement has been published, and loaded with
//!   `Acquire` on the fast path, so a writer that sees `Connected` also sees
//!   every handle.
//! - Sessions, prepared statements and readiness are only written while the
//!   connect mutex is held. One thread does the connect/prepare work per
//!   keyspace; the others block on the mutex and then observe its result.
//! - Readers take the per-slot read locks, never the connect mutex.

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ReconnectConfig;
use crate::driver::{ClusterDriver, ClusterHandle, DriverOptions, PreparedStatement, Session};
use crate::error::{DriverError, DriverResult};
use crate::health::HealthCheck;
use crate::metrics::WriteMetrics;
use crate::model::KeyspaceSpec;
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connectivity summary across all configured keyspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Readiness {
    /// No keyspace is ready
    Disconnected = 0,
    /// Some but not all keyspaces are ready
    Partial = 1,
    /// Every keyspace has a session and every table a prepared statement
    Connected = 2,
}

impl Readiness {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => Readiness::Connected,
            1 => Readiness::Partial,
            _ => Readiness::Disconnected,
        }
    }

    fn from_counts(ready: usize, total: usize) -> Self {
        if ready == total {
            Readiness::Connected
        } else if ready > 0 {
            Readiness::Partial
        } else {
            Readiness::Disconnected
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Disconnected => write!(f, "disconnected"),
            Readiness::Partial => write!(f, "partial"),
            Readiness::Connected => write!(f, "connected"),
        }
    }
}

/// A keyspace with its session slot.
struct KeyspaceSlot {
    spec: KeyspaceSpec,
    session: RwLock<Option<Arc<dyn Session>>>,
    breaker: Option<CircuitBreaker>,
    component: String,
}

impl KeyspaceSlot {
    fn is_ready(&self) -> bool {
        self.session.read().is_some() && self.spec.all_prepared()
    }
}

/// State guarded by the connect mutex.
struct ConnectState {
    cluster: Option<Box<dyn ClusterHandle>>,
}

/// A keyspace and its live session as seen by a writer.
pub struct Route<'a> {
    /// Keyspace and its tables
    pub keyspace: &'a KeyspaceSpec,
    /// Session, absent when the keyspace is not connected
    pub session: Option<Arc<dyn Session>>,
    /// Health component name of the keyspace
    pub component: &'a str,
}

/// Owns the cluster handle and per-keyspace sessions.
pub struct ConnectionManager {
    target: String,
    slots: Vec<KeyspaceSlot>,
    readiness: AtomicU8,
    closed: AtomicBool,
    connect_lock: Mutex<ConnectState>,
    health: Arc<HealthCheck>,
    metrics: Arc<WriteMetrics>,
}

impl ConnectionManager {
    /// Current readiness.
    pub fn readiness(&self) -> Readiness {
        Readiness::from_u8(self.readiness.load(Ordering::Acquire))
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Target name.
    pub fn target_name(&self) -> &str {
        &self.target
    }

    /// Configured keyspaces in order.
    pub fn keyspaces(&self) -> impl Iterator<Item = &KeyspaceSpec> {
        self.slots.iter().map(|slot| &slot.spec)
    }

    /// Whether a keyspace has a live session and all tables prepared.
    pub fn is_keyspace_ready(&self, keyspace: &str) -> bool {
        self.slots
            .iter()
            .find(|slot| slot.spec.name() == keyspace)
            .map(KeyspaceSlot::is_ready)
            .unwrap_or(false)
    }

    /// Per-keyspace health.
    pub fn health(&self) -> &Arc<HealthCheck> {
        &self.health
    }

    /// Shared write-path metrics.
    pub fn metrics(&self) -> &Arc<WriteMetrics> {
        &self.metrics
    }

    /// Snapshot of keyspaces and their sessions, in configured order.
    pub fn routes(&self) -> Vec<Route<'_>> {
        self.slots
            .iter()
            .map(|slot| Route {
                keyspace: &slot.spec,
                session: slot.session.read().clone(),
                component: &slot.component,
            })
            .collect()
    }

    /// Connect every keyspace that is not ready and prepare its inserts.
    ///
    /// Returns the resulting readiness. Keyspaces that fail are logged and
    /// left absent; the call only fails when no keyspace is ready, or after
    /// shutdown.
    pub fn ensure_ready(&self) -> Result<Readiness> {
        if self.is_closed() {
            return Err(Error::TargetClosed(self.target.clone()));
        }
        if self.readiness() == Readiness::Connected {
            return Ok(Readiness::Connected);
        }

        let state = self.connect_lock.lock();

        if self.is_closed() {
            return Err(Error::TargetClosed(self.target.clone()));
        }
        // Another writer may have finished while we waited.
        let before = self.readiness();
        if before == Readiness::Connected {
            return Ok(Readiness::Connected);
        }
        let cluster = match state.cluster.as_ref() {
            Some(cluster) => cluster,
            None => return Err(Error::TargetClosed(self.target.clone())),
        };

        let mut ready = 0;
        for slot in &self.slots {
            if slot.is_ready() {
                ready += 1;
                continue;
            }

            if let Some(breaker) = &slot.breaker {
                if !breaker.is_allowed() {
                    debug!(
                        target_name = %self.target,
                        keyspace = %slot.spec.name(),
                        "Reconnect paused, skipping keyspace"
                    );
                    continue;
                }
            }

            match self.connect_keyspace(cluster.as_ref(), slot) {
                Ok(prepared) => {
                    ready += 1;
                    if let Some(breaker) = &slot.breaker {
                        breaker.record_success();
                    }
                    self.health.mark_healthy(&slot.component);
                    info!(
                        target_name = %self.target,
                        keyspace = %slot.spec.name(),
                        statements = prepared,
                        "Connected keyspace"
                    );
                }
                Err(e) => {
                    self.metrics.record_connect_failure();
                    if let Some(breaker) = &slot.breaker {
                        breaker.record_failure();
                    }
                    self.health
                        .mark_unhealthy(&slot.component, &e.to_string());
                    warn!(
                        target_name = %self.target,
                        keyspace = %slot.spec.name(),
                        error = %e,
                        "Failed to connect keyspace"
                    );
                }
            }
        }

        let after = Readiness::from_counts(ready, self.slots.len());
        self.readiness.store(after as u8, Ordering::Release);
        drop(state);

        if after != before {
            info!(
                target_name = %self.target,
                from = %before,
                to = %after,
                ready,
                total = self.slots.len(),
                "Readiness changed"
            );
        }

        if after == Readiness::Disconnected {
            return Err(Error::NoReachableDestinations {
                target: self.target.clone(),
                keyspaces: self.slots.len(),
            });
        }
        Ok(after)
    }

    /// Open a session for one keyspace and prepare every table.
    ///
    /// Nothing is published unless every table prepared. Caller holds the
    /// connect mutex.
    fn connect_keyspace(&self, cluster: &dyn ClusterHandle, slot: &KeyspaceSlot) -> DriverResult<usize> {
        self.metrics.record_connect_attempt();
        let session = cluster.connect(slot.spec.name())?;

        let tables = slot.spec.tables();
        let mut prepared: Vec<Arc<dyn PreparedStatement>> = Vec::with_capacity(tables.len());
        for table in tables {
            let statement = table.insert_statement();
            let result = session.prepare(&statement).and_then(|handle| {
                if handle.parameter_count() == table.columns().len() {
                    Ok(handle)
                } else {
                    Err(DriverError::Prepare {
                        statement: statement.clone(),
                        message: format!(
                            "expected {} bind markers, driver reported {}",
                            table.columns().len(),
                            handle.parameter_count()
                        ),
                    })
                }
            });
            match result {
                Ok(handle) => {
                    debug!(
                        keyspace = %slot.spec.name(),
                        table = %table.name(),
                        statement = %statement,
                        "Prepared insert"
                    );
                    prepared.push(handle);
                }
                Err(e) => {
                    session.close();
                    return Err(e);
                }
            }
        }

        if let Some(stale) = slot.session.write().replace(session) {
            stale.close();
        }
        for (table, handle) in tables.iter().zip(prepared) {
            table.set_prepared(handle);
        }
        self.metrics.record_prepared(tables.len() as u64);
        Ok(tables.len())
    }

    /// Release every session and the cluster handle.
    ///
    /// Later calls are no-ops. Every operation after shutdown fails with
    /// [`Error::TargetClosed`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut state = self.connect_lock.lock();
        for slot in &self.slots {
            if let Some(session) = slot.session.write().take() {
                session.close();
            }
            for table in slot.spec.tables() {
                table.clear_prepared();
            }
            self.health.mark_unhealthy(&slot.component, "target closed");
        }
        if let Some(cluster) = state.cluster.take() {
            cluster.shutdown();
        }
        self.readiness
            .store(Readiness::Disconnected as u8, Ordering::Release);

        info!(target_name = %self.target, "Connection manager shut down");
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("keyspaces", &self.slots.len())
            .field("readiness", &self.readiness())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    target: String,
    nodes: Vec<String>,
    options: DriverOptions,
    keyspaces: Vec<KeyspaceSpec>,
    reconnect: Option<ReconnectConfig>,
    metrics: Option<Arc<WriteMetrics>>,
}

impl ConnectionManagerBuilder {
    /// Start a builder for the named target.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            nodes: Vec::new(),
            options: DriverOptions::default(),
            keyspaces: Vec::new(),
            reconnect: None,
            metrics: None,
        }
    }

    /// Set contact points.
    pub fn nodes(mut self, nodes: Vec<String>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set driver pass-through options.
    pub fn options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a keyspace.
    pub fn keyspace(mut self, keyspace: KeyspaceSpec) -> Self {
        self.keyspaces.push(keyspace);
        self
    }

    /// Add keyspaces.
    pub fn keyspaces(mut self, keyspaces: impl IntoIterator<Item = KeyspaceSpec>) -> Self {
        self.keyspaces.extend(keyspaces);
        self
    }

    /// Enable per-keyspace reconnect throttling.
    pub fn reconnect(mut self, reconnect: Option<ReconnectConfig>) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Share a metrics instance.
    pub fn metrics(mut self, metrics: Arc<WriteMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the cluster handle and the manager.
    ///
    /// No keyspace is connected yet; that happens on the first
    /// [`ConnectionManager::ensure_ready`].
    pub fn build(self, driver: &dyn ClusterDriver) -> Result<ConnectionManager> {
        if self.keyspaces.is_empty() {
            return Err(Error::Config(format!(
                "No keyspaces configured for target {}",
                self.target
            )));
        }
        for keyspace in &self.keyspaces {
            check_keyspace(keyspace)?;
        }

        let nodes = self.nodes.join(",");
        if self.nodes.is_empty() {
            return Err(Error::ClusterBuild {
                nodes,
                source: DriverError::InvalidContactPoints("no contact points".into()),
            });
        }

        let cluster = driver
            .build_cluster(&self.nodes, &self.options)
            .map_err(|source| {
                tracing::error!(
                    target_name = %self.target,
                    nodes = %nodes,
                    error = %source,
                    "Failed to build cluster"
                );
                Error::ClusterBuild {
                    nodes: nodes.clone(),
                    source,
                }
            })?;

        let health = Arc::new(HealthCheck::new());
        let slots = self
            .keyspaces
            .into_iter()
            .map(|spec| {
                let component = HealthCheck::keyspace_component(spec.name());
                health.register_component(&component);
                let breaker = self
                    .reconnect
                    .as_ref()
                    .map(|config| CircuitBreaker::from_config(component.clone(), config));
                KeyspaceSlot {
                    spec,
                    session: RwLock::new(None),
                    breaker,
                    component,
                }
            })
            .collect::<Vec<_>>();

        info!(
            target_name = %self.target,
            nodes = %nodes,
            keyspaces = slots.len(),
            "Cluster built"
        );

        Ok(ConnectionManager {
            target: self.target,
            slots,
            readiness: AtomicU8::new(Readiness::Disconnected as u8),
            closed: AtomicBool::new(false),
            connect_lock: Mutex::new(ConnectState {
                cluster: Some(cluster),
            }),
            health,
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

/// Reject keyspaces without tables, tables without columns, and duplicate
/// table or column names.
fn check_keyspace(keyspace: &KeyspaceSpec) -> Result<()> {
    if keyspace.tables().is_empty() {
        return Err(Error::Config(format!(
            "No tables configured for keyspace {}",
            keyspace.name()
        )));
    }

    let mut table_names = HashSet::new();
    for table in keyspace.tables() {
        if !table_names.insert(table.name()) {
            return Err(Error::Config(format!(
                "Duplicate table {}.{}",
                keyspace.name(),
                table.name()
            )));
        }
        if table.columns().is_empty() {
            return Err(Error::Config(format!(
                "No columns configured for table {}.{}",
                keyspace.name(),
                table.name()
            )));
        }

        let mut column_names = HashSet::new();
        for column in table.columns() {
            if !column_names.insert(column.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate column {} in table {}.{}",
                    column.name,
                    keyspace.name(),
                    table.name()
                )));
            }
        }
    }
    Ok(())
}
