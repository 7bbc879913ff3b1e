//! Log target lifecycle.
//!
//! Wires configuration, the connection manager and the dispatcher together:
//! - `initialize` validates config and builds the cluster handle
//! - `write` dispatches one record to every ready destination
//! - `close` releases sessions and the cluster; dropping an open target
//!   closes it

use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionManagerBuilder, Readiness};
use crate::dispatch::{DispatchSummary, WriteDispatcher};
use crate::driver::ClusterDriver;
use crate::health::HealthCheck;
use crate::layout::LogRecord;
use crate::metrics::WriteMetrics;
use crate::model::KeyspaceSpec;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// A configured log target.
pub struct LogTarget {
    name: String,
    dispatcher: WriteDispatcher,
}

impl LogTarget {
    /// Validate the configuration and build the cluster handle.
    ///
    /// No keyspace is connected until the first write.
    pub fn initialize(config: &Config, driver: &dyn ClusterDriver) -> Result<Self> {
        config.validate()?;

        let keyspaces = config.keyspaces.iter().map(KeyspaceSpec::from_config);
        let metrics = Arc::new(WriteMetrics::new());

        let manager = ConnectionManagerBuilder::new(config.target.name.clone())
            .nodes(config.node_addresses())
            .options(config.driver.options())
            .keyspaces(keyspaces)
            .reconnect(config.reconnect.clone())
            .metrics(metrics)
            .build(driver)?;

        info!(
            target_name = %config.target.name,
            keyspaces = config.keyspaces.len(),
            tables = config.keyspaces.iter().map(|k| k.tables.len()).sum::<usize>(),
            "Log target initialized"
        );

        Ok(Self {
            name: config.target.name.clone(),
            dispatcher: WriteDispatcher::new(Arc::new(manager)),
        })
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one record.
    pub fn write(&self, record: &LogRecord) -> Result<DispatchSummary> {
        self.dispatcher.dispatch(record)
    }

    /// Connect every keyspace that is not ready yet without writing.
    pub fn connect(&self) -> Result<Readiness> {
        self.manager().ensure_ready()
    }

    /// Release every session and the cluster handle. Idempotent.
    pub fn close(&self) {
        self.manager().shutdown();
    }

    /// Whether the target has been closed.
    pub fn is_closed(&self) -> bool {
        self.manager().is_closed()
    }

    /// Current readiness.
    pub fn readiness(&self) -> Readiness {
        self.manager().readiness()
    }

    /// Per-keyspace health.
    pub fn health(&self) -> &Arc<HealthCheck> {
        self.manager().health()
    }

    /// Write-path metrics.
    pub fn metrics(&self) -> &Arc<WriteMetrics> {
        self.manager().metrics()
    }

    fn manager(&self) -> &ConnectionManager {
        self.dispatcher.manager()
    }
}

impl Drop for LogTarget {
    fn drop(&mut self) {
        self.close();
    }
}
