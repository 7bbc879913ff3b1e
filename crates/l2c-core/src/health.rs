//! Health tracking for destination keyspaces.
//!
//! The connection manager registers one component per keyspace and marks it
//! healthy or unhealthy after every connection attempt.

use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Health status of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    /// Component is healthy
    Healthy,
    /// Component is degraded but operational
    Degraded(String),
    /// Component is unhealthy
    Unhealthy(String),
    /// Not yet checked
    Unknown,
}

/// Overall health status.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    /// All components healthy
    Healthy,
    /// Some components degraded or unhealthy, at least one healthy
    Degraded,
    /// No component is healthy
    Unhealthy,
}

/// Health registry keyed by component name.
#[derive(Default)]
pub struct HealthCheck {
    components: RwLock<BTreeMap<String, ComponentStatus>>,
}

impl HealthCheck {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Component name used for a keyspace.
    pub fn keyspace_component(keyspace: &str) -> String {
        format!("keyspace:{}", keyspace)
    }

    /// Register a component in the unknown state.
    pub fn register_component(&self, name: &str) {
        self.components
            .write()
            .insert(name.to_string(), ComponentStatus::Unknown);
    }

    /// Mark a component as healthy.
    pub fn mark_healthy(&self, name: &str) {
        self.components
            .write()
            .insert(name.to_string(), ComponentStatus::Healthy);
    }

    /// Mark a component as degraded.
    pub fn mark_degraded(&self, name: &str, reason: &str) {
        self.components.write().insert(
            name.to_string(),
            ComponentStatus::Degraded(reason.to_string()),
        );
    }

    /// Mark a component as unhealthy.
    pub fn mark_unhealthy(&self, name: &str, reason: &str) {
        self.components.write().insert(
            name.to_string(),
            ComponentStatus::Unhealthy(reason.to_string()),
        );
    }

    /// Status of one component.
    pub fn get_component_status(&self, name: &str) -> Option<ComponentStatus> {
        self.components.read().get(name).cloned()
    }

    /// All component statuses, sorted by name.
    pub fn get_all_statuses(&self) -> BTreeMap<String, ComponentStatus> {
        self.components.read().clone()
    }

    /// Overall status.
    ///
    /// Unknown components count as not healthy. An empty registry is healthy.
    pub fn overall_status(&self) -> HealthStatus {
        let components = self.components.read();
        if components.is_empty() {
            return HealthStatus::Healthy;
        }

        let healthy = components
            .values()
            .filter(|s| matches!(s, ComponentStatus::Healthy | ComponentStatus::Degraded(_)))
            .count();
        let fully_healthy = components
            .values()
            .all(|s| matches!(s, ComponentStatus::Healthy));

        if fully_healthy {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}
