//! Configuration structures for l2c.
//!
//! Configuration is loaded from TOML files and validated before any
//! connection attempt. Node, keyspace, table and column lists are ordered;
//! column order fixes bind-marker order in the generated inserts.

use crate::driver::DriverOptions;
use crate::layout::Layout;
use crate::model::DeclaredType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Target identity
    #[serde(default)]
    pub target: TargetConfig,

    /// Cluster contact points
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Destination keyspaces
    #[serde(default)]
    pub keyspaces: Vec<KeyspaceConfig>,

    /// Options passed through to the cluster driver
    #[serde(default)]
    pub driver: DriverConfig,

    /// Reconnect throttling (disabled when absent)
    #[serde(default)]
    pub reconnect: Option<ReconnectConfig>,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Target identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Name used in logs and errors
    #[serde(default = "default_target_name")]
    pub name: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: default_target_name(),
        }
    }
}

/// A cluster contact point.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeConfig {
    /// Host or host:port
    pub address: String,
}

/// A destination keyspace.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyspaceConfig {
    /// Keyspace name
    pub name: String,

    /// Tables written in this keyspace
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// A destination table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    /// Table name
    pub name: String,

    /// Columns in bind order
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
}

/// A destination column.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnConfig {
    /// Column name
    pub name: String,

    /// Template rendered against each record
    pub layout: Layout,

    /// Declared scalar type; absent means untyped
    #[serde(default)]
    pub data_type: Option<String>,
}

/// Driver pass-through options.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DriverConfig {
    /// Options handed to the driver when building the cluster.
    pub fn options(&self) -> DriverOptions {
        DriverOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

/// Reconnect throttling for unreachable keyspaces.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ReconnectConfig {
    /// Consecutive failures before attempts are paused
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Pause length in milliseconds
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Filter directive for this level.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_target_name() -> String {
    "cassandra".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    12_000
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Contact point addresses in configured order.
    pub fn node_addresses(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.address.trim().to_string()).collect()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        let target = &self.target.name;

        if self.nodes.is_empty() {
            return Err(crate::Error::Config(format!(
                "No nodes configured for target {}",
                target
            )));
        }
        if self.nodes.iter().any(|n| n.address.trim().is_empty()) {
            return Err(crate::Error::Config(format!(
                "Blank node address for target {}",
                target
            )));
        }

        if self.keyspaces.is_empty() {
            return Err(crate::Error::Config(format!(
                "No keyspaces configured for target {}",
                target
            )));
        }

        let mut keyspace_names = HashSet::new();
        for keyspace in &self.keyspaces {
            check_identifier("keyspace", &keyspace.name)?;
            if !keyspace_names.insert(keyspace.name.as_str()) {
                return Err(crate::Error::Config(format!(
                    "Duplicate keyspace {}",
                    keyspace.name
                )));
            }
            if keyspace.tables.is_empty() {
                return Err(crate::Error::Config(format!(
                    "No tables configured for target {} keyspace {}",
                    target, keyspace.name
                )));
            }

            let mut table_names = HashSet::new();
            for table in &keyspace.tables {
                check_identifier("table", &table.name)?;
                if !table_names.insert(table.name.as_str()) {
                    return Err(crate::Error::Config(format!(
                        "Duplicate table {}.{}",
                        keyspace.name, table.name
                    )));
                }
                if table.columns.is_empty() {
                    return Err(crate::Error::Config(format!(
                        "No columns configured for table {}.{}",
                        keyspace.name, table.name
                    )));
                }

                let mut column_names = HashSet::new();
                for column in &table.columns {
                    check_identifier("column", &column.name)?;
                    if !column_names.insert(column.name.as_str()) {
                        return Err(crate::Error::Config(format!(
                            "Duplicate column {} in table {}.{}",
                            column.name, keyspace.name, table.name
                        )));
                    }
                    let (_, recognized) = DeclaredType::resolve(column.data_type.as_deref());
                    if !recognized {
                        tracing::warn!(
                            keyspace = %keyspace.name,
                            table = %table.name,
                            column = %column.name,
                            data_type = ?column.data_type,
                            "Unrecognized data type, column will be written unset"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Accept plain CQL identifiers or double-quoted ones.
fn check_identifier(kind: &str, name: &str) -> crate::Result<()> {
    let valid = if let Some(inner) = name
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        !inner.is_empty() && !inner.contains('"')
    } else {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    if valid {
        Ok(())
    } else {
        Err(crate::Error::Config(format!(
            "Invalid {} name `{}`",
            kind, name
        )))
    }
}
