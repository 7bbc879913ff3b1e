//! Validate command implementation.

use anyhow::Result;
use l2c_core::model::KeyspaceSpec;
use l2c_core::Config;

/// Report a configuration that already passed validation.
pub fn run(config: &Config) -> Result<()> {
    config.validate()?;

    println!("Configuration is valid");
    println!("  Target:    {}", config.target.name);
    println!("  Nodes:     {}", config.node_addresses().join(", "));
    for keyspace in config.keyspaces.iter().map(KeyspaceSpec::from_config) {
        let columns: usize = keyspace.tables().iter().map(|t| t.columns().len()).sum();
        println!(
            "  Keyspace:  {} ({} tables, {} columns)",
            keyspace.name(),
            keyspace.tables().len(),
            columns
        );
    }
    if let Some(reconnect) = &config.reconnect {
        println!(
            "  Reconnect: pause after {} failures for {}ms",
            reconnect.failure_threshold, reconnect.reset_timeout_ms
        );
    }
    Ok(())
}
