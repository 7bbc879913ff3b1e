//! Statements command implementation.

use anyhow::Result;
use l2c_core::model::KeyspaceSpec;
use l2c_core::Config;

/// Print the insert generated for every table, with column types.
pub fn run(config: &Config) -> Result<()> {
    for keyspace in config.keyspaces.iter().map(KeyspaceSpec::from_config) {
        for table in keyspace.tables() {
            println!("{}: {}", keyspace.name(), table.insert_statement());
            for column in table.columns() {
                println!(
                    "  {} <- {} [{}]",
                    column.name,
                    column.layout.source(),
                    column.declared_type
                );
            }
        }
    }
    Ok(())
}
