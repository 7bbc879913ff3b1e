//! Replay command implementation.
//!
//! Reads JSON-lines log records and writes them through a target backed by
//! the in-memory driver, then prints what each table received.

use anyhow::{Context, Result};
use l2c_core::driver::memory::MemoryDriver;
use l2c_core::health::ComponentStatus;
use l2c_core::{Config, LogRecord, LogTarget};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Totals for one replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Non-blank input lines
    pub records: usize,
    /// Records that did not parse
    pub invalid: usize,
    /// Records every ready destination accepted
    pub delivered: usize,
    /// Records with at least one failed destination
    pub failed: usize,
    /// Destination inserts executed
    pub writes: usize,
    /// Last write error
    pub last_error: Option<l2c_core::Error>,
}

/// Replay records from a file or stdin.
pub fn run(config: &Config, input: Option<&Path>, unreachable: &[String]) -> Result<()> {
    let driver = MemoryDriver::new();
    for keyspace in unreachable {
        driver.fail_connect(keyspace);
    }

    let target = LogTarget::initialize(config, &driver)?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    info!(
        target_name = %target.name(),
        input = %input.map(|p| p.display().to_string()).unwrap_or_else(|| "stdin".into()),
        "Replaying log records"
    );

    let report = replay_records(&target, reader)?;

    println!("Replay completed:");
    println!("  Records:   {}", report.records);
    println!("  Delivered: {}", report.delivered);
    println!("  Failed:    {}", report.failed);
    println!("  Invalid:   {}", report.invalid);
    println!("  Inserts:   {}", report.writes);

    println!("\nRows per table:");
    let rows = driver.row_counts();
    if rows.is_empty() {
        println!("  (none)");
    }
    for (destination, count) in rows {
        println!("  {}: {}", destination, count);
    }

    println!("\nKeyspaces:");
    for (name, status) in target.health().get_all_statuses() {
        match status {
            ComponentStatus::Healthy => println!("  [OK] {}", name),
            ComponentStatus::Degraded(msg) => println!("  [WARN] {}: {}", name, msg),
            ComponentStatus::Unhealthy(msg) => println!("  [FAIL] {}: {}", name, msg),
            ComponentStatus::Unknown => println!("  [?] {}", name),
        }
    }

    println!("\n--- Metrics ---");
    print!("{}", target.metrics().export_prometheus_text());

    target.close();

    match report.last_error {
        Some(e) => Err(anyhow::Error::new(e).context(format!(
            "{} of {} records failed to write",
            report.failed, report.records
        ))),
        None => Ok(()),
    }
}

/// Write every record read from `reader` through `target`.
///
/// Unparseable lines and failed writes are counted and logged; replay
/// continues with the next line.
pub fn replay_records(target: &LogTarget, reader: impl BufRead) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        report.records += 1;

        let record: LogRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                report.invalid += 1;
                warn!(line = index + 1, error = %e, "Skipping invalid log record");
                continue;
            }
        };

        match target.write(&record) {
            Ok(summary) => {
                report.delivered += 1;
                report.writes += summary.written;
            }
            Err(e) => {
                report.failed += 1;
                warn!(line = index + 1, error = %e, "Record not fully delivered");
                report.last_error = Some(e);
            }
        }
    }

    Ok(report)
}
