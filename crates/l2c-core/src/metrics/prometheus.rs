//! Prometheus metrics export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Write-path counters shared by the connection manager and dispatcher.
#[derive(Debug, Default)]
pub struct WriteMetrics {
    /// Records handed to dispatch
    records_total: AtomicU64,
    /// Destination inserts executed successfully
    writes_succeeded: AtomicU64,
    /// Destination inserts that failed to bind or execute
    writes_failed: AtomicU64,
    /// Destinations skipped for lack of a session or prepared statement
    destinations_skipped: AtomicU64,
    /// Columns bound with a fallback value
    coercion_fallbacks: AtomicU64,
    /// Keyspace connect attempts
    connect_attempts: AtomicU64,
    /// Keyspace connect or prepare failures
    connect_failures: AtomicU64,
    /// Statements prepared
    statements_prepared: AtomicU64,
}

impl WriteMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched record.
    pub fn record_dispatch(&self) {
        self.records_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful destination write.
    pub fn record_write_success(&self) {
        self.writes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed destination write.
    pub fn record_write_failure(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record skipped destinations.
    pub fn record_skipped(&self, count: u64) {
        self.destinations_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a column bound with a fallback value.
    pub fn record_coercion_fallback(&self) {
        self.coercion_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a keyspace connect attempt.
    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed keyspace connect or prepare.
    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record prepared statements.
    pub fn record_prepared(&self, count: u64) {
        self.statements_prepared.fetch_add(count, Ordering::Relaxed);
    }

    /// Records dispatched.
    pub fn records_total(&self) -> u64 {
        self.records_total.load(Ordering::Relaxed)
    }

    /// Successful destination writes.
    pub fn writes_succeeded(&self) -> u64 {
        self.writes_succeeded.load(Ordering::Relaxed)
    }

    /// Failed destination writes.
    pub fn writes_failed(&self) -> u64 {
        self.writes_failed.load(Ordering::Relaxed)
    }

    /// Skipped destinations.
    pub fn destinations_skipped(&self) -> u64 {
        self.destinations_skipped.load(Ordering::Relaxed)
    }

    /// Columns bound with a fallback value.
    pub fn coercion_fallbacks(&self) -> u64 {
        self.coercion_fallbacks.load(Ordering::Relaxed)
    }

    /// Keyspace connect attempts.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Keyspace connect or prepare failures.
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// Statements prepared.
    pub fn statements_prepared(&self) -> u64 {
        self.statements_prepared.load(Ordering::Relaxed)
    }

    /// Export all counters in Prometheus text format with the `l2c` prefix.
    pub fn export_prometheus_text(&self) -> String {
        self.export_prometheus_text_with_prefix("l2c")
    }

    /// Export all counters in Prometheus text format.
    pub fn export_prometheus_text_with_prefix(&self, prefix: &str) -> String {
        let counters: [(&str, &str, u64); 8] = [
            (
                "records_total",
                "Log records dispatched",
                self.records_total(),
            ),
            (
                "writes_succeeded_total",
                "Destination inserts executed",
                self.writes_succeeded(),
            ),
            (
                "writes_failed_total",
                "Destination inserts that failed",
                self.writes_failed(),
            ),
            (
                "destinations_skipped_total",
                "Destinations skipped without a session or prepared statement",
                self.destinations_skipped(),
            ),
            (
                "coercion_fallbacks_total",
                "Columns bound with a fallback value",
                self.coercion_fallbacks(),
            ),
            (
                "connect_attempts_total",
                "Keyspace connect attempts",
                self.connect_attempts(),
            ),
            (
                "connect_failures_total",
                "Keyspace connect or prepare failures",
                self.connect_failures(),
            ),
            (
                "statements_prepared_total",
                "Insert statements prepared",
                self.statements_prepared(),
            ),
        ];

        let mut output = String::with_capacity(2048);
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {}_{} {}\n", prefix, name, help));
            output.push_str(&format!("# TYPE {}_{} counter\n", prefix, name));
            output.push_str(&format!("{}_{} {}\n", prefix, name, value));
            output.push('\n');
        }
        output
    }
}
