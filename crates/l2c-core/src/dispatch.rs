//! Fan-out of one log record to every ready destination table.
//!
//! Each table is attempted independently. Failures are collected in a
//! [`WriteFailures`] and surfaced once every destination has been tried, so a
//! failing table never stops delivery to the others.

use crate::coerce::coerce;
use crate::connection::ConnectionManager;
use crate::driver::{BoundStatement, PreparedStatement, Session};
use crate::error::{DestinationWriteError, DriverError, WriteFailures, WriteStage};
use crate::health::ComponentStatus;
use crate::layout::LogRecord;
use crate::model::{TableSpec, Value};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome counts for one successful dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Destination tables an insert was executed against
    pub written: usize,
    /// Destination tables without a session or prepared statement
    pub skipped: usize,
    /// Columns bound with a fallback value
    pub fallbacks: usize,
}

/// Writes records through a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct WriteDispatcher {
    manager: Arc<ConnectionManager>,
}

impl WriteDispatcher {
    /// Create a dispatcher over a manager.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// The underlying manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Write one record to every ready destination.
    ///
    /// Returns the summary when every attempted destination succeeded, the
    /// single [`Error::Destination`] when exactly one failed, or
    /// [`Error::Aggregated`] when several did. Destinations without a session
    /// or prepared statement are skipped, not attempted.
    pub fn dispatch(&self, record: &LogRecord) -> Result<DispatchSummary> {
        if self.manager.is_closed() {
            return Err(Error::TargetClosed(self.manager.target_name().to_string()));
        }
        self.manager.ensure_ready()?;
        self.manager.metrics().record_dispatch();
        self.deliver(record)
    }

    /// Walk the routes and write to every prepared table.
    fn deliver(&self, record: &LogRecord) -> Result<DispatchSummary> {
        let metrics = self.manager.metrics();
        let mut summary = DispatchSummary::default();
        let mut failures = WriteFailures::new();

        for route in self.manager.routes() {
            let keyspace = route.keyspace;
            let Some(session) = route.session else {
                summary.skipped += keyspace.tables().len();
                continue;
            };

            let mut written = 0;
            let mut last_error = None;
            let mut failed = 0;
            for table in keyspace.tables() {
                let Some(prepared) = table.prepared() else {
                    summary.skipped += 1;
                    continue;
                };

                let (values, fallbacks) = self.bind_values(keyspace.name(), table, record);
                summary.fallbacks += fallbacks;

                match write_row(session.as_ref(), prepared, values) {
                    Ok(()) => {
                        written += 1;
                        metrics.record_write_success();
                    }
                    Err((stage, source)) => {
                        failed += 1;
                        metrics.record_write_failure();
                        warn!(
                            target_name = %self.manager.target_name(),
                            keyspace = %keyspace.name(),
                            table = %table.name(),
                            stage = %stage,
                            error = %source,
                            "Destination write failed"
                        );
                        last_error = Some(source.to_string());
                        failures.record(DestinationWriteError::new(
                            keyspace.name(),
                            table.name(),
                            stage,
                            source,
                        ));
                    }
                }
            }
            summary.written += written;
            self.update_health(route.component, written, failed, last_error);
        }

        if summary.skipped > 0 {
            metrics.record_skipped(summary.skipped as u64);
        }
        // A shutdown racing this call clears every handle; nothing was delivered.
        if summary.written == 0 && failures.is_empty() && self.manager.is_closed() {
            return Err(Error::TargetClosed(self.manager.target_name().to_string()));
        }
        failures.finish(summary)
    }

    /// Degrade a connected keyspace whose inserts fail; restore it once they succeed.
    fn update_health(&self, component: &str, written: usize, failed: usize, last_error: Option<String>) {
        let health = self.manager.health();
        if let Some(error) = last_error {
            health.mark_degraded(
                component,
                &format!("{} of {} inserts failed: {}", failed, written + failed, error),
            );
        } else if written > 0
            && matches!(
                health.get_component_status(component),
                Some(ComponentStatus::Degraded(_))
            )
        {
            health.mark_healthy(component);
        }
    }

    /// Render and coerce every column of a table, in column order.
    fn bind_values(&self, keyspace: &str, table: &TableSpec, record: &LogRecord) -> (Vec<Value>, usize) {
        let metrics = self.manager.metrics();
        let mut fallbacks = 0;
        let values = table
            .columns()
            .iter()
            .map(|column| {
                let rendered = match column.layout.render(record) {
                    Ok(rendered) => rendered,
                    Err(e) => {
                        fallbacks += 1;
                        metrics.record_coercion_fallback();
                        debug!(
                            keyspace = %keyspace,
                            table = %table.name(),
                            column = %column.name,
                            error = %e,
                            "Render failed, binding null"
                        );
                        return Value::Null;
                    }
                };

                let coerced = coerce(&rendered, column.declared_type);
                if coerced.fell_back {
                    fallbacks += 1;
                    metrics.record_coercion_fallback();
                    debug!(
                        keyspace = %keyspace,
                        table = %table.name(),
                        column = %column.name,
                        declared_type = %column.declared_type,
                        rendered = %rendered,
                        fallback = %coerced.value,
                        "Coercion fell back"
                    );
                }
                coerced.value
            })
            .collect();
        (values, fallbacks)
    }
}

fn write_row(
    session: &dyn Session,
    prepared: Arc<dyn PreparedStatement>,
    values: Vec<Value>,
) -> std::result::Result<(), (WriteStage, DriverError)> {
    let bound = BoundStatement::bind(prepared, values).map_err(|e| (WriteStage::Bind, e))?;
    session
        .execute(&bound)
        .map_err(|e| (WriteStage::Execute, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManagerBuilder;
    use crate::driver::memory::MemoryDriver;
    use crate::layout::{Layout, Level};
    use crate::model::{ColumnSpec, DeclaredType, KeyspaceSpec, RawHint, ScalarKind};

    fn column(name: &str, layout: &str, declared: DeclaredType) -> ColumnSpec {
        ColumnSpec::new(name, Layout::parse(layout).unwrap(), declared)
    }

    fn dispatcher(driver: &MemoryDriver, tables: Vec<TableSpec>) -> WriteDispatcher {
        let manager = ConnectionManagerBuilder::new("test")
            .nodes(vec!["127.0.0.1".into()])
            .keyspace(KeyspaceSpec::new("logging", tables))
            .build(driver)
            .unwrap();
        WriteDispatcher::new(Arc::new(manager))
    }

    #[test]
    fn test_binds_columns_in_order() {
        let driver = MemoryDriver::new();
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![
                    column("level", "${level}", DeclaredType::Typed(ScalarKind::Text)),
                    column("code", "${property:code}", DeclaredType::Typed(ScalarKind::Int)),
                    column("message", "${message}", DeclaredType::Typed(ScalarKind::Text)),
                ],
            )],
        );
        let record = LogRecord::new(Level::Warn, "app", "disk full").with_property("code", 507);

        let summary = dispatcher.dispatch(&record).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.fallbacks, 0);
        assert_eq!(
            driver.rows("logging", "events"),
            vec![vec![
                Value::Text("WARN".into()),
                Value::Int(507),
                Value::Text("disk full".into()),
            ]]
        );
    }

    #[test]
    fn test_fallbacks_are_counted_not_raised() {
        let driver = MemoryDriver::new();
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![
                    column("code", "${message}", DeclaredType::Typed(ScalarKind::Int)),
                    column("extra", "${message}", DeclaredType::RawString(RawHint::None)),
                ],
            )],
        );
        let record = LogRecord::new(Level::Info, "app", "not-a-number");

        let summary = dispatcher.dispatch(&record).unwrap();
        assert_eq!(summary.fallbacks, 1);
        assert_eq!(
            driver.rows("logging", "events"),
            vec![vec![Value::Null, Value::Unset]]
        );
        assert_eq!(dispatcher.manager().metrics().coercion_fallbacks(), 1);
    }

    #[test]
    fn test_execute_failure_names_destination() {
        let driver = MemoryDriver::new();
        driver.fail_execute("logging", "events");
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![column("message", "${message}", DeclaredType::Typed(ScalarKind::Text))],
            )],
        );

        let err = dispatcher
            .dispatch(&LogRecord::new(Level::Error, "app", "boom"))
            .unwrap_err();
        match err {
            Error::Destination(failure) => {
                assert_eq!(failure.destination(), "logging.events");
                assert_eq!(failure.stage, WriteStage::Execute);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(dispatcher.manager().metrics().writes_failed(), 1);
    }

    #[test]
    fn test_closed_manager_rejects_without_driver_calls() {
        let driver = MemoryDriver::new();
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![column("message", "${message}", DeclaredType::Typed(ScalarKind::Text))],
            )],
        );
        dispatcher.manager().shutdown();
        let before = driver.total_calls();

        let err = dispatcher
            .dispatch(&LogRecord::new(Level::Info, "app", "late"))
            .unwrap_err();
        assert!(matches!(err, Error::TargetClosed(_)));
        assert_eq!(driver.total_calls(), before);
    }

    #[test]
    fn test_shutdown_during_walk_is_not_success() {
        let driver = MemoryDriver::new();
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![column("message", "${message}", DeclaredType::Typed(ScalarKind::Text))],
            )],
        );
        dispatcher.manager().ensure_ready().unwrap();
        dispatcher.manager().shutdown();

        let err = dispatcher
            .deliver(&LogRecord::new(Level::Info, "app", "raced"))
            .unwrap_err();
        assert!(matches!(err, Error::TargetClosed(_)));
        assert!(driver.rows("logging", "events").is_empty());
    }

    #[test]
    fn test_failing_inserts_degrade_keyspace() {
        let driver = MemoryDriver::new();
        driver.fail_execute("logging", "events");
        let dispatcher = dispatcher(
            &driver,
            vec![TableSpec::new(
                "events",
                vec![column("message", "${message}", DeclaredType::Typed(ScalarKind::Text))],
            )],
        );
        let record = LogRecord::new(Level::Warn, "app", "retry");

        assert!(dispatcher.dispatch(&record).is_err());
        assert!(matches!(
            dispatcher.manager().health().get_component_status("keyspace:logging"),
            Some(ComponentStatus::Degraded(_))
        ));

        driver.heal_execute("logging", "events");
        dispatcher.dispatch(&record).unwrap();
        assert_eq!(
            dispatcher.manager().health().get_component_status("keyspace:logging"),
            Some(ComponentStatus::Healthy)
        );
    }
}
