//! Integration tests for l2c-core.
//!
//! Every test runs against the in-memory driver with injected faults, so no
//! cluster is needed.

use l2c_core::driver::memory::MemoryDriver;
use l2c_core::health::{ComponentStatus, HealthStatus};
use l2c_core::model::Value;
use l2c_core::{Config, Error, Level, LogRecord, LogTarget, Readiness, WriteStage};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

const GUID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

/// Two keyspaces: `logging` with three tables and `audit` with one.
const MULTI_TABLE_CONFIG: &str = r#"
[target]
name = "integration"

[[nodes]]
address = "10.0.0.1:9042"

[[nodes]]
address = "10.0.0.2:9042"

[[keyspaces]]
name = "logging"

[[keyspaces.tables]]
name = "events"

[[keyspaces.tables.columns]]
name = "id"
layout = "${property:request_id}"
data_type = "guid"

[[keyspaces.tables.columns]]
name = "message"
layout = "${message}"

[[keyspaces.tables]]
name = "errors"

[[keyspaces.tables.columns]]
name = "level"
layout = "${level}"
data_type = "text"

[[keyspaces.tables.columns]]
name = "code"
layout = "${property:code}"
data_type = "int"

[[keyspaces.tables]]
name = "traces"

[[keyspaces.tables.columns]]
name = "logger"
layout = "${logger}"
data_type = "text"

[[keyspaces]]
name = "audit"

[[keyspaces.tables]]
name = "entries"

[[keyspaces.tables.columns]]
name = "at"
layout = "${longdate}"
data_type = "timestamp"

[[keyspaces.tables.columns]]
name = "message"
layout = "${message}"
data_type = "text"
"#;

fn config() -> Config {
    Config::from_toml(MULTI_TABLE_CONFIG).unwrap()
}

fn record(message: &str) -> LogRecord {
    LogRecord::new(Level::Error, "app.orders", message)
        .with_property("request_id", GUID)
        .with_property("code", 42)
}

mod preparation {
    use super::*;

    /// Repeated readiness checks prepare each table exactly once.
    #[test]
    fn test_idempotent_preparation() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        for _ in 0..5 {
            assert_eq!(target.connect().unwrap(), Readiness::Connected);
        }

        for (keyspace, table) in [
            ("logging", "events"),
            ("logging", "errors"),
            ("logging", "traces"),
            ("audit", "entries"),
        ] {
            assert_eq!(driver.prepare_calls(keyspace, table), 1, "{keyspace}.{table}");
        }
        assert_eq!(driver.connect_calls("logging"), 1);
        assert_eq!(driver.connect_calls("audit"), 1);
        assert_eq!(target.metrics().statements_prepared(), 4);
    }

    /// Writes after the first do not prepare again.
    #[test]
    fn test_writes_reuse_prepared_statements() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        for i in 0..10 {
            target.write(&record(&format!("message {i}"))).unwrap();
        }
        assert_eq!(driver.total_prepare_calls(), 4);
        assert_eq!(driver.rows("logging", "events").len(), 10);
    }

    /// Insert text follows the configured column order.
    #[test]
    fn test_statement_shape() {
        let config = config();
        let keyspace = l2c_core::model::KeyspaceSpec::from_config(&config.keyspaces[0]);
        let statements: Vec<_> = keyspace
            .tables()
            .iter()
            .map(|t| t.insert_statement())
            .collect();
        assert_eq!(
            statements,
            vec![
                "INSERT INTO events (id,message) VALUES (?,?)",
                "INSERT INTO errors (level,code) VALUES (?,?)",
                "INSERT INTO traces (logger) VALUES (?)",
            ]
        );
    }
}

mod partial_connectivity {
    use super::*;

    #[test]
    fn test_unreachable_keyspace_is_skipped() {
        let driver = MemoryDriver::new();
        driver.fail_connect("audit");
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let summary = target.write(&record("partial")).unwrap();
        assert_eq!(target.readiness(), Readiness::Partial);
        assert_eq!(summary.written, 3);
        assert_eq!(summary.skipped, 1);

        // audit has no session, so nothing was executed against it
        assert_eq!(driver.execute_calls(), 3);
        assert!(driver.rows("audit", "entries").is_empty());
        assert_eq!(driver.rows("logging", "errors").len(), 1);

        assert_eq!(target.health().overall_status(), HealthStatus::Degraded);
        assert!(matches!(
            target.health().get_component_status("keyspace:audit"),
            Some(ComponentStatus::Unhealthy(_))
        ));
    }

    #[test]
    fn test_recovered_keyspace_joins_on_next_write() {
        let driver = MemoryDriver::new();
        driver.fail_connect("audit");
        let target = LogTarget::initialize(&config(), &driver).unwrap();
        target.write(&record("first")).unwrap();

        driver.heal_connect("audit");
        let summary = target.write(&record("second")).unwrap();
        assert_eq!(target.readiness(), Readiness::Connected);
        assert_eq!(summary.written, 4);
        assert_eq!(driver.rows("audit", "entries").len(), 1);

        // logging was not reconnected or re-prepared
        assert_eq!(driver.connect_calls("logging"), 1);
        assert_eq!(driver.prepare_calls("logging", "events"), 1);
        assert_eq!(target.health().overall_status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_prepare_failure_keeps_keyspace_absent() {
        let driver = MemoryDriver::new();
        driver.fail_prepare("logging", "traces");
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let summary = target.write(&record("no traces")).unwrap();
        assert_eq!(target.readiness(), Readiness::Partial);
        // none of logging's tables is written, even those that prepared
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 3);
        assert!(driver.rows("logging", "events").is_empty());
        assert_eq!(driver.open_sessions(), 1);
    }

    #[test]
    fn test_no_reachable_destinations_then_retry() {
        let driver = MemoryDriver::new();
        driver.fail_connect("logging");
        driver.fail_connect("audit");
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let err = target.write(&record("lost")).unwrap_err();
        assert!(matches!(
            err,
            Error::NoReachableDestinations { keyspaces: 2, .. }
        ));
        assert_eq!(target.readiness(), Readiness::Disconnected);
        assert_eq!(driver.execute_calls(), 0);

        driver.heal_connect("logging");
        driver.heal_connect("audit");
        assert_eq!(target.write(&record("found")).unwrap().written, 4);
        assert_eq!(driver.connect_calls("logging"), 2);
    }
}

mod isolation {
    use super::*;

    /// A failing middle table does not stop the tables around it.
    #[test]
    fn test_single_failure_is_isolated() {
        let driver = MemoryDriver::new();
        driver.fail_execute("logging", "errors");
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let err = target.write(&record("isolated")).unwrap_err();
        assert_eq!(driver.rows("logging", "events").len(), 1);
        assert_eq!(driver.rows("logging", "traces").len(), 1);
        assert_eq!(driver.rows("audit", "entries").len(), 1);

        match err {
            Error::Destination(failure) => {
                assert_eq!(failure.keyspace, "logging");
                assert_eq!(failure.table, "errors");
                assert_eq!(failure.stage, WriteStage::Execute);
            }
            other => panic!("expected a single destination error, got {other:?}"),
        }
        assert_eq!(target.metrics().writes_succeeded(), 3);
        assert_eq!(target.metrics().writes_failed(), 1);
    }

    #[test]
    fn test_multiple_failures_are_aggregated() {
        let driver = MemoryDriver::new();
        driver.fail_execute("logging", "events");
        driver.fail_execute("audit", "entries");
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let err = target.write(&record("aggregate")).unwrap_err();
        let failures = match &err {
            Error::Aggregated(aggregated) => aggregated.failures(),
            other => panic!("expected an aggregated error, got {other:?}"),
        };
        assert_eq!(failures.len(), 2);
        let destinations: Vec<_> = failures.iter().map(|f| f.destination()).collect();
        assert_eq!(destinations, vec!["logging.events", "audit.entries"]);
        assert_eq!(err.destination_failures().len(), 2);

        // the remaining tables still received the record
        assert_eq!(driver.rows("logging", "errors").len(), 1);
        assert_eq!(driver.rows("logging", "traces").len(), 1);
    }

    #[test]
    fn test_failures_do_not_poison_later_writes() {
        let driver = MemoryDriver::new();
        driver.fail_execute("logging", "events");
        let target = LogTarget::initialize(&config(), &driver).unwrap();
        assert!(target.write(&record("first")).is_err());

        driver.heal_execute("logging", "events");
        assert_eq!(target.write(&record("second")).unwrap().written, 4);
        assert_eq!(driver.prepare_calls("logging", "events"), 1);
    }
}

mod coercion {
    use super::*;

    #[test]
    fn test_unparseable_int_binds_null() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        let record = LogRecord::new(Level::Warn, "app", "bad code")
            .with_property("request_id", GUID)
            .with_property("code", "not-a-number");
        target.write(&record).unwrap();

        assert_eq!(
            driver.rows("logging", "errors"),
            vec![vec![Value::Text("WARN".into()), Value::Null]]
        );
        assert!(target.metrics().coercion_fallbacks() >= 1);
    }

    #[test]
    fn test_guid_column_parses_or_falls_back_to_nil() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();

        target.write(&record("parsed")).unwrap();
        target
            .write(&LogRecord::new(Level::Info, "app", "missing").with_property("request_id", "nope"))
            .unwrap();

        let rows = driver.rows("logging", "events");
        assert_eq!(rows[0][0], Value::Uuid(Uuid::parse_str(GUID).unwrap()));
        assert_eq!(rows[1][0], Value::Uuid(Uuid::nil()));
        // the untyped message column is left unset
        assert_eq!(rows[0][1], Value::Unset);
    }

    #[test]
    fn test_timestamp_column_from_longdate() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();
        let at = chrono::DateTime::parse_from_rfc3339("2024-01-31T13:45:10.250Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        target.write(&record("timed").with_timestamp(at)).unwrap();
        assert_eq!(
            driver.rows("audit", "entries"),
            vec![vec![Value::Timestamp(at), Value::Text("timed".into())]]
        );
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_writes_after_close_touch_no_driver() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();
        target.write(&record("before")).unwrap();
        target.close();

        let calls = driver.total_calls();
        for _ in 0..3 {
            assert!(matches!(
                target.write(&record("after")),
                Err(Error::TargetClosed(_))
            ));
        }
        assert!(matches!(target.connect(), Err(Error::TargetClosed(_))));
        assert_eq!(driver.total_calls(), calls);
        assert!(driver.is_shut_down());
    }

    #[test]
    fn test_close_before_first_write() {
        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config(), &driver).unwrap();
        target.close();
        assert!(driver.is_shut_down());
        assert_eq!(driver.connect_calls("logging"), 0);
    }

    #[test]
    fn test_empty_node_list_is_rejected_before_connecting() {
        let driver = MemoryDriver::new();
        let mut config = config();
        config.nodes.clear();

        assert!(matches!(
            LogTarget::initialize(&config, &driver),
            Err(Error::Config(_))
        ));
        assert_eq!(driver.build_calls(), 0);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("l2c.toml");
        std::fs::write(&path, MULTI_TABLE_CONFIG).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.target.name, "integration");
        assert_eq!(config.node_addresses().len(), 2);

        let driver = MemoryDriver::new();
        let target = LogTarget::initialize(&config, &driver).unwrap();
        assert_eq!(target.write(&record("from file")).unwrap().written, 4);
    }
}

mod concurrency {
    use super::*;

    /// Concurrent first writers connect each keyspace exactly once.
    #[test]
    fn test_concurrent_first_calls_connect_once() {
        const THREADS: usize = 8;

        let driver = MemoryDriver::new();
        driver.set_connect_delay(Duration::from_millis(20));
        let target = Arc::new(LogTarget::initialize(&config(), &driver).unwrap());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let target = Arc::clone(&target);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    target.write(&record(&format!("thread {i}"))).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().written, 4);
        }

        assert_eq!(driver.connect_calls("logging"), 1);
        assert_eq!(driver.connect_calls("audit"), 1);
        assert_eq!(driver.total_prepare_calls(), 4);
        assert_eq!(driver.rows("logging", "events").len(), THREADS);
        assert_eq!(target.metrics().records_total(), THREADS as u64);
    }

    #[test]
    fn test_concurrent_writes_with_partial_connectivity() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 25;

        let driver = MemoryDriver::new();
        driver.fail_connect("audit");
        let target = Arc::new(LogTarget::initialize(&config(), &driver).unwrap());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let target = Arc::clone(&target);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        target.write(&record(&format!("write {i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(driver.rows("logging", "traces").len(), THREADS * PER_THREAD);
        assert_eq!(driver.connect_calls("logging"), 1);
        assert_eq!(driver.total_prepare_calls(), 3);
        assert_eq!(target.readiness(), Readiness::Partial);
    }
}
