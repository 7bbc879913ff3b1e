//! Error types for l2c core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Destination-level write failures are collected by [`WriteFailures`] and
//! surfaced once per dispatch, either directly or wrapped in an
//! [`AggregatedWriteError`].

use std::fmt;
use thiserror::Error;

/// Result type alias for l2c operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for cluster driver calls.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Top-level error type for l2c.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid node, keyspace, table or column configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver refused to build a cluster from the configured contact points
    #[error("Failed to build cluster from nodes [{nodes}]: {source}")]
    ClusterBuild {
        nodes: String,
        #[source]
        source: DriverError,
    },

    /// No configured keyspace could be connected and prepared
    #[error("Could not connect to any configured keyspace for target {target} ({keyspaces} attempted)")]
    NoReachableDestinations { target: String, keyspaces: usize },

    /// A single destination failed during dispatch
    #[error(transparent)]
    Destination(#[from] DestinationWriteError),

    /// Two or more destinations failed during dispatch
    #[error(transparent)]
    Aggregated(#[from] AggregatedWriteError),

    /// The target was shut down
    #[error("Target {0} is closed")]
    TargetClosed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Destination-level failures carried by this error, if any.
    pub fn destination_failures(&self) -> &[DestinationWriteError] {
        match self {
            Error::Destination(e) => std::slice::from_ref(e),
            Error::Aggregated(agg) => agg.failures(),
            _ => &[],
        }
    }
}

/// Errors reported by a cluster driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Contact points rejected
    #[error("Invalid contact points: {0}")]
    InvalidContactPoints(String),

    /// Host or keyspace unavailable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Statement preparation failed
    #[error("Prepare failed for `{statement}`: {message}")]
    Prepare { statement: String, message: String },

    /// Parameter count mismatch while binding
    #[error("Bind failed: statement expects {expected} values, got {actual}")]
    Bind { expected: usize, actual: usize },

    /// Statement execution failed
    #[error("Execute failed: {0}")]
    Execute(String),

    /// Driver-side timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Handle used after being closed
    #[error("Handle closed")]
    Closed,
}

/// Layout template errors, raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    /// `${` without a closing brace
    #[error("Unterminated renderer starting at byte {position}")]
    Unterminated { position: usize },

    /// `${}` with nothing inside
    #[error("Empty renderer at byte {position}")]
    Empty { position: usize },

    /// Renderer name not recognized
    #[error("Unknown renderer: {0}")]
    UnknownRenderer(String),

    /// Renderer requires an option that was not given
    #[error("Renderer {renderer} requires option {option}")]
    MissingOption { renderer: String, option: String },

    /// Invalid strftime pattern for a date renderer
    #[error("Invalid date format: {0}")]
    InvalidDateFormat(String),
}

/// Failure to render a layout against a record.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Render failed: {0}")]
pub struct RenderError(pub String);

/// Stage of a destination write that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    /// Binding coerced values to the prepared statement
    Bind,
    /// Executing the bound statement
    Execute,
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStage::Bind => write!(f, "bind"),
            WriteStage::Execute => write!(f, "execute"),
        }
    }
}

/// A failed write to one keyspace/table destination.
#[derive(Error, Debug)]
#[error("Write to {keyspace}.{table} failed during {stage}: {source}")]
pub struct DestinationWriteError {
    pub keyspace: String,
    pub table: String,
    pub stage: WriteStage,
    #[source]
    pub source: DriverError,
}

impl DestinationWriteError {
    /// Create a destination error.
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        stage: WriteStage,
        source: DriverError,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            stage,
            source,
        }
    }

    /// `keyspace.table` identifier of the failed destination.
    pub fn destination(&self) -> String {
        format!("{}.{}", self.keyspace, self.table)
    }
}

/// Two or more destination failures from a single dispatch.
#[derive(Debug)]
pub struct AggregatedWriteError {
    failures: Vec<DestinationWriteError>,
}

impl AggregatedWriteError {
    /// Underlying destination failures, in attempt order.
    pub fn failures(&self) -> &[DestinationWriteError] {
        &self.failures
    }

    /// Number of failed destinations.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always false; an aggregate holds at least two failures.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregatedWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} destination writes failed: ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Destination failures collected during one dispatch.
///
/// Failures are recorded as they happen and turned into a single outcome
/// once every destination has been attempted.
#[derive(Debug, Default)]
pub struct WriteFailures {
    failures: Vec<DestinationWriteError>,
}

impl WriteFailures {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a destination failure.
    pub fn record(&mut self, failure: DestinationWriteError) {
        self.failures.push(failure);
    }

    /// Number of failures recorded so far.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// True if nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Resolve the collected failures into the dispatch outcome.
    ///
    /// No failures yields `Ok(value)`, one yields [`Error::Destination`],
    /// several yield [`Error::Aggregated`].
    pub fn finish<T>(mut self, value: T) -> Result<T> {
        match self.failures.len() {
            0 => Ok(value),
            1 => Err(Error::Destination(self.failures.remove(0))),
            _ => Err(Error::Aggregated(AggregatedWriteError {
                failures: self.failures,
            })),
        }
    }
}

// Conversion implementations for external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
