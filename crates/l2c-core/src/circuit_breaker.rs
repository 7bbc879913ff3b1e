//! Reconnect throttling for unreachable keyspaces.
//!
//! While a keyspace's breaker is open, connection attempts for it are skipped
//! without touching the driver. After the reset timeout one probe attempt is
//! let through (half-open); success closes the breaker, failure reopens it.

use crate::config::ReconnectConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    /// Attempts proceed normally
    Closed,
    /// Attempts are skipped
    Open,
    /// One probe attempt is allowed
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Per-keyspace reconnect breaker.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker.
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Create a breaker from reconnect configuration.
    pub fn from_config(name: impl Into<String>, config: &ReconnectConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            Duration::from_millis(config.reset_timeout_ms),
        )
    }

    /// Whether an attempt may be made now.
    pub fn is_allowed(&self) -> bool {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    state.state = CircuitState::HalfOpen;
                    info!(name = %self.name, "Reconnect breaker half-open, probing");
                }
                elapsed
            }
        }
    }

    /// Record a successful attempt.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.state != CircuitState::Closed {
            info!(name = %self.name, "Reconnect breaker closed");
        }
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.opened_at = None;
    }

    /// Record a failed attempt.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;

        match state.state {
            CircuitState::Closed if state.failure_count >= self.failure_threshold => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                warn!(
                    name = %self.name,
                    failures = state.failure_count,
                    reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                    "Reconnect breaker opened"
                );
            }
            CircuitState::Closed => {
                debug!(
                    name = %self.name,
                    failures = state.failure_count,
                    threshold = self.failure_threshold,
                    "Reconnect failure recorded"
                );
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
                warn!(name = %self.name, "Reconnect probe failed, breaker reopened");
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
