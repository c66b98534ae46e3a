//! Per-dependency health bookkeeping
//!
//! The monitor keeps monotonic request counters and the latest breaker state
//! for one outbound dependency. It plugs into the retry executor as an
//! [`AttemptObserver`] (every attempt counts, including intermediate retries)
//! and into the breaker as a [`StateListener`]. Reading a snapshot never
//! mutates anything, so health endpoints can poll freely.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::circuit_breaker::{CircuitState, StateListener};
use super::retry::{AttemptObserver, AttemptOutcome, AttemptRecord};

/// Overall status of one outbound dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The dependency has no endpoint or credentials configured.
    NotConfigured,
    /// Last probe succeeded and the failure rate is acceptable.
    Healthy,
    /// The circuit is not closed, or the recent failure rate is high.
    Degraded,
    /// The last explicit health probe failed.
    Unhealthy,
}

/// Immutable view of a dependency's health at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub failure_rate_percent: f64,
    pub circuit_state: CircuitState,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Monotonic counters and probe state for one dependency.
///
/// Counters only ever increase; there is no reset. A dependency that was
/// never configured reports [`HealthStatus::NotConfigured`] regardless of
/// anything else.
pub struct HealthMonitor {
    configured: bool,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    circuit_state: Mutex<CircuitState>,
    probe_failed: AtomicBool,
    last_checked_at: Mutex<Option<DateTime<Utc>>>,
    degraded_failure_rate: f64,
}

impl HealthMonitor {
    /// Failure-rate percentage at which a configured dependency is reported
    /// degraded.
    pub const DEFAULT_DEGRADED_FAILURE_RATE: f64 = 50.0;

    pub fn new(configured: bool) -> Self {
        Self {
            configured,
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            circuit_state: Mutex::new(CircuitState::Closed),
            probe_failed: AtomicBool::new(false),
            last_checked_at: Mutex::new(None),
            degraded_failure_rate: Self::DEFAULT_DEGRADED_FAILURE_RATE,
        }
    }

    /// Whether the underlying dependency is configured at all.
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Record the outcome of an explicit health probe.
    pub fn record_probe(&self, healthy: bool) {
        self.probe_failed.store(!healthy, Ordering::Relaxed);
        *self.last_checked_at.lock() = Some(Utc::now());
    }

    /// Produce a point-in-time snapshot. Idempotent: reading does not change
    /// any counter or status.
    pub fn snapshot(&self) -> HealthSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let failure_rate =
            if total == 0 { 0.0 } else { (failed as f64 / total as f64) * 100.0 };
        let circuit_state = *self.circuit_state.lock();

        let status = if !self.configured {
            HealthStatus::NotConfigured
        } else if self.probe_failed.load(Ordering::Relaxed) {
            HealthStatus::Unhealthy
        } else if circuit_state != CircuitState::Closed
            || failure_rate >= self.degraded_failure_rate
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthSnapshot {
            status,
            total_requests: total,
            failed_requests: failed,
            failure_rate_percent: failure_rate,
            circuit_state,
            last_checked_at: *self.last_checked_at.lock(),
        }
    }
}

impl AttemptObserver for HealthMonitor {
    fn on_attempt(&self, record: &AttemptRecord) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if record.outcome == AttemptOutcome::Failure {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl StateListener for HealthMonitor {
    fn on_transition(&self, _from: CircuitState, to: CircuitState) {
        *self.circuit_state.lock() = to;
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn attempt(outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            attempt: 1,
            started_at: Instant::now(),
            duration: Duration::from_millis(5),
            outcome,
        }
    }

    #[test]
    fn unconfigured_wins_over_everything() {
        let monitor = HealthMonitor::new(false);
        monitor.on_attempt(&attempt(AttemptOutcome::Failure));
        monitor.record_probe(false);
        monitor.on_transition(CircuitState::Closed, CircuitState::Open);

        assert_eq!(monitor.snapshot().status, HealthStatus::NotConfigured);
    }

    #[test]
    fn fresh_configured_monitor_is_healthy() {
        let monitor = HealthMonitor::new(true);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Healthy);
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.failure_rate_percent, 0.0);
        assert!(snapshot.last_checked_at.is_none());
    }

    #[test]
    fn counters_track_every_attempt() {
        let monitor = HealthMonitor::new(true);
        monitor.on_attempt(&attempt(AttemptOutcome::Failure));
        monitor.on_attempt(&attempt(AttemptOutcome::Failure));
        monitor.on_attempt(&attempt(AttemptOutcome::Success));
        monitor.on_attempt(&attempt(AttemptOutcome::Success));
        monitor.on_attempt(&attempt(AttemptOutcome::Success));
        monitor.on_attempt(&attempt(AttemptOutcome::Success));

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_requests, 6);
        assert_eq!(snapshot.failed_requests, 2);
        assert!((snapshot.failure_rate_percent - 33.333).abs() < 0.01);
        assert_eq!(snapshot.status, HealthStatus::Healthy);
    }

    #[test]
    fn high_failure_rate_degrades() {
        let monitor = HealthMonitor::new(true);
        monitor.on_attempt(&attempt(AttemptOutcome::Failure));
        monitor.on_attempt(&attempt(AttemptOutcome::Success));

        assert_eq!(monitor.snapshot().status, HealthStatus::Degraded);
    }

    #[test]
    fn open_circuit_degrades_even_with_clean_counters() {
        let monitor = HealthMonitor::new(true);
        monitor.on_transition(CircuitState::Closed, CircuitState::Open);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Degraded);
        assert_eq!(snapshot.circuit_state, CircuitState::Open);

        monitor.on_transition(CircuitState::Open, CircuitState::HalfOpen);
        assert_eq!(monitor.snapshot().status, HealthStatus::Degraded);

        monitor.on_transition(CircuitState::HalfOpen, CircuitState::Closed);
        assert_eq!(monitor.snapshot().status, HealthStatus::Healthy);
    }

    #[test]
    fn failed_probe_is_unhealthy_until_a_probe_succeeds() {
        let monitor = HealthMonitor::new(true);
        monitor.record_probe(false);
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
        assert!(snapshot.last_checked_at.is_some());

        monitor.record_probe(true);
        assert_eq!(monitor.snapshot().status, HealthStatus::Healthy);
    }

    #[test]
    fn snapshot_is_idempotent() {
        let monitor = HealthMonitor::new(true);
        monitor.on_attempt(&attempt(AttemptOutcome::Failure));
        monitor.record_probe(true);

        let first = monitor.snapshot();
        let second = monitor.snapshot();
        assert_eq!(first.total_requests, second.total_requests);
        assert_eq!(first.failed_requests, second.failed_requests);
        assert_eq!(first.status, second.status);
        assert_eq!(first.last_checked_at, second.last_checked_at);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::NotConfigured).unwrap(),
            "\"not_configured\""
        );
        assert_eq!(serde_json::to_string(&HealthStatus::Degraded).unwrap(), "\"degraded\"");
    }
}
