//! Rolling-window circuit breaker
//!
//! The breaker tracks the outcome of recent calls in a bounded window and
//! trips open when two conditions hold at once: the window contains at least
//! `volume_threshold` calls, and the failure percentage among them reaches
//! `error_threshold_percentage`. While open, calls are rejected instantly
//! with [`ResilienceError::CircuitOpen`]. After `reset_timeout` the breaker
//! moves to half-open on the next call and admits exactly one trial; the
//! trial's outcome decides between closing the circuit and re-opening it.
//!
//! There is no background task. The open -> half-open transition happens
//! lazily when a call arrives after the timeout, driven by the injected
//! [`Clock`] so tests control time deterministically.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::{ConfigError, ConfigResult};

/// Time source abstraction so breaker timeouts are testable.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Production clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually-advanced clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { now: Arc::new(Mutex::new(Instant::now())) }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow through; outcomes are recorded in the window.
    Closed,
    /// Calls are rejected without touching the network.
    Open,
    /// Exactly one trial call is admitted; others are rejected.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Error wrapper for operations guarded by a circuit breaker.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker rejected the call without running the operation.
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// The operation ran and failed; its outcome was recorded in the window.
    #[error("operation failed")]
    OperationFailed {
        #[source]
        source: E,
    },
}

/// Result type for breaker-guarded operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Observer for breaker state transitions.
///
/// Callbacks run synchronously after the internal lock is released; keep them
/// cheap (counter updates, log lines).
pub trait StateListener: Send + Sync {
    fn on_transition(&self, from: CircuitState, to: CircuitState);
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) at which the breaker opens.
    pub error_threshold_percentage: u8,
    /// How long the breaker stays open before admitting a trial call.
    pub reset_timeout: Duration,
    /// Minimum calls in the window before the percentage is evaluated.
    pub volume_threshold: usize,
    /// Maximum outcomes retained in the rolling window.
    pub window_size: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50,
            reset_timeout: Duration::from_secs(30),
            volume_threshold: 10,
            window_size: 100,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.error_threshold_percentage == 0 || self.error_threshold_percentage > 100 {
            return Err(ConfigError::Invalid {
                message: "error_threshold_percentage must be between 1 and 100".to_string(),
            });
        }
        if self.reset_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                message: "reset_timeout must be greater than zero".to_string(),
            });
        }
        if self.volume_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "volume_threshold must be greater than 0".to_string(),
            });
        }
        if self.window_size < self.volume_threshold {
            return Err(ConfigError::Invalid {
                message: "window_size must be at least volume_threshold".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn error_threshold_percentage(mut self, percentage: u8) -> Self {
        self.config.error_threshold_percentage = percentage;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.config.reset_timeout = timeout;
        self
    }

    pub fn volume_threshold(mut self, threshold: usize) -> Self {
        self.config.volume_threshold = threshold;
        self
    }

    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Point-in-time view of the breaker for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub calls_in_window: usize,
    pub failures_in_window: usize,
    pub failure_percentage: f64,
}

struct BreakerInner {
    state: CircuitState,
    /// Recent call outcomes, oldest first. `true` means success.
    window: VecDeque<bool>,
    failures: usize,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerInner {
    fn push_outcome(&mut self, success: bool, window_size: usize) {
        if self.window.len() == window_size {
            if let Some(evicted) = self.window.pop_front() {
                if !evicted {
                    self.failures -= 1;
                }
            }
        }
        self.window.push_back(success);
        if !success {
            self.failures += 1;
        }
    }

    fn failure_percentage(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        (self.failures as f64 / self.window.len() as f64) * 100.0
    }
}

struct Shared<C: Clock> {
    name: String,
    config: CircuitBreakerConfig,
    clock: C,
    inner: Mutex<BreakerInner>,
    listeners: Mutex<Vec<Arc<dyn StateListener>>>,
}

/// Circuit breaker guarding one outbound dependency.
///
/// Cloning is cheap and all clones share state; each dependency owns one
/// breaker instance.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker using the real system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with an explicit clock (used by tests).
    pub fn with_clock(name: impl Into<String>, config: CircuitBreakerConfig, clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                clock,
                inner: Mutex::new(BreakerInner {
                    state: CircuitState::Closed,
                    window: VecDeque::new(),
                    failures: 0,
                    opened_at: None,
                    trial_in_flight: false,
                }),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The breaker's name, used in logs and error messages.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state as last recorded.
    ///
    /// Does not perform the lazy open -> half-open transition; that happens
    /// only when a call is admitted.
    pub fn state(&self) -> CircuitState {
        self.shared.inner.lock().state
    }

    /// Register a listener for state transitions.
    pub fn subscribe(&self, listener: Arc<dyn StateListener>) {
        self.shared.listeners.lock().push(listener);
    }

    /// Diagnostic snapshot of the window.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.shared.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            calls_in_window: inner.window.len(),
            failures_in_window: inner.failures,
            failure_percentage: inner.failure_percentage(),
        }
    }

    /// Force the breaker back to closed and clear the window.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.shared.inner.lock();
            let from = inner.state;
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.failures = 0;
            inner.opened_at = None;
            inner.trial_in_flight = false;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed))
        };
        if let Some((from, to)) = transition {
            self.notify(from, to);
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// If the future is dropped before resolving, the in-flight call counts
    /// as a failure so a half-open trial cannot wedge the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.try_acquire()?;

        let mut guard = CallGuard { breaker: self.clone(), resolved: false };
        let result = operation().await;
        match result {
            Ok(value) => {
                guard.resolve(true);
                Ok(value)
            }
            Err(source) => {
                guard.resolve(false);
                Err(ResilienceError::OperationFailed { source })
            }
        }
    }

    /// Admit or reject a call, performing the lazy open -> half-open move.
    fn try_acquire<E>(&self) -> Result<(), ResilienceError<E>>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let (admitted, transition) = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| self.shared.clock.now().saturating_duration_since(at));
                    if elapsed.is_some_and(|e| e >= self.shared.config.reset_timeout) {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        (true, Some((CircuitState::Open, CircuitState::HalfOpen)))
                    } else {
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        (false, None)
                    } else {
                        inner.trial_in_flight = true;
                        (true, None)
                    }
                }
            }
        };

        if let Some((from, to)) = transition {
            debug!(breaker = %self.shared.name, "reset timeout elapsed, admitting trial call");
            self.notify(from, to);
        }

        if admitted {
            Ok(())
        } else {
            debug!(breaker = %self.shared.name, "rejecting call, circuit open");
            Err(ResilienceError::CircuitOpen { name: self.shared.name.clone() })
        }
    }

    fn record_outcome(&self, success: bool) {
        let transition = {
            let mut inner = self.shared.inner.lock();
            match (inner.state, success) {
                (CircuitState::HalfOpen, true) => {
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.failures = 0;
                    inner.opened_at = None;
                    inner.trial_in_flight = false;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                }
                (CircuitState::HalfOpen, false) => {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.shared.clock.now());
                    inner.trial_in_flight = false;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                (CircuitState::Closed, _) => {
                    inner.push_outcome(success, self.shared.config.window_size);
                    let volume_met =
                        inner.window.len() >= self.shared.config.volume_threshold;
                    let threshold_met = inner.failure_percentage()
                        >= f64::from(self.shared.config.error_threshold_percentage);
                    if !success && volume_met && threshold_met {
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(self.shared.clock.now());
                        Some((CircuitState::Closed, CircuitState::Open))
                    } else {
                        None
                    }
                }
                // A late outcome from before the breaker opened; nothing to do.
                (CircuitState::Open, _) => None,
            }
        };

        if let Some((from, to)) = transition {
            match to {
                CircuitState::Open => {
                    warn!(breaker = %self.shared.name, %from, "circuit opened");
                }
                _ => {
                    debug!(breaker = %self.shared.name, %from, %to, "circuit state changed");
                }
            }
            self.notify(from, to);
        }
    }

    fn notify(&self, from: CircuitState, to: CircuitState) {
        let listeners = self.shared.listeners.lock().clone();
        for listener in listeners {
            listener.on_transition(from, to);
        }
    }
}

/// Ensures every admitted call records an outcome, even if its future is
/// dropped mid-flight.
struct CallGuard<C: Clock> {
    breaker: CircuitBreaker<C>,
    resolved: bool,
}

impl<C: Clock> CallGuard<C> {
    fn resolve(&mut self, success: bool) {
        self.resolved = true;
        self.breaker.record_outcome(success);
    }
}

impl<C: Clock> Drop for CallGuard<C> {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record_outcome(false);
        }
    }
}
