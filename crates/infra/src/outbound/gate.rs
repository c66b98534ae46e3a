//! Resilience gate shared by the outbound clients
//!
//! One gate per dependency. It owns the dependency's circuit breaker, retry
//! executor, and health monitor, and composes them breaker-outside,
//! retry-inside: the breaker's window records the final outcome of each
//! logical call while the health counters see every individual attempt.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use subsarr_common::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ClassifyFailure, Clock, ConfigResult,
    HealthMonitor, HealthSnapshot, ResilienceError, RetryConfig, RetryExecutor, SystemClock,
};
use subsarr_domain::config::{CircuitBreakerSettings, RetrySettings};

use super::errors::OutboundError;

/// Breaker + retry + health for one named outbound dependency.
pub struct OutboundGate<C: Clock = SystemClock> {
    service: &'static str,
    breaker: CircuitBreaker<C>,
    retry: RetryExecutor,
    health: Arc<HealthMonitor>,
}

impl OutboundGate<SystemClock> {
    /// Build a gate with the system clock.
    pub fn new(
        service: &'static str,
        breaker_settings: &CircuitBreakerSettings,
        retry_settings: &RetrySettings,
        configured: bool,
    ) -> ConfigResult<Self> {
        Self::with_clock(service, breaker_settings, retry_settings, configured, SystemClock)
    }
}

impl<C: Clock> OutboundGate<C> {
    /// Build a gate with an explicit clock (used by tests).
    pub fn with_clock(
        service: &'static str,
        breaker_settings: &CircuitBreakerSettings,
        retry_settings: &RetrySettings,
        configured: bool,
        clock: C,
    ) -> ConfigResult<Self> {
        let breaker_config = CircuitBreakerConfig::builder()
            .error_threshold_percentage(breaker_settings.error_threshold_percentage)
            .reset_timeout(breaker_settings.reset_timeout())
            .volume_threshold(breaker_settings.volume_threshold)
            .window_size(breaker_settings.volume_threshold.max(10) * 10)
            .build()?;
        let retry_config = RetryConfig::builder()
            .max_attempts(retry_settings.max_attempts)
            .base_delay(retry_settings.base_delay())
            .build()?;

        let health = Arc::new(HealthMonitor::new(configured));
        let breaker = CircuitBreaker::with_clock(service, breaker_config, clock);
        breaker.subscribe(health.clone());
        let retry = RetryExecutor::new(retry_config).with_observer(health.clone());

        Ok(Self { service, breaker, retry, health })
    }

    /// The dependency name used in errors and logs.
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// This dependency's health monitor.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Current health snapshot.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Breaker state as last recorded.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run one logical outbound call through retry and breaker.
    ///
    /// Unconfigured dependencies fail fast without touching the breaker or
    /// the health counters.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, OutboundError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure + Debug + Into<OutboundError>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if !self.health.is_configured() {
            return Err(OutboundError::NotConfigured { service: self.service });
        }

        match self.breaker.execute(|| self.retry.run(operation)).await {
            Ok(value) => Ok(value),
            Err(ResilienceError::CircuitOpen { .. }) => {
                Err(OutboundError::CircuitOpen { service: self.service })
            }
            Err(ResilienceError::OperationFailed { source }) => Err(source.into_source().into()),
        }
    }
}
