//! Resilience patterns for calling unreliable external dependencies
//!
//! This module provides the pieces that make outbound calls survivable under
//! partial failure:
//!
//! - [`classify`]: a pure classification contract that sorts failures into
//!   retryable, non-retryable, and fatal buckets
//! - [`retry`]: an executor that re-runs an operation with exponential
//!   backoff, consulting the classification between attempts
//! - [`circuit_breaker`]: a three-state gate driven by a rolling window of
//!   recent call outcomes
//! - [`health`]: monotonic per-dependency counters and a queryable snapshot
//!
//! The pieces compose breaker-outside, retry-inside: the breaker protects the
//! *retried* operation, so its rolling window reflects the final outcome of
//! each logical call rather than every intermediate attempt. Each outbound
//! client owns its own breaker and health monitor; nothing here is global.

use thiserror::Error;

pub mod circuit_breaker;
pub mod classify;
pub mod health;
pub mod retry;

/// Validation error for resilience configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerMetrics,
    CircuitState, Clock, MockClock, ResilienceError, ResilienceResult, StateListener, SystemClock,
};
pub use classify::{ClassifyFailure, ErrorClassification};
pub use health::{HealthMonitor, HealthSnapshot, HealthStatus};
pub use retry::{
    AttemptObserver, AttemptOutcome, AttemptRecord, RetryConfig, RetryConfigBuilder, RetryError,
    RetryExecutor, RetryReport, RetryResult,
};
