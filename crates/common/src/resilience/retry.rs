//! Retry executor with classification-driven exponential backoff
//!
//! The executor runs an operation up to a configured number of attempts. On
//! each failure it consults the error's [`ClassifyFailure`] implementation:
//! only retryable failures earn another attempt, and the backoff doubles
//! every time (`base_delay`, `2 * base_delay`, `4 * base_delay`, ...). The
//! backoff sleep is a tokio suspension point, so concurrent callers are never
//! stalled by someone else's retry loop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use super::classify::{ClassifyFailure, ErrorClassification};
use super::{ConfigError, ConfigResult};

/// Errors produced by a retry run.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The failure was classified non-retryable or fatal; no further attempts
    /// were made.
    #[error("aborted on attempt {attempts} after non-retryable failure ({reason})")]
    Aborted {
        /// Attempts made before the abort, including the aborting one.
        attempts: u32,
        /// Classification reason recorded at abort time.
        reason: &'static str,
        source: E,
    },

    /// Every attempt failed with a retryable error; carries the last one.
    #[error("all {attempts} attempts exhausted")]
    Exhausted { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// The underlying transport error, whichever way the run ended.
    pub fn into_source(self) -> E {
        match self {
            Self::Aborted { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }

    /// Borrow the underlying transport error.
    pub fn source_ref(&self) -> &E {
        match self {
            Self::Aborted { source, .. } | Self::Exhausted { source, .. } => source,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Successful run plus how many attempts it took.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub value: T,
    pub attempts: u32,
}

/// Outcome of a single attempt, as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Ephemeral record of one call attempt.
///
/// Created per attempt and handed to the observer immediately; never stored.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub started_at: Instant,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
}

/// Hook invoked after every attempt, successful or not.
///
/// The health monitor implements this to keep its monotonic counters; custom
/// observers can plug in for metrics.
pub trait AttemptObserver: Send + Sync {
    /// Called once per attempt with the ephemeral record.
    fn on_attempt(&self, record: &AttemptRecord);
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts for one logical operation (initial try + retries).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryConfig {
    /// Create a configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Backoff delay applied after the given 1-based attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The retry executor.
///
/// Stateless apart from its configuration; cheap to clone and share by value
/// across call sites. An optional [`AttemptObserver`] receives a record for
/// every attempt.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl RetryExecutor {
    /// Create an executor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config, observer: None }
    }

    /// Attach an observer that receives every [`AttemptRecord`].
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The configured attempt budget.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying retryable failures with exponential backoff.
    pub async fn run<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure + fmt::Debug,
    {
        self.run_with_report(operation).await.map(|report| report.value)
    }

    /// Like [`RetryExecutor::run`], additionally reporting the attempt count.
    pub async fn run_with_report<F, Fut, T, E>(
        &self,
        mut operation: F,
    ) -> Result<RetryReport<T>, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyFailure + fmt::Debug,
    {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let started_at = Instant::now();
            let result = operation().await;
            let duration = started_at.elapsed();

            let outcome =
                if result.is_ok() { AttemptOutcome::Success } else { AttemptOutcome::Failure };
            if let Some(observer) = &self.observer {
                observer.on_attempt(&AttemptRecord { attempt, started_at, duration, outcome });
            }

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retries");
                    }
                    return Ok(RetryReport { value, attempts: attempt });
                }
                Err(error) => match error.classify() {
                    ErrorClassification::Retryable(reason) => {
                        if attempt == max_attempts {
                            warn!(attempts = attempt, reason, error = ?error, "retry budget exhausted");
                            return Err(RetryError::Exhausted { attempts: attempt, source: error });
                        }
                        let delay = self.config.delay_for_attempt(attempt);
                        debug!(attempt, reason, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                        tokio::time::sleep(delay).await;
                    }
                    ErrorClassification::NonRetryable(reason)
                    | ErrorClassification::Fatal(reason) => {
                        debug!(attempt, reason, error = ?error, "failure is not retryable, aborting");
                        return Err(RetryError::Aborted { attempts: attempt, reason, source: error });
                    }
                },
            }
        }

        // max_attempts >= 1, so the loop always returns before falling through.
        unreachable!("retry loop must terminate within max_attempts")
    }
}
