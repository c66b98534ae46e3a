//! Configuration types for the outbound integration layer.
//!
//! These are plain data carriers. The environment loader that populates them
//! lives in `subsarr-infra::config`; validation that requires I/O (reaching
//! the endpoint) happens in the clients themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Circuit breaker tuning shared by both outbound clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failure percentage within the rolling window that opens the circuit.
    pub error_threshold_percentage: u8,
    /// How long an open circuit waits before allowing a half-open trial.
    pub reset_timeout_ms: u64,
    /// Minimum calls in the window before the threshold is evaluated.
    pub volume_threshold: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self { error_threshold_percentage: 50, reset_timeout_ms: 30_000, volume_threshold: 10 }
    }
}

impl CircuitBreakerSettings {
    /// Reset timeout as a [`Duration`].
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Retry tuning shared by both outbound clients and the delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts for one logical call (initial try + retries).
    pub max_attempts: u32,
    /// First backoff delay; doubles on every subsequent retry.
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 1_000 }
    }
}

impl RetrySettings {
    /// Base backoff delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Connection settings for the media-directory server.
///
/// Both `base_url` and `api_key` must be present for the directory client to
/// be considered configured; a partially configured client starts in the
/// `NotConfigured` health state and fails every call fast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-call transport timeout in milliseconds.
    pub timeout_ms: u64,
}

impl DirectoryConfig {
    /// True when endpoint and credentials are both present.
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.api_key.is_some()
    }

    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(if self.timeout_ms == 0 { 30_000 } else { self.timeout_ms })
    }
}

/// Connection settings for the outbound mail relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// Base URL of the relay's HTTP API.
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender address stamped on every outbound message.
    pub from_address: Option<String>,
    /// Per-call transport timeout in milliseconds.
    pub timeout_ms: u64,
}

impl MailConfig {
    /// True when host and credentials are all present.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.username.is_some() && self.password.is_some()
    }

    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(if self.timeout_ms == 0 { 30_000 } else { self.timeout_ms })
    }
}

/// Aggregate configuration for the whole outbound layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundConfig {
    pub directory: DirectoryConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_config_requires_url_and_key() {
        let mut config = DirectoryConfig::default();
        assert!(!config.is_configured());

        config.base_url = Some("http://media.local:8096".to_string());
        assert!(!config.is_configured());

        config.api_key = Some("secret".to_string());
        assert!(config.is_configured());
    }

    #[test]
    fn mail_config_requires_host_and_credentials() {
        let mut config = MailConfig::default();
        assert!(!config.is_configured());

        config.host = Some("http://relay.local".to_string());
        config.username = Some("subsarr".to_string());
        assert!(!config.is_configured());

        config.password = Some("secret".to_string());
        assert!(config.is_configured());
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let config = DirectoryConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
    }

    #[test]
    fn breaker_defaults_match_documented_values() {
        let settings = CircuitBreakerSettings::default();
        assert_eq!(settings.error_threshold_percentage, 50);
        assert_eq!(settings.reset_timeout(), Duration::from_secs(30));
        assert_eq!(settings.volume_threshold, 10);
    }
}
