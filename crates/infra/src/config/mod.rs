//! Configuration loader
//!
//! Loads the outbound layer's configuration from environment variables.
//!
//! ## Environment Variables
//! - `SUBSARR_DIRECTORY_URL`: Base URL of the media-directory server
//! - `SUBSARR_DIRECTORY_API_KEY`: API key for the directory server
//! - `SUBSARR_MAIL_HOST`: Base URL of the mail relay's HTTP API
//! - `SUBSARR_MAIL_USERNAME`: Mail relay username
//! - `SUBSARR_MAIL_PASSWORD`: Mail relay password
//! - `SUBSARR_MAIL_FROM`: Sender address for outbound mail
//! - `SUBSARR_HTTP_TIMEOUT_MS`: Per-call transport timeout
//! - `SUBSARR_CB_ERROR_THRESHOLD`: Failure percentage that opens a circuit
//! - `SUBSARR_CB_RESET_TIMEOUT_MS`: Open-circuit cooldown
//! - `SUBSARR_CB_VOLUME_THRESHOLD`: Minimum calls before the threshold applies
//! - `SUBSARR_RETRY_MAX_ATTEMPTS`: Attempt budget per logical call
//! - `SUBSARR_RETRY_BASE_DELAY_MS`: First backoff delay
//!
//! Endpoints and credentials are optional: a missing directory URL or mail
//! host leaves that client in the not-configured state rather than failing
//! the load. Tuning variables fall back to their documented defaults, but a
//! present-and-unparseable value is a hard error.

use subsarr_domain::config::{
    CircuitBreakerSettings, DirectoryConfig, MailConfig, OutboundConfig, RetrySettings,
};
use subsarr_domain::{Result, SubsarrError};

/// Load the outbound configuration from the environment.
///
/// # Errors
/// Returns `SubsarrError::Config` if a tuning variable is present but cannot
/// be parsed.
pub fn load_from_env() -> Result<OutboundConfig> {
    let timeout_ms = parse_var("SUBSARR_HTTP_TIMEOUT_MS", 30_000_u64)?;

    let directory = DirectoryConfig {
        base_url: optional_var("SUBSARR_DIRECTORY_URL"),
        api_key: optional_var("SUBSARR_DIRECTORY_API_KEY"),
        timeout_ms,
    };
    let mail = MailConfig {
        host: optional_var("SUBSARR_MAIL_HOST"),
        username: optional_var("SUBSARR_MAIL_USERNAME"),
        password: optional_var("SUBSARR_MAIL_PASSWORD"),
        from_address: optional_var("SUBSARR_MAIL_FROM"),
        timeout_ms,
    };

    let defaults = CircuitBreakerSettings::default();
    let circuit_breaker = CircuitBreakerSettings {
        error_threshold_percentage: parse_var(
            "SUBSARR_CB_ERROR_THRESHOLD",
            defaults.error_threshold_percentage,
        )?,
        reset_timeout_ms: parse_var("SUBSARR_CB_RESET_TIMEOUT_MS", defaults.reset_timeout_ms)?,
        volume_threshold: parse_var("SUBSARR_CB_VOLUME_THRESHOLD", defaults.volume_threshold)?,
    };

    let retry_defaults = RetrySettings::default();
    let retry = RetrySettings {
        max_attempts: parse_var("SUBSARR_RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts)?,
        base_delay_ms: parse_var("SUBSARR_RETRY_BASE_DELAY_MS", retry_defaults.base_delay_ms)?,
    };

    tracing::info!(
        directory_configured = directory.is_configured(),
        mail_configured = mail.is_configured(),
        "outbound configuration loaded"
    );
    Ok(OutboundConfig { directory, mail, circuit_breaker, retry })
}

/// Read an optional variable; unset and empty both mean "not configured".
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| SubsarrError::Config(format!("Invalid value for {name}: {e}"))),
    }
}
