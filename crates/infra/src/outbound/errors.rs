//! Error types for outbound integrations

use subsarr_common::resilience::{ClassifyFailure, ErrorClassification};
use subsarr_domain::SubsarrError;
use thiserror::Error;
use uuid::Uuid;

/// Low-level failure of a single HTTP exchange.
///
/// Produced by [`crate::http::HttpTransport`]; one value per attempt. The
/// [`ClassifyFailure`] impl is the single place that decides which failures
/// are worth retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established (refused, DNS failure, TLS setup).
    #[error("host unreachable: {message}")]
    Unreachable { message: String },

    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {code}")]
    Status { code: u16, body: String },

    /// The response body could not be decoded into the expected shape.
    #[error("failed to decode response: {message}")]
    Decode { message: String },

    /// Any other transport-level failure from the HTTP stack.
    #[error("transport error: {message}")]
    Other { message: String },
}

impl ClassifyFailure for TransportError {
    fn classify(&self) -> ErrorClassification {
        match self {
            Self::Timeout => ErrorClassification::Retryable("timeout"),
            // The host is not there; hammering it faster will not bring it back.
            Self::Unreachable { .. } => ErrorClassification::NonRetryable("unavailable"),
            Self::Status { code, .. } => match code {
                401 | 403 => ErrorClassification::NonRetryable("auth-failure"),
                500..=599 => ErrorClassification::Retryable("server-error"),
                _ => ErrorClassification::NonRetryable("bad-request"),
            },
            Self::Decode { .. } => ErrorClassification::NonRetryable("bad-response"),
            Self::Other { .. } => ErrorClassification::Retryable("server-error"),
        }
    }
}

/// High-level failure of one outbound operation, after resilience handling.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// The dependency has no endpoint or credentials configured.
    #[error("{service} is not configured")]
    NotConfigured { service: &'static str },

    /// The circuit breaker rejected the call.
    #[error("{service} circuit breaker is open")]
    CircuitOpen { service: &'static str },

    /// The call ran and ultimately failed; carries the last transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A queued delivery exhausted its attempt budget and was dropped.
    #[error("delivery job {job_id} dropped after {attempts} attempts")]
    QueueJobExhausted { job_id: Uuid, attempts: u32 },
}

impl OutboundError {
    /// Stable machine-readable code for API responses and log correlation.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "NOT_CONFIGURED",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Transport(TransportError::Timeout) => "UPSTREAM_TIMEOUT",
            Self::Transport(TransportError::Unreachable { .. }) => "UPSTREAM_UNREACHABLE",
            Self::Transport(TransportError::Status { code: 401 | 403, .. }) => "UPSTREAM_AUTH",
            Self::Transport(TransportError::Status { .. }) => "UPSTREAM_STATUS",
            Self::Transport(TransportError::Decode { .. }) => "UPSTREAM_BAD_RESPONSE",
            Self::Transport(TransportError::Other { .. }) => "UPSTREAM_TRANSPORT",
            Self::QueueJobExhausted { .. } => "DELIVERY_EXHAUSTED",
        }
    }
}

impl ClassifyFailure for OutboundError {
    fn classify(&self) -> ErrorClassification {
        match self {
            // Configuration will not appear by itself; give up immediately.
            Self::NotConfigured { .. } => ErrorClassification::Fatal("not-configured"),
            // The breaker may close again after its reset timeout.
            Self::CircuitOpen { .. } => ErrorClassification::Retryable("circuit-open"),
            Self::Transport(err) => err.classify(),
            Self::QueueJobExhausted { .. } => {
                ErrorClassification::NonRetryable("delivery-exhausted")
            }
        }
    }
}

impl From<OutboundError> for SubsarrError {
    fn from(err: OutboundError) -> Self {
        match &err {
            OutboundError::NotConfigured { service } => {
                Self::Config(format!("{service} is not configured"))
            }
            OutboundError::CircuitOpen { .. } => Self::Unavailable(err.to_string()),
            OutboundError::Transport(TransportError::Status { code: 401 | 403, .. }) => {
                Self::Auth(err.to_string())
            }
            OutboundError::Transport(_) => Self::Network(err.to_string()),
            OutboundError::QueueJobExhausted { .. } => Self::Internal(err.to_string()),
        }
    }
}
