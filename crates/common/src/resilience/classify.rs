//! Failure classification contract
//!
//! Classification is the single decision point that tells the retry executor
//! whether another attempt can help. It is pure: implementations inspect an
//! already-materialized error value and never perform I/O.

use std::fmt;

/// How a failed outbound call should be treated by the retry machinery.
///
/// Every variant carries a short static reason (`"timeout"`,
/// `"auth-failure"`, ...) that surfaces in logs and error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Transient condition; another attempt may succeed.
    Retryable(&'static str),
    /// Retrying cannot help (bad credentials, malformed request, dead host).
    NonRetryable(&'static str),
    /// The dependency is unusable; abort immediately.
    Fatal(&'static str),
}

impl ErrorClassification {
    /// True only for [`ErrorClassification::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The static reason attached at classification time.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Retryable(reason) | Self::NonRetryable(reason) | Self::Fatal(reason) => reason,
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable(reason) => write!(f, "retryable ({reason})"),
            Self::NonRetryable(reason) => write!(f, "non-retryable ({reason})"),
            Self::Fatal(reason) => write!(f, "fatal ({reason})"),
        }
    }
}

/// Trait for errors that know their own retry classification.
///
/// Implementations must be deterministic and side-effect free; the retry
/// executor may call this more than once for the same error value.
pub trait ClassifyFailure {
    /// Classify this failure for the retry executor.
    fn classify(&self) -> ErrorClassification;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum FakeError {
        Timeout,
        Forbidden,
    }

    impl ClassifyFailure for FakeError {
        fn classify(&self) -> ErrorClassification {
            match self {
                Self::Timeout => ErrorClassification::Retryable("timeout"),
                Self::Forbidden => ErrorClassification::NonRetryable("auth-failure"),
            }
        }
    }

    #[test]
    fn retryable_is_detected() {
        assert!(FakeError::Timeout.classify().is_retryable());
        assert!(!FakeError::Forbidden.classify().is_retryable());
    }

    #[test]
    fn reason_is_preserved() {
        assert_eq!(FakeError::Timeout.classify().reason(), "timeout");
        assert_eq!(FakeError::Forbidden.classify().reason(), "auth-failure");
    }

    #[test]
    fn display_names_the_bucket() {
        assert_eq!(ErrorClassification::Retryable("timeout").to_string(), "retryable (timeout)");
        assert_eq!(ErrorClassification::Fatal("gone").to_string(), "fatal (gone)");
    }

    #[test]
    fn classification_is_deterministic() {
        let err = FakeError::Timeout;
        assert_eq!(err.classify(), err.classify());
    }
}
