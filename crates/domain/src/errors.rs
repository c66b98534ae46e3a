//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Subsarr
///
/// The route layer maps these onto stable user-facing error codes, so the
/// variant set is deliberately small and coarse. Integration-level detail
/// (classification, circuit state) lives in `subsarr-infra`'s error types and
/// is flattened into one of these variants at the boundary.
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SubsarrError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Subsarr operations
pub type Result<T> = std::result::Result<T, SubsarrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_tag_and_message() {
        let err = SubsarrError::Config("missing endpoint".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "Config");
        assert_eq!(json["message"], "missing endpoint");
    }

    #[test]
    fn display_includes_context() {
        let err = SubsarrError::Unavailable("directory circuit open".to_string());
        assert!(err.to_string().contains("directory circuit open"));
    }
}
