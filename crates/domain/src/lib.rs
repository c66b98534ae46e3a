//! Shared domain types for the Subsarr integration layer.
//!
//! This crate carries the application-wide error enum and the configuration
//! types consumed by the outbound clients. It has no I/O and no async code so
//! every other crate can depend on it freely.

pub mod config;
pub mod errors;

pub use config::{
    CircuitBreakerSettings, DirectoryConfig, MailConfig, OutboundConfig, RetrySettings,
};
pub use errors::{Result, SubsarrError};
