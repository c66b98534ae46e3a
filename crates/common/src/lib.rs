//! Generic building blocks shared across Subsarr crates.
//!
//! The only module here today is [`resilience`]: failure classification,
//! retry with exponential backoff, a rolling-window circuit breaker, and a
//! health monitor. Everything is generic over error types and knows nothing
//! about HTTP or the concrete outbound services; `subsarr-infra` supplies the
//! concrete wiring.

pub mod resilience;
