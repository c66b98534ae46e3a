//! Infrastructure layer: concrete outbound integrations.
//!
//! This crate wires the generic resilience machinery from `subsarr-common`
//! to real HTTP dependencies:
//!
//! - [`http`]: a thin `reqwest` wrapper that maps transport failures into
//!   classifiable errors and never retries on its own
//! - [`outbound`]: the media-directory client, the mail-transport client,
//!   the breaker/retry gate they share, and the in-memory delivery queue
//! - [`config`]: environment-based configuration loading

pub mod config;
pub mod http;
pub mod outbound;
