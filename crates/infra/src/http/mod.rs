//! HTTP transport shared by the outbound clients.

mod client;

pub use client::HttpTransport;
