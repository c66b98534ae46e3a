//! Thin `reqwest` wrapper
//!
//! One exchange in, one result out. The transport never retries and never
//! consults a breaker; resilience lives a layer above so that every attempt
//! it makes is observable. Its job is the part the resilience layer cannot
//! do: turning `reqwest`'s error surface and non-success statuses into
//! [`TransportError`] values that know how to classify themselves.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::outbound::TransportError;

/// Shared HTTP client with a per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport whose requests all carry the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("subsarr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TransportError::Other { message: err.to_string() })?;
        Ok(Self { client })
    }

    /// Access the underlying client for request building.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a request and require a success status.
    ///
    /// Non-2xx responses become [`TransportError::Status`] with the body
    /// captured for diagnostics.
    pub async fn execute(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!(code, "upstream returned non-success status");
        Err(TransportError::Status { code, body })
    }

    /// Send a request and decode the success body as JSON.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|err| TransportError::Decode { message: err.to_string() })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Unreachable { message: err.to_string() }
    } else {
        TransportError::Other { message: err.to_string() }
    }
}
