//! Mail-transport client
//!
//! Sends notification mail through a relay's HTTP API using basic auth.
//! Like the directory client it routes every send through an
//! [`OutboundGate`]; the delivery queue plugs in via [`DeliveryHandler`] so
//! queued jobs and direct sends share one breaker and one set of health
//! counters.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use subsarr_common::resilience::{ConfigError, ConfigResult, HealthSnapshot};
use subsarr_domain::config::{CircuitBreakerSettings, MailConfig, RetrySettings};

use crate::http::HttpTransport;

use super::directory::HealthProbe;
use super::errors::{OutboundError, TransportError};
use super::gate::OutboundGate;
use super::queue::DeliveryHandler;

const SERVICE: &str = "mail-transport";

/// One outbound mail message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Client for the outbound mail relay.
pub struct MailerClient {
    gate: OutboundGate,
    transport: HttpTransport,
    endpoint: Option<Url>,
    username: Option<String>,
    password: Option<String>,
    from_address: String,
}

impl MailerClient {
    /// Build a client from configuration; missing host or credentials leave
    /// it in the not-configured state.
    pub fn new(
        config: &MailConfig,
        breaker: &CircuitBreakerSettings,
        retry: &RetrySettings,
    ) -> ConfigResult<Self> {
        let endpoint = config
            .host
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|err| ConfigError::Invalid {
                message: format!("invalid mail relay URL: {err}"),
            })?;
        let transport = HttpTransport::new(config.timeout()).map_err(|err| {
            ConfigError::Invalid { message: format!("failed to build HTTP transport: {err}") }
        })?;
        let gate = OutboundGate::new(SERVICE, breaker, retry, config.is_configured())?;

        Ok(Self {
            gate,
            transport,
            endpoint,
            username: config.username.clone(),
            password: config.password.clone(),
            from_address: config
                .from_address
                .clone()
                .unwrap_or_else(|| "subsarr@localhost".to_string()),
        })
    }

    /// Current health snapshot for this dependency.
    pub fn health_status(&self) -> HealthSnapshot {
        self.gate.health_snapshot()
    }

    fn relay_url(&self, path: &str) -> Result<Url, OutboundError> {
        let base = self
            .endpoint
            .as_ref()
            .ok_or(OutboundError::NotConfigured { service: SERVICE })?;
        base.join(path).map_err(|err| {
            OutboundError::Transport(TransportError::Other {
                message: format!("invalid request path: {err}"),
            })
        })
    }

    /// Send one message through the relay.
    #[instrument(skip(self, message), fields(to = %message.to))]
    pub async fn send_message(&self, message: &OutboundMessage) -> Result<(), OutboundError> {
        let url = self.relay_url("messages")?;
        let username = self
            .username
            .as_deref()
            .ok_or(OutboundError::NotConfigured { service: SERVICE })?;
        let payload = RelayPayload {
            from: &self.from_address,
            to: &message.to,
            subject: &message.subject,
            body: &message.body,
        };

        self.gate
            .call(|| {
                let request = self
                    .transport
                    .client()
                    .post(url.clone())
                    .basic_auth(username, self.password.as_deref())
                    .json(&payload);
                async { self.transport.execute(request).await.map(|_| ()) }
            })
            .await?;

        info!(to = %message.to, "mail accepted by relay");
        Ok(())
    }

    /// Probe the relay directly, without retry or breaker.
    #[instrument(skip(self))]
    pub async fn perform_health_check(&self) -> HealthProbe {
        let url = match self.relay_url("status") {
            Ok(url) => url,
            Err(_) => {
                return HealthProbe {
                    healthy: false,
                    response_time_ms: 0,
                    reason: Some("not configured".to_string()),
                };
            }
        };

        let started = Instant::now();
        // Probes get a tighter timeout than regular traffic.
        let request = self
            .transport
            .client()
            .get(url)
            .timeout(std::time::Duration::from_secs(5))
            .basic_auth(self.username.as_deref().unwrap_or_default(), self.password.as_deref());
        let result = self.transport.execute(request).await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let probe = match result {
            Ok(_) => HealthProbe { healthy: true, response_time_ms, reason: None },
            Err(err) => {
                warn!(error = %err, "mail relay health probe failed");
                HealthProbe { healthy: false, response_time_ms, reason: Some(err.to_string()) }
            }
        };
        self.gate.health().record_probe(probe.healthy);
        probe
    }
}

#[async_trait]
impl DeliveryHandler for MailerClient {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), OutboundError> {
        self.send_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_mailer_fails_fast() {
        let client = MailerClient::new(
            &MailConfig::default(),
            &CircuitBreakerSettings::default(),
            &RetrySettings::default(),
        )
        .unwrap();

        let message = OutboundMessage {
            to: "user@example.com".to_string(),
            subject: "hi".to_string(),
            body: "hello".to_string(),
        };
        let result = client.send_message(&message).await;
        assert!(matches!(result, Err(OutboundError::NotConfigured { .. })));
    }

    #[test]
    fn missing_from_address_gets_a_default() {
        let config = MailConfig {
            host: Some("http://relay.local/".to_string()),
            username: Some("subsarr".to_string()),
            password: Some("secret".to_string()),
            from_address: None,
            timeout_ms: 1_000,
        };
        let client = MailerClient::new(
            &config,
            &CircuitBreakerSettings::default(),
            &RetrySettings::default(),
        )
        .unwrap();
        assert_eq!(client.from_address, "subsarr@localhost");
    }
}
