//! Media-directory server client
//!
//! Talks to an Emby/Jellyfin-compatible directory server over its HTTP API.
//! Every operation goes through the shared [`OutboundGate`], so calls are
//! retried, breaker-guarded, and reflected in the health counters. The
//! explicit health probe bypasses the gate: a probe must report what the
//! server actually did, not what the resilience layer made of it.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use subsarr_common::resilience::{ConfigError, ConfigResult, HealthSnapshot};
use subsarr_domain::config::{CircuitBreakerSettings, DirectoryConfig, RetrySettings};

use crate::http::HttpTransport;

use super::errors::{OutboundError, TransportError};
use super::gate::OutboundGate;

const SERVICE: &str = "media-directory";
const AUTH_HEADER: &str = "X-Emby-Token";

/// A user account on the directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Policy", default)]
    pub policy: DirectoryUserPolicy,
}

/// The subset of the user policy this layer cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryUserPolicy {
    #[serde(rename = "IsDisabled", default)]
    pub is_disabled: bool,
}

/// An active playback/browse session on the directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySession {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "UserId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "UserName", default)]
    pub user_name: Option<String>,
    #[serde(rename = "Client", default)]
    pub client: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

/// Result of one explicit health probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthProbe {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub reason: Option<String>,
}

/// Client for the media-directory server.
pub struct DirectoryClient {
    gate: OutboundGate,
    transport: HttpTransport,
    base_url: Option<Url>,
    api_key: Option<String>,
}

impl DirectoryClient {
    /// Build a client from configuration.
    ///
    /// A missing endpoint or API key is not an error: the client is created
    /// in the not-configured state and every call fails fast.
    pub fn new(
        config: &DirectoryConfig,
        breaker: &CircuitBreakerSettings,
        retry: &RetrySettings,
    ) -> ConfigResult<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|err| ConfigError::Invalid {
                message: format!("invalid directory base URL: {err}"),
            })?;
        let transport = HttpTransport::new(config.timeout()).map_err(|err| {
            ConfigError::Invalid { message: format!("failed to build HTTP transport: {err}") }
        })?;
        let gate = OutboundGate::new(SERVICE, breaker, retry, config.is_configured())?;

        Ok(Self { gate, transport, base_url, api_key: config.api_key.clone() })
    }

    /// Current health snapshot for this dependency.
    pub fn health_status(&self) -> HealthSnapshot {
        self.gate.health_snapshot()
    }

    fn endpoint(&self, path: &str) -> Result<Url, OutboundError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or(OutboundError::NotConfigured { service: SERVICE })?;
        base.join(path).map_err(|err| {
            OutboundError::Transport(TransportError::Other {
                message: format!("invalid request path: {err}"),
            })
        })
    }

    fn api_key(&self) -> Result<&str, OutboundError> {
        self.api_key
            .as_deref()
            .ok_or(OutboundError::NotConfigured { service: SERVICE })
    }

    /// Create a new user account.
    #[instrument(skip(self, password))]
    pub async fn create_user(
        &self,
        name: &str,
        password: &str,
    ) -> Result<DirectoryUser, OutboundError> {
        let url = self.endpoint("Users/New")?;
        let key = self.api_key()?;

        let user: DirectoryUser = self
            .gate
            .call(|| {
                let request = self
                    .transport
                    .client()
                    .post(url.clone())
                    .header(AUTH_HEADER, key)
                    .json(&CreateUserRequest { name, password });
                self.transport.execute_json(request)
            })
            .await?;

        info!(user_id = %user.id, "created directory user");
        Ok(user)
    }

    /// List all user accounts.
    #[instrument(skip(self))]
    pub async fn fetch_users(&self) -> Result<Vec<DirectoryUser>, OutboundError> {
        let url = self.endpoint("Users")?;
        let key = self.api_key()?;

        self.gate
            .call(|| {
                let request =
                    self.transport.client().get(url.clone()).header(AUTH_HEADER, key);
                self.transport.execute_json(request)
            })
            .await
    }

    /// Enable or disable a user account via its policy.
    #[instrument(skip(self))]
    pub async fn set_user_enabled(
        &self,
        user_id: &str,
        enabled: bool,
    ) -> Result<(), OutboundError> {
        let url = self.endpoint(&format!("Users/{user_id}/Policy"))?;
        let key = self.api_key()?;
        let body = serde_json::json!({ "IsDisabled": !enabled });

        self.gate
            .call(|| {
                let request = self
                    .transport
                    .client()
                    .post(url.clone())
                    .header(AUTH_HEADER, key)
                    .json(&body);
                async { self.transport.execute(request).await.map(|_| ()) }
            })
            .await?;

        info!(user_id, enabled, "updated directory user policy");
        Ok(())
    }

    /// Delete a user account.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<(), OutboundError> {
        let url = self.endpoint(&format!("Users/{user_id}"))?;
        let key = self.api_key()?;

        self.gate
            .call(|| {
                let request =
                    self.transport.client().delete(url.clone()).header(AUTH_HEADER, key);
                async { self.transport.execute(request).await.map(|_| ()) }
            })
            .await?;

        info!(user_id, "deleted directory user");
        Ok(())
    }

    /// List active sessions.
    #[instrument(skip(self))]
    pub async fn fetch_sessions(&self) -> Result<Vec<DirectorySession>, OutboundError> {
        let url = self.endpoint("Sessions")?;
        let key = self.api_key()?;

        self.gate
            .call(|| {
                let request =
                    self.transport.client().get(url.clone()).header(AUTH_HEADER, key);
                self.transport.execute_json(request)
            })
            .await
    }

    /// Probe the server directly, without retry or breaker.
    ///
    /// The outcome feeds the health monitor's probe state; on a configured
    /// client this is what flips status between healthy and unhealthy.
    #[instrument(skip(self))]
    pub async fn perform_health_check(&self) -> HealthProbe {
        let url = match self.endpoint("System/Ping") {
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
            .timeout(std::time::Duration::from_secs(5));
        let result = self.transport.execute(request).await;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let probe = match result {
            Ok(_) => HealthProbe { healthy: true, response_time_ms, reason: None },
            Err(err) => {
                warn!(error = %err, "directory health probe failed");
                HealthProbe { healthy: false, response_time_ms, reason: Some(err.to_string()) }
            }
        };
        self.gate.health().record_probe(probe.healthy);
        probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> DirectoryConfig {
        DirectoryConfig {
            base_url: Some("http://media.local:8096/".to_string()),
            api_key: Some("secret".to_string()),
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn rejects_malformed_base_url() {
        let config = DirectoryConfig {
            base_url: Some("not a url".to_string()),
            api_key: Some("secret".to_string()),
            timeout_ms: 0,
        };
        let result = DirectoryClient::new(
            &config,
            &CircuitBreakerSettings::default(),
            &RetrySettings::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn joins_paths_against_the_base_url() {
        let client = DirectoryClient::new(
            &configured(),
            &CircuitBreakerSettings::default(),
            &RetrySettings::default(),
        )
        .unwrap();
        let url = client.endpoint("Users/abc/Policy").unwrap();
        assert_eq!(url.as_str(), "http://media.local:8096/Users/abc/Policy");
    }

    #[tokio::test]
    async fn unconfigured_client_fails_fast() {
        let client = DirectoryClient::new(
            &DirectoryConfig::default(),
            &CircuitBreakerSettings::default(),
            &RetrySettings::default(),
        )
        .unwrap();

        let result = client.fetch_users().await;
        assert!(matches!(result, Err(OutboundError::NotConfigured { .. })));
    }

    #[test]
    fn user_deserializes_from_directory_payload() {
        let json = r#"{"Id":"u1","Name":"alice","Policy":{"IsDisabled":true}}"#;
        let user: DirectoryUser = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.policy.is_disabled);

        // Policy is optional in list responses.
        let json = r#"{"Id":"u2","Name":"bob"}"#;
        let user: DirectoryUser = serde_json::from_str(json).unwrap();
        assert!(!user.policy.is_disabled);
    }
}
