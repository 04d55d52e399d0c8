//! Service health probe
//!
//! HTTP liveness checks against a service job's endpoint. Unreachable
//! services are an ordinary outcome, not an error.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Path of the health endpoint
pub const HEALTH_PATH: &str = "/health";

/// Path of the version endpoint
pub const VERSION_PATH: &str = "/version";

/// Default probe timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The health endpoint answered with a success status
    Healthy { status: u16 },
    /// The endpoint answered, but not with a success status
    Unhealthy { status: u16 },
    /// Connection refused, timed out or otherwise failed
    NotResponding { reason: String },
}

impl ProbeOutcome {
    /// Whether the service counts as reachable and healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

#[derive(Deserialize)]
struct VersionBody {
    version: String,
}

/// HTTP client for service health checks
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: Client,
}

impl HealthProbe {
    /// Creates a probe with the default 5 second timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a probe with a custom timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    /// Issues `GET <base_url>/health`
    pub async fn check(&self, base_url: &str) -> ProbeOutcome {
        let url = format!("{}{}", base_url.trim_end_matches('/'), HEALTH_PATH);
        debug!("Probing {}", url);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Healthy {
                status: response.status().as_u16(),
            },
            Ok(response) => ProbeOutcome::Unhealthy {
                status: response.status().as_u16(),
            },
            Err(e) => ProbeOutcome::NotResponding {
                reason: describe(&e),
            },
        }
    }

    /// Best-effort `GET <base_url>/version`
    ///
    /// Accepts either a JSON body with a `version` field or plain text.
    pub async fn version(&self, base_url: &str) -> Option<String> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), VERSION_PATH);

        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            debug!("Version endpoint returned {}", response.status());
            return None;
        }

        let body = response.text().await.ok()?;
        match serde_json::from_str::<VersionBody>(&body) {
            Ok(parsed) => Some(parsed.version),
            Err(_) => {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "timed out".to_string()
    } else if error.is_connect() {
        "connection refused".to_string()
    } else {
        error.to_string()
    }
}
