// src/discovery/probe.rs

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::{GatewayError, ProbeError, Result};

/// What a healthy service reported about itself
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    /// Seconds since the service started
    pub uptime: Option<f64>,
    pub version: Option<String>,
    /// Service-defined endpoint listing, kept verbatim
    pub endpoints: Option<serde_json::Value>,
}

impl HealthReport {
    /// Lenient parse of a health body. Anything that is not a JSON object, or
    /// fields of the wrong type, simply yield `None`.
    pub fn from_body(body: &[u8]) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Health body is not JSON, ignoring details");
                return Self::default();
            }
        };

        let version = match value.get("version") {
            Some(serde_json::Value::String(v)) => Some(v.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Self {
            uptime: value.get("uptime").and_then(serde_json::Value::as_f64),
            version,
            endpoints: value.get("endpoints").filter(|v| !v.is_null()).cloned(),
        }
    }
}

/// Abstraction over a single health check, so sweeps can be tested without HTTP
#[async_trait]
pub trait HealthProbe: Send + Sync + Debug {
    /// Probe the service rooted at `base_url`. Any error means unhealthy.
    async fn probe(&self, base_url: &str) -> Result<HealthReport>;
}

/// Probes `GET <base_url><health_path>` over HTTP
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    health_path: String,
    timeout_ms: u64,
}

impl HttpHealthProbe {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.check_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            health_path: config.health_path.clone(),
            timeout_ms: config.check_timeout.as_millis() as u64,
        })
    }

    pub fn health_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.health_path)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, base_url: &str) -> Result<HealthReport> {
        let url = self.health_url(base_url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Probe(ProbeError::Timeout(self.timeout_ms))
            } else {
                GatewayError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Probe(ProbeError::Status(status.as_u16())));
        }

        let body = response.bytes().await?;
        Ok(HealthReport::from_body(&body))
    }
}
