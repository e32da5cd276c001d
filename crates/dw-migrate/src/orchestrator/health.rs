//! Connectivity health checks.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::{Destination, SourceReader};

/// Status of one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub name: String,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointHealth {
    fn from_outcome(name: &str, started: Instant, outcome: crate::error::Result<()>) -> Self {
        Self {
            name: name.to_string(),
            connected: outcome.is_ok(),
            latency_ms: started.elapsed().as_millis() as u64,
            error: outcome.err().map(|e| e.to_string()),
        }
    }
}

/// Result of checking the source and the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<EndpointHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<EndpointHealth>,
}

impl HealthCheckResult {
    pub fn new(source: Option<EndpointHealth>, destination: Option<EndpointHealth>) -> Self {
        let healthy = source.iter().chain(destination.iter()).all(|e| e.connected);
        Self {
            healthy,
            source,
            destination,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub async fn probe_source(source: &dyn SourceReader) -> EndpointHealth {
    let started = Instant::now();
    let outcome = source.test_connection().await;
    EndpointHealth::from_outcome(source.name(), started, outcome)
}

pub async fn probe_destination(destination: &dyn Destination) -> EndpointHealth {
    let started = Instant::now();
    let outcome = destination.test_connection().await;
    EndpointHealth::from_outcome(destination.name(), started, outcome)
}
