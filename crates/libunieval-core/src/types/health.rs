use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::query::ConnectorRef;

/// Result of a backend liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub reachable: bool,
    #[serde(with = "crate::serde_secs")]
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthResult {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            reachable: true,
            latency,
            detail: None,
        }
    }

    pub fn unhealthy(latency: Duration, detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency,
            detail: Some(detail.into()),
        }
    }
}

/// A connector as reported by the backend's listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub id: ConnectorRef,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ping: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl ConnectorInfo {
    pub fn new(id: impl Into<ConnectorRef>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            connected_at: None,
            last_ping: None,
            metadata: serde_json::Value::Null,
        }
    }
}
