//! Connection settings for each backend type

use std::sync::Arc;
use std::time::Duration;

use libunieval_core::{BackendAdapter, EvalError, DEFAULT_REQUEST_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::flight::{FlightAdapter, RawFlightAdapter};
use crate::rest_sse::RestSseAdapter;

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// REST + SSE backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestSseConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RestSseConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Arrow Flight backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightConfig {
    /// Flight endpoint, e.g. `grpc://localhost:8815`
    pub flight_uri: String,
    /// Optional HTTP health endpoint probed before falling back to ListFlights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FlightConfig {
    pub fn new(flight_uri: impl Into<String>) -> Self {
        Self {
            flight_uri: flight_uri.into(),
            health_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_health_url(mut self, url: impl Into<String>) -> Self {
        self.health_url = Some(url.into());
        self
    }
}

/// Settings for one named backend, tagged by its `type` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    RestSse(RestSseConfig),
    ArrowFlight(FlightConfig),
    ArrowFlightRaw(FlightConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::RestSse(_) => "rest_sse",
            BackendConfig::ArrowFlight(_) => "arrow_flight",
            BackendConfig::ArrowFlightRaw(_) => "arrow_flight_raw",
        }
    }

    /// Where the backend lives, for display
    pub fn endpoint(&self) -> &str {
        match self {
            BackendConfig::RestSse(c) => &c.base_url,
            BackendConfig::ArrowFlight(c) | BackendConfig::ArrowFlightRaw(c) => &c.flight_uri,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs())
    }

    fn timeout_secs(&self) -> u64 {
        match self {
            BackendConfig::RestSse(c) => c.timeout_secs,
            BackendConfig::ArrowFlight(c) | BackendConfig::ArrowFlightRaw(c) => c.timeout_secs,
        }
    }

    /// Override the per-request timeout
    pub fn set_timeout_secs(&mut self, secs: u64) {
        match self {
            BackendConfig::RestSse(c) => c.timeout_secs = secs,
            BackendConfig::ArrowFlight(c) | BackendConfig::ArrowFlightRaw(c) => c.timeout_secs = secs,
        }
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if self.timeout_secs() == 0 {
            return Err(EvalError::Config("timeout_secs must be at least 1".to_string()));
        }
        match self {
            BackendConfig::RestSse(c) => {
                if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
                    return Err(EvalError::Config(format!(
                        "base_url must be an http(s) URL, got '{}'",
                        c.base_url
                    )));
                }
            }
            BackendConfig::ArrowFlight(c) | BackendConfig::ArrowFlightRaw(c) => {
                crate::flight::endpoint_uri(&c.flight_uri).map_err(|e| EvalError::Config(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Build the adapter for backend `name`
    pub fn build(&self, name: &str) -> Result<Arc<dyn BackendAdapter>, EvalError> {
        self.validate()?;
        let adapter: Arc<dyn BackendAdapter> = match self {
            BackendConfig::RestSse(c) => Arc::new(RestSseAdapter::new(name, c.clone())),
            BackendConfig::ArrowFlight(c) => Arc::new(FlightAdapter::new(name, c.clone())),
            BackendConfig::ArrowFlightRaw(c) => Arc::new(RawFlightAdapter::new(name, c.clone())),
        };
        Ok(adapter)
    }
}
