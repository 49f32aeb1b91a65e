//! Evaluator configuration file (`unieval.toml`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use libunieval_transport::{BackendConfig, FlightConfig, RestSseConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// CSV file per-request records are appended to; empty disables it
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
}

fn default_output_file() -> PathBuf {
    PathBuf::from("metrics.csv")
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
        }
    }
}

impl MetricsConfig {
    pub fn csv_file(&self) -> Option<&Path> {
        (!self.output_file.as_os_str().is_empty()).then_some(self.output_file.as_path())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,
}

fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(
        "system1".to_string(),
        BackendConfig::RestSse(RestSseConfig::new("http://localhost:8000")),
    );
    backends.insert(
        "system2".to_string(),
        BackendConfig::ArrowFlight(
            FlightConfig::new("grpc://localhost:8815").with_health_url("http://localhost:8080/health"),
        ),
    );
    backends.insert(
        "system3".to_string(),
        BackendConfig::ArrowFlightRaw(FlightConfig::new("grpc://localhost:8816")),
    );
    backends
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            backends: default_backends(),
        }
    }
}

impl EvaluatorConfig {
    /// Load from `path`; a missing file yields the built-in defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.backends.is_empty() {
            return Err(CliError::Config("no backends configured".to_string()));
        }
        Ok(config)
    }

    /// Look up a backend by name
    pub fn backend(&self, name: &str) -> Result<&BackendConfig> {
        self.backends.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.backends.keys().map(String::as_str).collect();
            CliError::Config(format!(
                "unknown backend '{}'. Available: {}",
                name,
                available.join(", ")
            ))
        })
    }
}
