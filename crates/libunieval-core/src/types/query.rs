use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorRef(String);

impl ConnectorRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectorRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectorRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How the payload is requested from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPattern {
    /// One request, one (possibly chunked) response body
    Sync,
    /// A stream session delivering incremental payload frames
    Stream,
}

impl QueryPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPattern::Sync => "sync",
            QueryPattern::Stream => "stream",
        }
    }
}

impl fmt::Display for QueryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(QueryPattern::Sync),
            "stream" => Ok(QueryPattern::Stream),
            other => Err(format!("unknown query pattern '{}'. Use: sync or stream", other)),
        }
    }
}

/// One request to execute against a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Dispatch sequence index, 0-based
    pub index: usize,
    pub connector: ConnectorRef,
    pub dataset: String,
    pub pattern: QueryPattern,
    /// Optional cap on the number of rows the backend should return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u64>,
}

impl QuerySpec {
    pub fn new(
        index: usize,
        connector: ConnectorRef,
        dataset: impl Into<String>,
        pattern: QueryPattern,
    ) -> Self {
        Self {
            index,
            connector,
            dataset: dataset.into(),
            pattern,
            row_limit: None,
        }
    }

    pub fn with_row_limit(mut self, rows: Option<u64>) -> Self {
        self.row_limit = rows;
        self
    }
}
