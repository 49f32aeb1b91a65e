//! Core of the unieval benchmark engine
//!
//! This crate provides:
//! - The per-request data model (QuerySpec, TransferEvent, RequestOutcome)
//! - The backend capability contract (BackendAdapter) and the shared
//!   timed-transfer driver every adapter executes through
//! - The workload dispatcher (bounded worker pool, round-robin connectors,
//!   cooperative cancellation)
//! - The metrics aggregator (nearest-rank percentiles, TTFB, throughput)
//!
//! Transport implementations live in `libunieval-transport`.

pub mod adapter;
pub mod dispatch;
pub mod error;
pub mod metrics;
mod serde_secs;
pub mod transfer;
pub mod types;

pub use adapter::{BackendAdapter, PayloadStream, Transfer};
pub use dispatch::{Dispatcher, LoadTestConfig, Progress, RunReport};
pub use error::{EvalError, TransferError};
pub use metrics::{LatencyStats, RunWindow, Summary};
pub use types::{
    ConnectorInfo, ConnectorRef, ErrorKind, HealthResult, OutcomeBuilder, QueryPattern,
    QuerySpec, RequestOutcome, TransferEvent,
};

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Connector used when none are configured and the backend lists none
pub const DEFAULT_CONNECTOR: &str = "default";
