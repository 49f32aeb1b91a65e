//! Backend adapters for unieval
//!
//! This crate provides:
//! - RestSseAdapter: HTTP request/response and SSE / end-marker streaming
//! - FlightAdapter: Arrow Flight with IPC decoding
//! - RawFlightAdapter: Arrow Flight counting raw data bodies without decoding
//! - BackendConfig: serde-deserialisable connection settings and the
//!   factory that turns them into a shared adapter

pub mod classify;
pub mod config;
pub mod connection;
pub mod flight;
pub mod framing;
pub mod rest_sse;

pub use config::{BackendConfig, FlightConfig, RestSseConfig};
pub use connection::SharedConnection;
pub use flight::{FlightAdapter, RawFlightAdapter};
pub use rest_sse::RestSseAdapter;

/// Timeout applied to health probes, in milliseconds
pub const HEALTH_TIMEOUT_MS: u64 = 5_000;

/// Largest gRPC message the Flight clients accept
pub const MAX_FLIGHT_MESSAGE_BYTES: usize = 200 * 1024 * 1024;
