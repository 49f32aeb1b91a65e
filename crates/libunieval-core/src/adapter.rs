//! Backend capability contract

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::transfer;
use crate::types::{ConnectorInfo, HealthResult, QueryPattern, QuerySpec, RequestOutcome};

/// Payload of one in-flight request, as a stream of chunks.
///
/// Adapters yield only application payload: body chunks, SSE `data:` frame
/// payloads, Arrow record batch bodies. Keep-alives, schema messages and
/// transport metadata never appear here.
pub type PayloadStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// An opened transfer
pub struct Transfer {
    pub payload: PayloadStream,
    /// When the protocol's metadata round trip completed (Flight `GetFlightInfo`)
    pub metadata_at: Option<Instant>,
}

impl Transfer {
    pub fn new(payload: PayloadStream) -> Self {
        Self {
            payload,
            metadata_at: None,
        }
    }

    pub fn with_metadata_at(mut self, at: Instant) -> Self {
        self.metadata_at = Some(at);
        self
    }
}

impl From<PayloadStream> for Transfer {
    fn from(payload: PayloadStream) -> Self {
        Self::new(payload)
    }
}

/// Uniform capability surface over one backend protocol.
///
/// One adapter instance is shared by every worker of a run, so
/// implementations hold their long-lived connection internally and must be
/// safe to call concurrently.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend name used in reports and exports
    fn name(&self) -> &str;

    fn supported_patterns(&self) -> &[QueryPattern];

    /// Deadline for one request, covering connect through end of stream
    fn request_timeout(&self) -> Duration;

    /// Probe liveness. Never fails; unreachable backends report `reachable = false`.
    async fn health(&self) -> HealthResult;

    async fn list_connectors(&self) -> Result<Vec<ConnectorInfo>, TransferError>;

    /// Start the transfer for `spec` and hand back its payload stream
    async fn open_transfer(&self, spec: QuerySpec) -> Result<Transfer, TransferError>;

    /// Release the adapter's connection. Called once after a run finishes.
    async fn close(&self) {}

    /// Execute one request to completion, failure, timeout or cancellation
    async fn execute(&self, spec: QuerySpec, cancel: &CancellationToken) -> RequestOutcome {
        self.execute_with(spec, cancel, &mut |_: &Bytes| {}).await
    }

    /// Like [`execute`](Self::execute), handing each payload chunk to `sink` as it arrives
    async fn execute_with(
        &self,
        spec: QuerySpec,
        cancel: &CancellationToken,
        sink: &mut (dyn for<'b> FnMut(&'b Bytes) + Send),
    ) -> RequestOutcome {
        let timeout = self.request_timeout();
        transfer::drive_with(spec, timeout, cancel, |spec| self.open_transfer(spec), sink).await
    }

    fn supports(&self, pattern: QueryPattern) -> bool {
        self.supported_patterns().contains(&pattern)
    }
}
