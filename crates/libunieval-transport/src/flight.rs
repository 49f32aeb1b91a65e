//! Arrow Flight backend adapters
//!
//! Both adapters resolve a dataset with `GetFlightInfo` on the path
//! `[connector, dataset, rows?]` and fetch it with `DoGet` on the first
//! endpoint's ticket. They differ in how the `DoGet` stream is consumed:
//! - [`FlightAdapter`] decodes the Arrow IPC stream; each record batch is a
//!   payload chunk and schema messages are not payload.
//! - [`RawFlightAdapter`] does no decoding; each `FlightData` message with a
//!   non-empty `data_body` is a payload chunk. This suits gateways whose IPC
//!   framing the decoding client rejects.
//!
//! The end of `GetFlightInfo` is recorded as the metadata phase of the
//! request, splitting latency into metadata and transfer time.

use std::collections::HashSet;
use std::time::Duration;

use arrow_flight::decode::{DecodedFlightData, DecodedPayload};
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Criteria, FlightClient, FlightData, FlightDescriptor, FlightInfo, Ticket};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use libunieval_core::{
    BackendAdapter, ConnectorInfo, HealthResult, PayloadStream, QueryPattern, QuerySpec, Transfer,
    TransferError,
};
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;
use tracing::debug;

use crate::classify::{self, error_chain};
use crate::config::FlightConfig;
use crate::connection::SharedConnection;
use crate::{HEALTH_TIMEOUT_MS, MAX_FLIGHT_MESSAGE_BYTES};

const PATTERNS: &[QueryPattern] = &[QueryPattern::Sync, QueryPattern::Stream];

/// Translate a Flight location into a tonic endpoint URI
pub fn endpoint_uri(uri: &str) -> Result<String, TransferError> {
    if let Some(authority) = uri
        .strip_prefix("grpc+tcp://")
        .or_else(|| uri.strip_prefix("grpc://"))
    {
        return Ok(format!("http://{}", authority));
    }
    if uri.starts_with("http://") {
        return Ok(uri.to_string());
    }
    Err(TransferError::Protocol(format!(
        "unsupported flight uri '{}' (expected grpc://, grpc+tcp:// or http://)",
        uri
    )))
}

/// Flight path descriptor for a query
pub fn descriptor_for(spec: &QuerySpec) -> FlightDescriptor {
    let mut path = vec![spec.connector.to_string(), spec.dataset.clone()];
    if let Some(rows) = spec.row_limit {
        path.push(rows.to_string());
    }
    FlightDescriptor::new_path(path)
}

fn first_ticket(info: &FlightInfo) -> Result<Ticket, TransferError> {
    info.endpoint
        .iter()
        .find_map(|endpoint| endpoint.ticket.clone())
        .ok_or_else(|| TransferError::Protocol("no endpoints returned".to_string()))
}

/// Connection and operations shared by both Flight adapters
struct FlightSession {
    name: String,
    config: FlightConfig,
    channel: SharedConnection<Channel>,
}

impl FlightSession {
    fn new(name: String, config: FlightConfig) -> Self {
        Self {
            name,
            config,
            channel: SharedConnection::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn channel(&self) -> Result<Channel, TransferError> {
        self.channel.get_or_try_init(|| {
            let uri = endpoint_uri(&self.config.flight_uri)?;
            let endpoint = Endpoint::from_shared(uri)
                .map_err(|e| TransferError::Protocol(error_chain(&e)))?
                .tcp_nodelay(true);
            Ok(endpoint.connect_lazy())
        })
    }

    fn service_client(&self) -> Result<FlightServiceClient<Channel>, TransferError> {
        Ok(FlightServiceClient::new(self.channel()?)
            .max_decoding_message_size(MAX_FLIGHT_MESSAGE_BYTES))
    }

    fn grpc_error(&self, status: Status) -> TransferError {
        classify::grpc_status(&status, self.timeout())
    }

    async fn health(&self) -> HealthResult {
        let started = Instant::now();

        if let Some(url) = &self.config.health_url {
            match http_probe(url).await {
                Ok(()) => return HealthResult::healthy(started.elapsed()),
                Err(reason) => {
                    debug!(backend = %self.name, "http health probe failed, trying ListFlights: {}", reason);
                }
            }
        }

        let mut client = match self.service_client() {
            Ok(client) => client,
            Err(e) => return HealthResult::unhealthy(started.elapsed(), e.to_string()),
        };
        let probe = tokio::time::timeout(
            Duration::from_millis(HEALTH_TIMEOUT_MS),
            client.list_flights(Criteria::default()),
        )
        .await;

        match probe {
            Ok(Ok(_)) => HealthResult::healthy(started.elapsed()),
            Ok(Err(status)) => HealthResult::unhealthy(started.elapsed(), self.grpc_error(status).to_string()),
            Err(_) => HealthResult::unhealthy(started.elapsed(), "ListFlights probe timed out"),
        }
    }

    async fn list_connectors(&self) -> Result<Vec<ConnectorInfo>, TransferError> {
        let mut client = self.service_client()?;
        let mut flights = client
            .list_flights(Criteria::default())
            .await
            .map_err(|s| self.grpc_error(s))?
            .into_inner();

        let mut seen = HashSet::new();
        let mut connectors = Vec::new();
        while let Some(info) = flights.next().await {
            let info = info.map_err(|s| self.grpc_error(s))?;
            let Some(tenant) = info.flight_descriptor.as_ref().and_then(|d| d.path.first()) else {
                continue;
            };
            if !seen.insert(tenant.clone()) {
                continue;
            }

            let mut connector = ConnectorInfo::new(tenant.as_str(), "connected");
            connector.metadata = serde_json::json!({
                "total_records": info.total_records,
                "total_bytes": info.total_bytes,
            });
            connectors.push(connector);
        }
        Ok(connectors)
    }

    fn close(&self) {
        if self.channel.close() {
            debug!(backend = %self.name, "flight channel released");
        }
    }
}

async fn http_probe(url: &str) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(HEALTH_TIMEOUT_MS))
        .build()
        .map_err(|e| error_chain(&e))?;
    let response = client.get(url).send().await.map_err(|e| error_chain(&e))?;
    if response.status() == reqwest::StatusCode::OK {
        Ok(())
    } else {
        Err(format!("HTTP {}", response.status()))
    }
}

/// Arrow Flight adapter that decodes the IPC stream
pub struct FlightAdapter {
    session: FlightSession,
}

impl FlightAdapter {
    pub fn new(name: impl Into<String>, config: FlightConfig) -> Self {
        Self {
            session: FlightSession::new(name.into(), config),
        }
    }
}

#[async_trait]
impl BackendAdapter for FlightAdapter {
    fn name(&self) -> &str {
        &self.session.name
    }

    fn supported_patterns(&self) -> &[QueryPattern] {
        PATTERNS
    }

    fn request_timeout(&self) -> Duration {
        self.session.timeout()
    }

    async fn health(&self) -> HealthResult {
        self.session.health().await
    }

    async fn list_connectors(&self) -> Result<Vec<ConnectorInfo>, TransferError> {
        self.session.list_connectors().await
    }

    async fn open_transfer(&self, spec: QuerySpec) -> Result<Transfer, TransferError> {
        let timeout = self.session.timeout();
        let mut client = FlightClient::new_from_inner(self.session.service_client()?);

        let info = client
            .get_flight_info(descriptor_for(&spec))
            .await
            .map_err(|e| classify::flight_error(e, timeout))?;
        let metadata_at = Instant::now();
        let ticket = first_ticket(&info)?;

        let batches = client
            .do_get(ticket)
            .await
            .map_err(|e| classify::flight_error(e, timeout))?
            .into_inner();

        let mut seen_batch = false;
        let payload = batches
            .filter_map(move |item| {
                let chunk = match item {
                    Ok(DecodedFlightData {
                        inner,
                        payload: DecodedPayload::RecordBatch(_),
                    }) => {
                        seen_batch = true;
                        Some(Ok(inner.data_body))
                    }
                    Ok(_) => None,
                    Err(e) if seen_batch => Some(Err(classify::flight_stream_error(e, timeout))),
                    Err(e) => Some(Err(classify::flight_error(e, timeout))),
                };
                future::ready(chunk)
            })
            .boxed();

        Ok(Transfer::new(payload).with_metadata_at(metadata_at))
    }

    async fn close(&self) {
        self.session.close();
    }
}

/// Arrow Flight adapter that counts raw data bodies without decoding
pub struct RawFlightAdapter {
    session: FlightSession,
}

impl RawFlightAdapter {
    pub fn new(name: impl Into<String>, config: FlightConfig) -> Self {
        Self {
            session: FlightSession::new(name.into(), config),
        }
    }
}

#[async_trait]
impl BackendAdapter for RawFlightAdapter {
    fn name(&self) -> &str {
        &self.session.name
    }

    fn supported_patterns(&self) -> &[QueryPattern] {
        PATTERNS
    }

    fn request_timeout(&self) -> Duration {
        self.session.timeout()
    }

    async fn health(&self) -> HealthResult {
        self.session.health().await
    }

    async fn list_connectors(&self) -> Result<Vec<ConnectorInfo>, TransferError> {
        self.session.list_connectors().await
    }

    async fn open_transfer(&self, spec: QuerySpec) -> Result<Transfer, TransferError> {
        let mut client = self.session.service_client()?;

        let info = client
            .get_flight_info(descriptor_for(&spec))
            .await
            .map_err(|s| self.session.grpc_error(s))?
            .into_inner();
        let metadata_at = Instant::now();
        let ticket = first_ticket(&info)?;

        let frames = client
            .do_get(ticket)
            .await
            .map_err(|s| self.session.grpc_error(s))?
            .into_inner();

        let payload = raw_bodies(frames.boxed(), self.session.timeout());
        Ok(Transfer::new(payload).with_metadata_at(metadata_at))
    }

    async fn close(&self) {
        self.session.close();
    }
}

/// Non-empty data bodies are payload; a stream with none is a protocol error.
/// A transport failure after the first body truncated the stream.
fn raw_bodies(frames: BoxStream<'static, Result<FlightData, Status>>, timeout: Duration) -> PayloadStream {
    stream::unfold(Some((frames, false)), move |state| async move {
        let (mut frames, mut seen_body) = state?;
        loop {
            match frames.next().await {
                Some(Ok(data)) if data.data_body.is_empty() => continue,
                Some(Ok(data)) => {
                    seen_body = true;
                    return Some((Ok(data.data_body), Some((frames, seen_body))));
                }
                Some(Err(status)) => {
                    let error = if seen_body {
                        classify::grpc_stream_status(&status, timeout)
                    } else {
                        classify::grpc_status(&status, timeout)
                    };
                    return Some((Err(error), None));
                }
                None if seen_body => return None,
                None => {
                    return Some((Err(TransferError::Protocol("no data received".to_string())), None));
                }
            }
        }
    })
    .boxed()
}
