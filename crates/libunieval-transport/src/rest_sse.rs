//! REST + SSE backend adapter
//!
//! Endpoints:
//! - `GET  /health`
//! - `GET  /hosts/active`
//! - `POST /datasets/request-sync` (SYNC; payload is the response body)
//! - `POST /datasets/request-stream` then `GET /datasets/stream/{request_id}`
//!   (STREAM; payload is SSE `data:` frames, or a raw body ended by
//!   [`STREAM_COMPLETE_MARKER`])

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use libunieval_core::{
    BackendAdapter, ConnectorInfo, HealthResult, PayloadStream, QueryPattern, QuerySpec, Transfer,
    TransferError,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classify::{self, error_chain};
use crate::config::RestSseConfig;
use crate::connection::SharedConnection;
use crate::framing::{MarkerFramer, SseDecoder, SseFrame, STREAM_COMPLETE_MARKER};
use crate::HEALTH_TIMEOUT_MS;

const PATTERNS: &[QueryPattern] = &[QueryPattern::Sync, QueryPattern::Stream];

type BodyStream = BoxStream<'static, reqwest::Result<Bytes>>;

#[derive(Deserialize)]
struct ActiveHosts {
    #[serde(default)]
    connectors: Vec<HostEntry>,
}

#[derive(Deserialize)]
struct HostEntry {
    #[serde(default)]
    mac_address: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    connected_at: Option<String>,
    #[serde(default)]
    last_ping: Option<String>,
}

#[derive(Deserialize)]
struct StreamSession {
    request_id: String,
}

/// Adapter for the HTTP request/response and SSE streaming backend
pub struct RestSseAdapter {
    name: String,
    config: RestSseConfig,
    client: SharedConnection<Client>,
}

impl RestSseAdapter {
    pub fn new(name: impl Into<String>, config: RestSseConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: SharedConnection::new(),
        }
    }

    fn client(&self) -> Result<Client, TransferError> {
        self.client.get_or_try_init(|| {
            // No client-level timeouts: the request deadline is enforced by the transfer driver
            Client::builder()
                .build()
                .map_err(|e| TransferError::Protocol(error_chain(&e)))
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn request_body(spec: &QuerySpec) -> serde_json::Value {
        let mut body = serde_json::json!({
            "mac_address": spec.connector.as_str(),
            "dataset_name": spec.dataset,
        });
        if let Some(rows) = spec.row_limit {
            body["rows"] = rows.into();
        }
        body
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, TransferError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify::http_error(e, self.timeout()))?;
        check_status(response).await
    }

    async fn open_sync(&self, client: Client, spec: &QuerySpec) -> Result<Transfer, TransferError> {
        let response = self
            .send(client.post(self.url("/datasets/request-sync")).json(&Self::request_body(spec)))
            .await?;
        Ok(body_chunks(response.bytes_stream().boxed(), self.timeout()).into())
    }

    async fn open_stream(&self, client: Client, spec: &QuerySpec) -> Result<Transfer, TransferError> {
        let session: StreamSession = self
            .send(client.post(self.url("/datasets/request-stream")).json(&Self::request_body(spec)))
            .await?
            .json()
            .await
            .map_err(|e| TransferError::Protocol(format!("invalid stream session: {}", error_chain(&e))))?;

        debug!(request_id = %session.request_id, connector = %spec.connector, "stream session opened");

        let response = self
            .send(
                client
                    .get(self.url(&format!("/datasets/stream/{}", session.request_id)))
                    .header(ACCEPT, "text/event-stream, application/octet-stream"),
            )
            .await?;

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("text/event-stream"))
            .unwrap_or(false);

        let body = response.bytes_stream().boxed();
        let payload = if is_sse {
            sse_frames(body, self.timeout())
        } else {
            marked_body(body, self.timeout())
        };
        Ok(payload.into())
    }
}

#[async_trait]
impl BackendAdapter for RestSseAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_patterns(&self) -> &[QueryPattern] {
        PATTERNS
    }

    fn request_timeout(&self) -> Duration {
        self.timeout()
    }

    async fn health(&self) -> HealthResult {
        let started = Instant::now();
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return HealthResult::unhealthy(started.elapsed(), e.to_string()),
        };

        let result = client
            .get(self.url("/health"))
            .timeout(Duration::from_millis(HEALTH_TIMEOUT_MS))
            .send()
            .await;
        let latency = started.elapsed();

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => HealthResult::healthy(latency),
            Ok(response) => HealthResult::unhealthy(latency, format!("HTTP {}", response.status())),
            Err(e) => {
                warn!(backend = %self.name, "health check failed: {}", error_chain(&e));
                HealthResult::unhealthy(latency, error_chain(&e))
            }
        }
    }

    async fn list_connectors(&self) -> Result<Vec<ConnectorInfo>, TransferError> {
        let client = self.client()?;
        let hosts: ActiveHosts = self
            .send(client.get(self.url("/hosts/active")))
            .await?
            .json()
            .await
            .map_err(|e| TransferError::Protocol(error_chain(&e)))?;

        Ok(hosts
            .connectors
            .into_iter()
            .filter(|h| !h.mac_address.is_empty())
            .map(|h| ConnectorInfo {
                id: h.mac_address.into(),
                status: h.status.unwrap_or_else(|| "unknown".to_string()),
                connected_at: h.connected_at,
                last_ping: h.last_ping,
                metadata: serde_json::Value::Null,
            })
            .collect())
    }

    async fn open_transfer(&self, spec: QuerySpec) -> Result<Transfer, TransferError> {
        let client = self.client()?;
        match spec.pattern {
            QueryPattern::Sync => self.open_sync(client, &spec).await,
            QueryPattern::Stream => self.open_stream(client, &spec).await,
        }
    }

    async fn close(&self) {
        if self.client.close() {
            debug!(backend = %self.name, "http client released");
        }
    }
}

async fn check_status(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransferError::remote(status.as_u16().to_string(), body))
}

/// Every non-empty body chunk is payload
fn body_chunks(body: BodyStream, timeout: Duration) -> PayloadStream {
    body.map(move |chunk| chunk.map_err(|e| classify::http_error(e, timeout)))
        .boxed()
}

/// Body bytes up to the end marker are payload
fn marked_body(body: BodyStream, timeout: Duration) -> PayloadStream {
    let framer = MarkerFramer::new(STREAM_COMPLETE_MARKER);
    stream::unfold(Some((body, framer)), move |state| async move {
        let (mut body, mut framer) = state?;
        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    let released = framer.push(chunk);
                    if framer.is_done() {
                        return (!released.is_empty()).then_some((Ok(released), None));
                    }
                    if !released.is_empty() {
                        return Some((Ok(released), Some((body, framer))));
                    }
                }
                Some(Err(e)) => return Some((Err(classify::http_error(e, timeout)), None)),
                None => {
                    let released = framer.finish();
                    return (!released.is_empty()).then_some((Ok(released), None));
                }
            }
        }
    })
    .boxed()
}

struct SseState {
    body: BodyStream,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
    eof: bool,
}

/// Each SSE data frame is payload
fn sse_frames(body: BodyStream, timeout: Duration) -> PayloadStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        eof: false,
    };

    stream::unfold(Some(state), move |state| async move {
        let mut state = state?;
        loop {
            match state.pending.pop_front() {
                Some(SseFrame::Data(bytes)) => return Some((Ok(bytes), Some(state))),
                Some(SseFrame::Done) => return None,
                Some(SseFrame::Error(message)) => {
                    return Some((Err(TransferError::remote("sse", message)), None));
                }
                None if state.eof => return None,
                None => {}
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.pending.extend(frames);
                }
                Some(Err(e)) => return Some((Err(classify::http_error(e, timeout)), None)),
                None => {
                    let frames = state.decoder.finish();
                    state.pending.extend(frames);
                    state.eof = true;
                }
            }
        }
    })
    .boxed()
}
