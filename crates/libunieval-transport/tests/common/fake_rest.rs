//! Fake REST/SSE backend.
//!
//! Spins up an `axum` server on a random port bound to 127.0.0.1. The dataset
//! name selects the behaviour:
//! - `iris`: three 100-byte body chunks (sync) or a raw body with end marker (stream)
//! - `sse`: SSE stream with a keep-alive comment, three data frames and `[DONE]`
//! - `missing`: HTTP 404
//! - `slow`: answers after three seconds

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Default)]
struct ApiState {
    sync_requests: AtomicUsize,
}

/// Handle to the running fake backend
pub struct FakeRest {
    addr: SocketAddr,
    state: Arc<ApiState>,
}

impl FakeRest {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ApiState::default());

        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/hosts/active", get(active_hosts))
            .route("/datasets/request-sync", post(request_sync))
            .route("/datasets/request-stream", post(request_stream))
            .route("/datasets/stream/{request_id}", get(stream_body))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`)
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn sync_requests(&self) -> usize {
        self.state.sync_requests.load(Ordering::SeqCst)
    }
}

async fn active_hosts() -> Json<Value> {
    Json(json!({
        "connectors": [
            {"mac_address": "aa:bb:cc:00:00:01", "status": "connected", "connected_at": "2026-10-01T10:00:00Z"},
            {"mac_address": "aa:bb:cc:00:00:02"},
            {"status": "connected"}
        ]
    }))
}

fn dataset_of(body: &Value) -> String {
    body["dataset_name"].as_str().unwrap_or_default().to_string()
}

fn text(parts: &[&'static str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect()
}

fn chunked(chunks: Vec<Bytes>, delay: Duration) -> Body {
    let stream = stream::iter(chunks).then(move |chunk| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, std::io::Error>(chunk)
    });
    Body::from_stream(stream)
}

async fn request_sync(State(state): State<Arc<ApiState>>, Json(body): Json<Value>) -> Response {
    state.sync_requests.fetch_add(1, Ordering::SeqCst);

    match dataset_of(&body).as_str() {
        "missing" => (StatusCode::NOT_FOUND, "dataset not found").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "late".into_response()
        }
        _ => {
            let chunk = Bytes::from(vec![b'x'; 100]);
            chunked(vec![chunk.clone(), chunk.clone(), chunk], Duration::from_millis(10)).into_response()
        }
    }
}

async fn request_stream(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "request_id": dataset_of(&body) }))
}

async fn stream_body(Path(request_id): Path<String>) -> Response {
    match request_id.as_str() {
        "sse" => (
            [(header::CONTENT_TYPE, "text/event-stream")],
            chunked(
                text(&[
                    ": keep-alive\n\n",
                    "data: 0123456789\n\n",
                    "data: 01234",
                    "56789\n\ndata: 0123456789\n\n",
                    "data: [DONE]\n\n",
                ]),
                Duration::from_millis(5),
            ),
        )
            .into_response(),
        "missing" => (StatusCode::NOT_FOUND, "unknown stream").into_response(),
        _ => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            chunked(
                text(&["0123456789", "abc---STREAM_", "COMPLETE---"]),
                Duration::from_millis(5),
            ),
        )
            .into_response(),
    }
}
