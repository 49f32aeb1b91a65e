//! Per-request timing record
//!
//! A [`RequestOutcome`] can only be produced by sealing an [`OutcomeBuilder`].
//! The builder is owned by the worker executing the request and is consumed
//! on sealing, so an outcome is never mutated once it is visible to the
//! aggregator.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::query::QuerySpec;

/// Failure taxonomy for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Could not establish a connection
    ConnectionRefused,
    /// The per-request deadline elapsed
    Timeout,
    /// Malformed frames or an unexpected message sequence
    ProtocolError,
    /// The backend answered with an explicit error
    RemoteError,
    /// The run was cancelled while the request was in flight
    Cancelled,
}

impl ErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ProtocolError => "PROTOCOL_ERROR",
            ErrorKind::RemoteError => "REMOTE_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Arrival of one chunk of application payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEvent {
    pub at: Instant,
    pub bytes: u64,
    pub is_first: bool,
}

/// Sealed, immutable record of one executed request
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    spec: QuerySpec,
    started_at: Instant,
    metadata_at: Option<Instant>,
    first_byte_at: Option<Instant>,
    completed_at: Instant,
    total_bytes: u64,
    chunks: u64,
    error_kind: Option<ErrorKind>,
    error: Option<String>,
}

impl RequestOutcome {
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the metadata round trip finished, for protocols that have one
    pub fn metadata_at(&self) -> Option<Instant> {
        self.metadata_at
    }

    pub fn first_byte_at(&self) -> Option<Instant> {
        self.first_byte_at
    }

    pub fn completed_at(&self) -> Instant {
        self.completed_at
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of payload chunks (transfer events) received
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }

    /// Time to first payload byte, if any payload arrived
    pub fn ttfb(&self) -> Option<Duration> {
        self.first_byte_at.map(|t| t - self.started_at)
    }

    /// Time spent resolving transfer metadata (Flight `GetFlightInfo`)
    pub fn metadata_latency(&self) -> Option<Duration> {
        self.metadata_at.map(|t| t - self.started_at)
    }

    /// Time from metadata resolution to completion
    pub fn transfer_latency(&self) -> Option<Duration> {
        self.metadata_at.map(|t| self.completed_at - t)
    }

    /// End-to-end latency of the request
    pub fn total_time(&self) -> Duration {
        self.completed_at - self.started_at
    }

    /// Payload bytes per second over the whole request
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let secs = self.total_time().as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Mutable, worker-local accumulator for one in-flight request
#[derive(Debug)]
pub struct OutcomeBuilder {
    spec: QuerySpec,
    started_at: Instant,
    metadata_at: Option<Instant>,
    first_byte_at: Option<Instant>,
    last_event_at: Instant,
    total_bytes: u64,
    chunks: u64,
}

impl OutcomeBuilder {
    /// Start timing a request now
    pub fn start(spec: QuerySpec) -> Self {
        Self::start_at(spec, Instant::now())
    }

    pub fn start_at(spec: QuerySpec, started_at: Instant) -> Self {
        Self {
            spec,
            started_at,
            metadata_at: None,
            first_byte_at: None,
            last_event_at: started_at,
            total_bytes: 0,
            chunks: 0,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Mark the end of the metadata phase. Only the first mark counts.
    pub fn record_metadata_at(&mut self, at: Instant) {
        if self.metadata_at.is_some() || self.first_byte_at.is_some() {
            return;
        }
        let at = at.max(self.last_event_at);
        self.metadata_at = Some(at);
        self.last_event_at = at;
    }

    /// Record a payload chunk arriving now
    pub fn record_chunk(&mut self, bytes: u64) -> Option<TransferEvent> {
        self.record_chunk_at(Instant::now(), bytes)
    }

    /// Record a payload chunk; empty chunks are not payload and yield no event
    pub fn record_chunk_at(&mut self, at: Instant, bytes: u64) -> Option<TransferEvent> {
        if bytes == 0 {
            return None;
        }

        // Events are ordered; a clock reading earlier than the last one is clamped.
        let at = at.max(self.last_event_at);
        let is_first = self.first_byte_at.is_none();
        if is_first {
            self.first_byte_at = Some(at);
        }
        self.last_event_at = at;
        self.total_bytes += bytes;
        self.chunks += 1;

        Some(TransferEvent { at, bytes, is_first })
    }

    pub fn succeed(self) -> RequestOutcome {
        self.seal(Instant::now(), None)
    }

    pub fn succeed_at(self, at: Instant) -> RequestOutcome {
        self.seal(at, None)
    }

    pub fn fail(self, kind: ErrorKind, message: impl Into<String>) -> RequestOutcome {
        self.seal(Instant::now(), Some((kind, message.into())))
    }

    pub fn fail_at(self, at: Instant, kind: ErrorKind, message: impl Into<String>) -> RequestOutcome {
        self.seal(at, Some((kind, message.into())))
    }

    fn seal(self, at: Instant, failure: Option<(ErrorKind, String)>) -> RequestOutcome {
        let (error_kind, error) = match failure {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };

        RequestOutcome {
            spec: self.spec,
            started_at: self.started_at,
            metadata_at: self.metadata_at,
            first_byte_at: self.first_byte_at,
            completed_at: at.max(self.last_event_at),
            total_bytes: self.total_bytes,
            chunks: self.chunks,
            error_kind,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryPattern;

    fn spec() -> QuerySpec {
        QuerySpec::new(0, "c1".into(), "iris", QueryPattern::Sync)
    }

    #[test]
    fn test_first_event_fixes_ttfb() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0);

        let first = b.record_chunk_at(t0 + Duration::from_millis(20), 100).unwrap();
        let second = b.record_chunk_at(t0 + Duration::from_millis(50), 50).unwrap();
        assert!(first.is_first);
        assert!(!second.is_first);

        let outcome = b.succeed_at(t0 + Duration::from_millis(80));
        assert!(outcome.is_success());
        assert_eq!(outcome.ttfb(), Some(Duration::from_millis(20)));
        assert_eq!(outcome.total_time(), Duration::from_millis(80));
        assert_eq!(outcome.total_bytes(), 150);
        assert_eq!(outcome.chunks(), 2);
    }

    #[test]
    fn test_empty_chunk_is_not_payload() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0);
        assert!(b.record_chunk_at(t0 + Duration::from_millis(1), 0).is_none());

        let event = b.record_chunk_at(t0 + Duration::from_millis(5), 8).unwrap();
        assert!(event.is_first);

        let outcome = b.succeed_at(t0 + Duration::from_millis(6));
        assert_eq!(outcome.ttfb(), Some(Duration::from_millis(5)));
    }

    #[test]
    fn test_failure_keeps_partial_bytes() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0);
        b.record_chunk_at(t0 + Duration::from_millis(10), 64);

        let outcome = b.fail_at(t0 + Duration::from_millis(30), ErrorKind::ProtocolError, "bad frame");
        assert!(!outcome.is_success());
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ProtocolError));
        assert_eq!(outcome.error(), Some("bad frame"));
        assert_eq!(outcome.total_bytes(), 64);
        assert_eq!(outcome.ttfb(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_timestamps_ordered_even_with_skewed_readings() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0 + Duration::from_millis(10));
        b.record_chunk_at(t0, 1);
        let outcome = b.succeed_at(t0);

        let first = outcome.first_byte_at().unwrap();
        assert!(outcome.started_at() <= first);
        assert!(first <= outcome.completed_at());
    }

    #[test]
    fn test_no_payload_has_no_ttfb() {
        let t0 = Instant::now();
        let b = OutcomeBuilder::start_at(spec(), t0);
        let outcome = b.fail_at(t0 + Duration::from_secs(5), ErrorKind::Timeout, "timed out");
        assert_eq!(outcome.ttfb(), None);
        assert_eq!(outcome.total_bytes(), 0);
        assert_eq!(outcome.throughput_bytes_per_sec(), 0.0);
    }

    #[test]
    fn test_metadata_phase() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0);
        b.record_metadata_at(t0 + Duration::from_millis(15));
        b.record_metadata_at(t0 + Duration::from_millis(25));
        b.record_chunk_at(t0 + Duration::from_millis(30), 10);

        let outcome = b.succeed_at(t0 + Duration::from_millis(100));
        assert_eq!(outcome.metadata_latency(), Some(Duration::from_millis(15)));
        assert_eq!(outcome.transfer_latency(), Some(Duration::from_millis(85)));
        assert!(outcome.metadata_at().unwrap() <= outcome.first_byte_at().unwrap());
    }

    #[test]
    fn test_no_metadata_phase() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(), t0);
        b.record_chunk_at(t0 + Duration::from_millis(5), 10);
        b.record_metadata_at(t0 + Duration::from_millis(6));

        let outcome = b.succeed_at(t0 + Duration::from_millis(10));
        assert_eq!(outcome.metadata_latency(), None);
        assert_eq!(outcome.transfer_latency(), None);
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::ConnectionRefused.to_string(), "CONNECTION_REFUSED");
        assert_eq!(
            serde_json::to_string(&ErrorKind::ProtocolError).unwrap(),
            "\"PROTOCOL_ERROR\""
        );
    }
}
