//! Metrics aggregation over sealed request outcomes
//!
//! [`Summary::from_outcomes`] is a pure function of its inputs: it performs no
//! I/O and its result does not depend on the order of the outcomes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::types::RequestOutcome;

/// Wall-clock bounds of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl RunWindow {
    pub fn new(started_at: Instant, finished_at: Instant) -> Self {
        Self {
            started_at,
            finished_at,
        }
    }

    pub fn duration(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

/// Latency distribution of successful requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(with = "crate::serde_secs")]
    pub avg: Duration,
    #[serde(with = "crate::serde_secs")]
    pub min: Duration,
    #[serde(with = "crate::serde_secs")]
    pub max: Duration,
    #[serde(with = "crate::serde_secs")]
    pub p50: Duration,
    #[serde(with = "crate::serde_secs")]
    pub p95: Duration,
    #[serde(with = "crate::serde_secs")]
    pub p99: Duration,
}

impl LatencyStats {
    /// Compute stats over an ascending-sorted sample; `None` when empty
    pub fn from_sorted(sorted: &[Duration]) -> Option<Self> {
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        Some(Self {
            avg: mean(sorted)?,
            min,
            max,
            p50: nearest_rank(sorted, 50)?,
            p95: nearest_rank(sorted, 95)?,
            p99: nearest_rank(sorted, 99)?,
        })
    }
}

/// Aggregate statistics for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Requests the run was configured to issue
    pub configured_requests: usize,
    /// Completed requests (successful + failed); cancelled ones are excluded
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    /// Requests aborted by run cancellation
    pub cancelled: usize,
    /// True when the run did not complete every configured request
    pub partial: bool,
    #[serde(with = "crate::serde_secs")]
    pub duration: Duration,
    /// Successful requests per second
    pub throughput_rps: f64,
    pub total_bytes: u64,
    pub bytes_per_sec: f64,
    /// `None` when no request succeeded
    pub latency: Option<LatencyStats>,
    /// `None` when no request received a first byte
    #[serde(with = "crate::serde_secs::option")]
    pub avg_ttfb: Option<Duration>,
    /// Failed request counts keyed by error kind code
    pub failures_by_kind: BTreeMap<String, usize>,
}

impl Summary {
    pub fn from_outcomes(
        outcomes: &[RequestOutcome],
        window: RunWindow,
        configured_requests: usize,
    ) -> Self {
        let mut latencies = Vec::new();
        let mut ttfbs = Vec::new();
        let mut failures_by_kind = BTreeMap::new();
        let mut cancelled = 0;
        let mut failed = 0;
        let mut total_bytes = 0u64;

        for outcome in outcomes {
            if outcome.is_cancelled() {
                cancelled += 1;
                continue;
            }

            total_bytes += outcome.total_bytes();
            if let Some(ttfb) = outcome.ttfb() {
                ttfbs.push(ttfb);
            }

            match outcome.error_kind() {
                None => latencies.push(outcome.total_time()),
                Some(kind) => {
                    failed += 1;
                    *failures_by_kind.entry(kind.as_code().to_string()).or_insert(0) += 1;
                }
            }
        }

        latencies.sort_unstable();
        let successful = latencies.len();
        let total_requests = successful + failed;
        let duration = window.duration();

        Self {
            configured_requests,
            total_requests,
            successful,
            failed,
            cancelled,
            partial: cancelled > 0 || total_requests < configured_requests,
            duration,
            throughput_rps: per_second(successful as f64, duration),
            total_bytes,
            bytes_per_sec: per_second(total_bytes as f64, duration),
            latency: LatencyStats::from_sorted(&latencies),
            avg_ttfb: mean(&ttfbs),
            failures_by_kind,
        }
    }

    /// Percentage of completed requests that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Nearest-rank percentile over an ascending-sorted sample.
///
/// Index is `ceil(p * n / 100) - 1`, clamped to the sample. No interpolation.
pub fn nearest_rank(sorted: &[Duration], percentile: u32) -> Option<Duration> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (percentile as usize * n + 99) / 100;
    let index = rank.saturating_sub(1).min(n - 1);
    Some(sorted[index])
}

// Integer nanoseconds keep the mean independent of summation order.
fn mean(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(Duration::as_nanos).sum();
    let avg = total / samples.len() as u128;
    Some(Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX)))
}

fn per_second(value: f64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        value / secs
    } else {
        0.0
    }
}
