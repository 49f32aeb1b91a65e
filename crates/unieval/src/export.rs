//! CSV and JSON export of run results

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use libunieval_core::{LatencyStats, RequestOutcome, RunReport, Summary};
use serde::Serialize;

use crate::error::Result;

pub const CSV_HEADER: &str = "timestamp,backend,connector_id,dataset,pattern,request_index,success,error_kind,bytes,chunks,ttfb_sec,total_time_sec,metadata_latency_sec,transfer_latency_sec,throughput_bytes_sec,error";

fn secs(d: Option<Duration>) -> String {
    d.map(|t| format!("{:.6}", t.as_secs_f64())).unwrap_or_default()
}

/// One CSV record for a sealed outcome completed at wall-clock time `at`
pub fn csv_row(backend: &str, outcome: &RequestOutcome, at: DateTime<Utc>) -> String {
    let spec = outcome.spec();
    let error_kind = outcome.error_kind().map(|k| k.as_code()).unwrap_or_default();

    [
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        csv_escape(backend),
        csv_escape(spec.connector.as_str()),
        csv_escape(&spec.dataset),
        spec.pattern.to_string(),
        spec.index.to_string(),
        outcome.is_success().to_string(),
        error_kind.to_string(),
        outcome.total_bytes().to_string(),
        outcome.chunks().to_string(),
        secs(outcome.ttfb()),
        format!("{:.6}", outcome.total_time().as_secs_f64()),
        secs(outcome.metadata_latency()),
        secs(outcome.transfer_latency()),
        format!("{:.2}", outcome.throughput_bytes_per_sec()),
        csv_escape(outcome.error().unwrap_or_default()),
    ]
    .join(",")
}

/// Quote a field when it contains a delimiter, quote or newline
fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append rows to `path`, writing the header first when the file is new or empty
pub fn append_csv<I>(path: &Path, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = String>,
{
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut buf = String::new();
    if is_new {
        buf.push_str(CSV_HEADER);
        buf.push('\n');
    }
    let mut written = 0;
    for row in rows {
        buf.push_str(&row);
        buf.push('\n');
        written += 1;
    }
    file.write_all(buf.as_bytes())?;
    Ok(written)
}

/// CSV rows for every outcome of a run. `run_started` is the wall-clock time
/// the run began; each row is stamped with its completion offset from it.
pub fn run_rows(report: &RunReport, run_started: DateTime<Utc>) -> Vec<String> {
    report
        .outcomes
        .iter()
        .map(|outcome| {
            let offset = outcome
                .completed_at()
                .saturating_duration_since(report.window.started_at);
            let offset = chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
            csv_row(&report.backend, outcome, run_started + offset)
        })
        .collect()
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub configured_requests: usize,
    pub total_requests: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub partial: bool,
    pub success_rate: f64,
    pub duration_sec: f64,
    pub requests_per_second: f64,
    pub failures_by_kind: std::collections::BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct LatencyMs {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl From<&LatencyStats> for LatencyMs {
    fn from(s: &LatencyStats) -> Self {
        Self {
            avg: ms(s.avg),
            min: ms(s.min),
            max: ms(s.max),
            p50: ms(s.p50),
            p95: ms(s.p95),
            p99: ms(s.p99),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DataVolume {
    pub total_bytes: u64,
    pub bytes_per_second: f64,
}

/// JSON run report
#[derive(Debug, Serialize)]
pub struct JsonReport {
    pub run_id: String,
    pub generated_at: String,
    pub backend: String,
    pub pattern: String,
    pub dataset: String,
    pub summary: ReportSummary,
    /// `null` when no request succeeded
    pub latency_ms: Option<LatencyMs>,
    pub avg_ttfb_ms: Option<f64>,
    pub data: DataVolume,
}

impl JsonReport {
    pub fn new(report: &RunReport, summary: &Summary, generated_at: DateTime<Utc>) -> Self {
        Self {
            run_id: report.run_id.to_string(),
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            backend: report.backend.clone(),
            pattern: report.pattern.to_string(),
            dataset: report.dataset.clone(),
            summary: ReportSummary {
                configured_requests: summary.configured_requests,
                total_requests: summary.total_requests,
                successful: summary.successful,
                failed: summary.failed,
                cancelled: summary.cancelled,
                partial: summary.partial,
                success_rate: summary.success_rate(),
                duration_sec: summary.duration.as_secs_f64(),
                requests_per_second: summary.throughput_rps,
                failures_by_kind: summary.failures_by_kind.clone(),
            },
            latency_ms: summary.latency.as_ref().map(LatencyMs::from),
            avg_ttfb_ms: summary.avg_ttfb.map(ms),
            data: DataVolume {
                total_bytes: summary.total_bytes,
                bytes_per_second: summary.bytes_per_sec,
            },
        }
    }
}

pub fn write_json_report(path: &Path, report: &JsonReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libunieval_core::{ConnectorRef, ErrorKind, OutcomeBuilder, QueryPattern, QuerySpec, RunWindow};
    use tempfile::TempDir;
    use tokio::time::Instant;
    use uuid::Uuid;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn spec(index: usize) -> QuerySpec {
        QuerySpec::new(index, ConnectorRef::new("aa:bb"), "iris", QueryPattern::Sync)
    }

    fn success(t0: Instant) -> RequestOutcome {
        let mut b = OutcomeBuilder::start_at(spec(0), t0);
        b.record_chunk_at(t0 + Duration::from_millis(20), 500);
        b.record_chunk_at(t0 + Duration::from_millis(40), 500);
        b.succeed_at(t0 + Duration::from_millis(100))
    }

    fn failure(t0: Instant) -> RequestOutcome {
        OutcomeBuilder::start_at(spec(1), t0).fail_at(
            t0 + Duration::from_millis(5),
            ErrorKind::RemoteError,
            "remote error [500]: boom, again",
        )
    }

    #[test]
    fn test_csv_row_success() {
        let row = csv_row("system1", &success(Instant::now()), at());
        assert_eq!(
            row,
            "2026-10-18T12:00:00.000Z,system1,aa:bb,iris,sync,0,true,,1000,2,0.020000,0.100000,,,10000.00,"
        );
        assert_eq!(row.split(',').count(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn test_csv_row_with_metadata_phase() {
        let t0 = Instant::now();
        let mut b = OutcomeBuilder::start_at(spec(0), t0);
        b.record_metadata_at(t0 + Duration::from_millis(12));
        b.record_chunk_at(t0 + Duration::from_millis(20), 100);
        let outcome = b.succeed_at(t0 + Duration::from_millis(50));

        let row = csv_row("system2", &outcome, at());
        assert!(row.contains(",0.020000,0.050000,0.012000,0.038000,2000.00,"));
    }

    #[test]
    fn test_csv_row_failure_has_empty_ttfb_and_quoted_error() {
        let row = csv_row("system1", &failure(Instant::now()), at());
        assert!(row.contains(",false,REMOTE_ERROR,0,0,,0.005000,"));
        assert!(row.ends_with(",\"remote error [500]: boom, again\""));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape(""), "");
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");

        append_csv(&path, vec!["r1".to_string()]).unwrap();
        append_csv(&path, vec!["r2".to_string(), "r3".to_string()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "r1", "r2", "r3"]);
    }

    fn report(outcomes: Vec<RequestOutcome>, t0: Instant) -> RunReport {
        RunReport {
            run_id: Uuid::nil(),
            backend: "system1".to_string(),
            pattern: QueryPattern::Sync,
            dataset: "iris".to_string(),
            configured_requests: outcomes.len(),
            outcomes,
            window: RunWindow::new(t0, t0 + Duration::from_secs(1)),
            cancelled: false,
        }
    }

    #[test]
    fn test_run_rows_stamped_by_completion() {
        let t0 = Instant::now();
        let report = report(vec![success(t0), failure(t0)], t0);
        let rows = run_rows(&report, at());
        assert!(rows[0].starts_with("2026-10-18T12:00:00.100Z,"));
        assert!(rows[1].starts_with("2026-10-18T12:00:00.005Z,"));
    }

    #[test]
    fn test_json_report_all_failed_has_null_latency() {
        let t0 = Instant::now();
        let report = report(vec![failure(t0)], t0);
        let summary = report.summary();
        let json = serde_json::to_value(JsonReport::new(&report, &summary, at())).unwrap();

        assert_eq!(json["latency_ms"], serde_json::Value::Null);
        assert_eq!(json["avg_ttfb_ms"], serde_json::Value::Null);
        assert_eq!(json["summary"]["failed"], 1);
        assert_eq!(json["summary"]["failures_by_kind"]["REMOTE_ERROR"], 1);
        assert_eq!(json["generated_at"], "2026-10-18T12:00:00Z");
    }

    #[test]
    fn test_json_report_latency_in_ms() {
        let t0 = Instant::now();
        let report = report(vec![success(t0)], t0);
        let summary = report.summary();
        let json = JsonReport::new(&report, &summary, at());

        let latency = json.latency_ms.unwrap();
        assert!((latency.p50 - 100.0).abs() < 1e-9);
        assert!((json.avg_ttfb_ms.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(json.data.total_bytes, 1000);
    }
}
