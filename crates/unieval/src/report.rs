//! Console tables

use std::time::Duration;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Table};
use libunieval_core::{ConnectorInfo, RequestOutcome, RunReport, Summary};

const UNDEFINED: &str = "n/a";

fn table(header: [&str; 2]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.to_vec());
    table
}

fn fmt_ms(d: Option<Duration>) -> String {
    d.map(|d| format!("{:.2}", d.as_secs_f64() * 1000.0))
        .unwrap_or_else(|| UNDEFINED.to_string())
}

fn fmt_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

pub fn summary_table(report: &RunReport, summary: &Summary) -> String {
    let mut t = table(["Metric", "Value"]);
    t.add_row(vec!["Backend".to_string(), report.backend.clone()]);
    t.add_row(vec!["Pattern".to_string(), report.pattern.to_string()]);
    t.add_row(vec!["Dataset".to_string(), report.dataset.clone()]);
    t.add_row(vec!["Duration".to_string(), format!("{:.2} s", summary.duration.as_secs_f64())]);
    t.add_row(vec![
        "Total Requests".to_string(),
        format!("{} of {}", summary.total_requests, summary.configured_requests),
    ]);
    t.add_row(vec![
        "Successful".to_string(),
        format!("{} ({:.1}%)", summary.successful, summary.success_rate()),
    ]);
    t.add_row(vec!["Failed".to_string(), summary.failed.to_string()]);
    if summary.cancelled > 0 {
        t.add_row(vec!["Cancelled".to_string(), summary.cancelled.to_string()]);
    }
    for (kind, count) in &summary.failures_by_kind {
        t.add_row(vec![format!("  {}", kind), count.to_string()]);
    }
    t.add_row(vec!["Throughput".to_string(), format!("{:.2} req/s", summary.throughput_rps)]);
    t.add_row(vec!["Data Transferred".to_string(), fmt_mb(summary.total_bytes)]);
    if summary.partial {
        t.add_row(vec![Cell::new("Status"), Cell::new("partial (run cancelled)")]);
    }
    t.to_string()
}

pub fn latency_table(summary: &Summary) -> String {
    let latency = summary.latency.as_ref();
    let mut t = table(["Latency (ms)", "Time"]);
    t.add_row(vec!["Average".to_string(), fmt_ms(latency.map(|l| l.avg))]);
    t.add_row(vec!["Min".to_string(), fmt_ms(latency.map(|l| l.min))]);
    t.add_row(vec!["Max".to_string(), fmt_ms(latency.map(|l| l.max))]);
    t.add_row(vec!["P50".to_string(), fmt_ms(latency.map(|l| l.p50))]);
    t.add_row(vec!["P95".to_string(), fmt_ms(latency.map(|l| l.p95))]);
    t.add_row(vec!["P99".to_string(), fmt_ms(latency.map(|l| l.p99))]);
    t.add_row(vec!["Avg TTFB".to_string(), fmt_ms(summary.avg_ttfb)]);
    t.to_string()
}

pub fn connectors_table(connectors: &[ConnectorInfo]) -> String {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Connector", "Status", "Connected At", "Last Ping"]);
    for c in connectors {
        t.add_row(vec![
            c.id.to_string(),
            c.status.clone(),
            c.connected_at.clone().unwrap_or_else(|| "-".to_string()),
            c.last_ping.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    t.to_string()
}

pub fn outcome_table(backend: &str, outcome: &RequestOutcome) -> String {
    let spec = outcome.spec();
    let mut t = table(["Field", "Value"]);
    t.add_row(vec!["Backend".to_string(), backend.to_string()]);
    t.add_row(vec!["Connector".to_string(), spec.connector.to_string()]);
    t.add_row(vec!["Dataset".to_string(), spec.dataset.clone()]);
    t.add_row(vec!["Pattern".to_string(), spec.pattern.to_string()]);
    match outcome.error_kind() {
        None => {
            t.add_row(vec!["Status".to_string(), "success".to_string()]);
            t.add_row(vec!["Bytes".to_string(), outcome.total_bytes().to_string()]);
            t.add_row(vec!["Chunks".to_string(), outcome.chunks().to_string()]);
        }
        Some(kind) => {
            t.add_row(vec!["Status".to_string(), kind.to_string()]);
            t.add_row(vec!["Error".to_string(), outcome.error().unwrap_or_default().to_string()]);
        }
    }
    t.add_row(vec!["TTFB (ms)".to_string(), fmt_ms(outcome.ttfb())]);
    if outcome.metadata_at().is_some() {
        t.add_row(vec!["Metadata (ms)".to_string(), fmt_ms(outcome.metadata_latency())]);
        t.add_row(vec!["Transfer (ms)".to_string(), fmt_ms(outcome.transfer_latency())]);
    }
    t.add_row(vec!["Total Time (ms)".to_string(), fmt_ms(Some(outcome.total_time()))]);
    t.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use libunieval_core::{ConnectorRef, ErrorKind, OutcomeBuilder, QueryPattern, QuerySpec, RunWindow};
    use tokio::time::Instant;

    #[test]
    fn test_undefined_latency_shown_as_na() {
        let t0 = Instant::now();
        let spec = QuerySpec::new(0, ConnectorRef::new("aa"), "iris", QueryPattern::Sync);
        let failed = OutcomeBuilder::start_at(spec, t0).fail_at(
            t0 + Duration::from_millis(3),
            ErrorKind::ConnectionRefused,
            "refused",
        );
        let summary = Summary::from_outcomes(
            &[failed],
            RunWindow::new(t0, t0 + Duration::from_secs(1)),
            1,
        );

        let text = latency_table(&summary);
        assert!(text.contains("P95"));
        assert!(text.contains(UNDEFINED));
        assert!(!text.contains("0.00"));
    }

    #[test]
    fn test_outcome_table_shows_metadata_phase() {
        let t0 = Instant::now();
        let spec = QuerySpec::new(0, ConnectorRef::new("tenant-a"), "sales", QueryPattern::Stream);

        let mut b = OutcomeBuilder::start_at(spec.clone(), t0);
        b.record_metadata_at(t0 + Duration::from_millis(4));
        b.record_chunk_at(t0 + Duration::from_millis(10), 64);
        let text = outcome_table("system2", &b.succeed_at(t0 + Duration::from_millis(30)));
        assert!(text.contains("Metadata (ms)"));
        assert!(text.contains("26.00"));

        let mut b = OutcomeBuilder::start_at(spec, t0);
        b.record_chunk_at(t0 + Duration::from_millis(10), 64);
        let text = outcome_table("system1", &b.succeed_at(t0 + Duration::from_millis(30)));
        assert!(!text.contains("Metadata"));
    }

    #[test]
    fn test_fmt_helpers() {
        assert_eq!(fmt_ms(Some(Duration::from_micros(1500))), "1.50");
        assert_eq!(fmt_ms(None), "n/a");
        assert_eq!(fmt_mb(3 * 1024 * 1024), "3.00 MB");
    }
}
