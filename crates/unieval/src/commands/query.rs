use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use libunieval_core::{ConnectorRef, QueryPattern, QuerySpec, RequestOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::Cli;
use crate::commands::{cancel_on_signal, open_backend};
use crate::config::EvaluatorConfig;
use crate::error::Result;
use crate::export::{append_csv, csv_row};
use crate::output::{output_json, print_human};
use crate::report::outcome_table;

pub struct QueryArgs {
    pub connector: String,
    pub dataset: String,
    pub pattern: QueryPattern,
    pub rows: Option<u64>,
    pub timeout: Option<u64>,
    pub output: Option<PathBuf>,
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    backend: &'a str,
    #[serde(flatten)]
    spec: &'a QuerySpec,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    bytes: u64,
    chunks: u64,
    ttfb_sec: Option<f64>,
    total_time_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata_latency_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transfer_latency_sec: Option<f64>,
    throughput_bytes_sec: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<&'a Path>,
}

impl<'a> QueryOutput<'a> {
    fn new(backend: &'a str, outcome: &'a RequestOutcome, output_file: Option<&'a Path>) -> Self {
        Self {
            backend,
            spec: outcome.spec(),
            success: outcome.is_success(),
            error_kind: outcome.error_kind().map(|k| k.as_code()),
            error: outcome.error(),
            bytes: outcome.total_bytes(),
            chunks: outcome.chunks(),
            ttfb_sec: outcome.ttfb().map(|t| t.as_secs_f64()),
            total_time_sec: outcome.total_time().as_secs_f64(),
            metadata_latency_sec: outcome.metadata_latency().map(|t| t.as_secs_f64()),
            transfer_latency_sec: outcome.transfer_latency().map(|t| t.as_secs_f64()),
            throughput_bytes_sec: outcome.throughput_bytes_per_sec(),
            output_file,
        }
    }
}

/// Payload written to disk as it arrives.
///
/// A write error stops further writes and is reported once the request is done.
struct PayloadFile {
    writer: BufWriter<File>,
    written: u64,
    error: Option<std::io::Error>,
}

impl PayloadFile {
    fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            written: 0,
            error: None,
        })
    }

    fn write(&mut self, chunk: &Bytes) {
        if self.error.is_some() {
            return;
        }
        match self.writer.write_all(chunk) {
            Ok(()) => self.written += chunk.len() as u64,
            Err(e) => self.error = Some(e),
        }
    }

    fn finish(mut self) -> Result<u64> {
        if let Some(e) = self.error.take() {
            return Err(e.into());
        }
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Execute one request. Exit code 0 on success, 3 when the request failed.
pub async fn run(cli: &Cli, config: &EvaluatorConfig, args: QueryArgs) -> Result<i32> {
    let adapter = open_backend(cli, config, args.timeout)?;
    let spec = QuerySpec::new(0, ConnectorRef::new(args.connector), args.dataset, args.pattern)
        .with_row_limit(args.rows);

    let mut payload_file = args.output.as_deref().map(PayloadFile::create).transpose()?;

    let cancel = CancellationToken::new();
    let watcher = cancel_on_signal(cancel.clone());
    let outcome = match payload_file.as_mut() {
        Some(file) => {
            adapter
                .execute_with(spec, &cancel, &mut |chunk: &Bytes| file.write(chunk))
                .await
        }
        None => adapter.execute(spec, &cancel).await,
    };
    watcher.abort();
    adapter.close().await;

    if let (Some(file), Some(path)) = (payload_file, args.output.as_deref()) {
        let written = file.finish()?;
        info!(path = %path.display(), bytes = written, "payload saved");
    }

    if let Some(path) = config.metrics.csv_file() {
        record(path, &cli.backend, &outcome)?;
    }

    print_human(cli, &outcome_table(&cli.backend, &outcome));
    output_json(cli, QueryOutput::new(&cli.backend, &outcome, args.output.as_deref()))?;

    Ok(if outcome.is_success() { 0 } else { 3 })
}

fn record(path: &Path, backend: &str, outcome: &RequestOutcome) -> Result<()> {
    append_csv(path, [csv_row(backend, outcome, Utc::now())])?;
    info!(path = %path.display(), "query appended to metrics file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_payload_file_writes_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");

        let mut file = PayloadFile::create(&path).unwrap();
        file.write(&Bytes::from_static(b"---"));
        file.write(&Bytes::from_static(b"abc"));
        assert_eq!(file.finish().unwrap(), 6);

        assert_eq!(std::fs::read(&path).unwrap(), b"---abc");
    }

    #[test]
    fn test_payload_file_in_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("payload.bin");
        assert!(PayloadFile::create(&path).is_err());
    }
}
