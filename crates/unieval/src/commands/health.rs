use libunieval_core::HealthResult;
use serde::Serialize;

use crate::cli::Cli;
use crate::commands::open_backend;
use crate::config::EvaluatorConfig;
use crate::error::Result;
use crate::output::{output_json, print_human};

#[derive(Serialize)]
struct HealthOutput<'a> {
    backend: &'a str,
    kind: &'a str,
    endpoint: &'a str,
    #[serde(flatten)]
    health: HealthResult,
}

/// Exit code 0 when the backend is reachable, 1 otherwise
pub async fn run(cli: &Cli, config: &EvaluatorConfig) -> Result<i32> {
    let backend = config.backend(&cli.backend)?;
    let adapter = open_backend(cli, config, None)?;

    let health = adapter.health().await;
    adapter.close().await;

    let latency_ms = health.latency.as_secs_f64() * 1000.0;
    if health.reachable {
        print_human(cli, &format!("{}: healthy ({:.1} ms)", cli.backend, latency_ms));
    } else {
        print_human(
            cli,
            &format!(
                "{}: unhealthy ({:.1} ms): {}",
                cli.backend,
                latency_ms,
                health.detail.as_deref().unwrap_or("unknown")
            ),
        );
    }

    let code = if health.reachable { 0 } else { 1 };
    output_json(
        cli,
        HealthOutput {
            backend: &cli.backend,
            kind: backend.kind(),
            endpoint: backend.endpoint(),
            health,
        },
    )?;
    Ok(code)
}
