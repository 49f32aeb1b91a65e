use libunieval_core::EvalError;

use crate::cli::Cli;
use crate::commands::open_backend;
use crate::config::EvaluatorConfig;
use crate::error::Result;
use crate::output::{output_json, print_human};
use crate::report::connectors_table;

pub async fn run(cli: &Cli, config: &EvaluatorConfig) -> Result<i32> {
    let adapter = open_backend(cli, config, None)?;
    let listed = adapter.list_connectors().await;
    adapter.close().await;
    let connectors = listed.map_err(EvalError::from)?;

    if connectors.is_empty() {
        print_human(cli, "No active connectors");
    } else {
        print_human(cli, &connectors_table(&connectors));
    }
    output_json(cli, &connectors)?;
    Ok(0)
}
