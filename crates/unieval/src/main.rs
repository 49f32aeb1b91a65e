//! unieval - load generation and latency evaluation for data-transfer backends

mod cli;
mod commands;
mod config;
mod error;
mod export;
mod logging;
mod output;
mod report;

use clap::Parser;

use cli::{Cli, Command};
use commands::query::QueryArgs;
use config::EvaluatorConfig;
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            output::output_error(&cli, &e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    let config = EvaluatorConfig::load(&cli.config)?;
    logging::init(cli.log_level.as_deref(), &config.logging);

    match &cli.command {
        Command::Health => commands::health::run(cli, &config).await,
        Command::List => commands::list::run(cli, &config).await,
        Command::Query {
            connector,
            dataset,
            pattern,
            rows,
            timeout,
            output,
        } => {
            let args = QueryArgs {
                connector: connector.clone(),
                dataset: dataset.clone(),
                pattern: *pattern,
                rows: *rows,
                timeout: *timeout,
                output: output.clone(),
            };
            commands::query::run(cli, &config, args).await
        }
        Command::LoadTest(args) => commands::load_test::run(cli, &config, args.clone()).await,
    }
}
