use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libunieval_core::QueryPattern;

#[derive(Parser)]
#[command(
    name = "unieval",
    about = "Load generation and latency evaluation for data-transfer backends",
    version
)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "unieval.toml")]
    pub config: PathBuf,

    /// Backend to evaluate (a name under [backends] in the config)
    #[arg(short = 'b', long, global = true, default_value = "system1")]
    pub backend: String,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether the backend is reachable
    Health,

    /// List connectors registered with the backend
    List,

    /// Execute a single request and print its timings
    Query {
        /// Connector to query
        connector: String,

        /// Dataset name
        dataset: String,

        /// Query pattern: sync or stream
        #[arg(short = 'p', long, default_value = "sync")]
        pattern: QueryPattern,

        /// Row limit passed to the backend
        #[arg(short = 'r', long)]
        rows: Option<u64>,

        /// Request timeout in seconds (overrides the config)
        #[arg(long)]
        timeout: Option<u64>,

        /// Save the received payload to this file
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Run a load test and report latency statistics
    LoadTest(LoadTestArgs),
}

#[derive(Clone, clap::Args)]
pub struct LoadTestArgs {
    /// Total number of requests
    #[arg(short = 'n', long, default_value = "100")]
    pub requests: usize,

    /// Maximum requests in flight
    #[arg(short = 'c', long, default_value = "10")]
    pub concurrency: usize,

    /// Dataset name
    #[arg(short = 'd', long, default_value = "iris")]
    pub dataset: String,

    /// Comma-separated connector pool (defaults to the backend's active connectors)
    #[arg(long, value_delimiter = ',')]
    pub connectors: Vec<String>,

    /// Query pattern: sync or stream
    #[arg(short = 'p', long, default_value = "sync")]
    pub pattern: QueryPattern,

    /// Row limit passed to the backend
    #[arg(short = 'r', long)]
    pub rows: Option<u64>,

    /// Request timeout in seconds (overrides the config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Append per-request records to this CSV file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Write a JSON report to this file
    #[arg(short = 'j', long)]
    pub json_report: Option<PathBuf>,
}
