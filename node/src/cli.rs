//! # CLI Interface
//!
//! Command-line structure for `reserve-node`, built with `clap` derive.
//! Four subcommands: `run`, `init`, `status`, and `version`.

use clap::{Parser, Subcommand};
use reserve_protocol::config::{DEFAULT_API_PORT, DEFAULT_DATA_DIR, DEFAULT_METRICS_PORT};
use reserve_protocol::Address;
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Reserve treasury host.
///
/// Serves the permissioned treasury ledger and the timelocked vault pointer
/// over HTTP, persists every committed operation, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "reserve-node",
    about = "Reserve treasury host",
    version,
    propagate_version = true
)]
pub struct ReserveNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start serving the ledger.
    Run(RunArgs),
    /// Create the data directory and write `config.json`.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding `config.json` and the ledger store.
    #[arg(long, short = 'd', env = "RESERVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "RESERVE_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "RESERVE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format: pretty or json.
    #[arg(long, env = "RESERVE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "RESERVE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Network label; also seeds the derived treasury and token addresses.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Hex address of the initial controller.
    #[arg(long, env = "RESERVE_CONTROLLER")]
    pub controller: Address,

    /// Hex address of the backed token. Derived from the network when
    /// omitted.
    #[arg(long)]
    pub backed_token: Option<Address>,

    /// Overwrite an existing `config.json`.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// `host:port` of the running node's API.
    #[arg(long, env = "RESERVE_API_ADDR", default_value = "127.0.0.1:9840")]
    pub api_addr: String,
}
