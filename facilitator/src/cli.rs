//! # CLI Interface
//!
//! Defines the command-line argument structure for `nanda-facilitator`
//! using `clap` derive. Supports four subcommands: `run`, `init`,
//! `status`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NANDA Points payment facilitator.
///
/// Hosts the x402 verify/settle/supported protocol over the NP ledger,
/// serves the wallet/transaction/invoice REST API, and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "nanda-facilitator",
    about = "NANDA Points x402 payment facilitator",
    version,
    propagate_version = true
)]
pub struct FacilitatorCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the facilitator binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the facilitator service.
    Run(RunArgs),
    /// Initialize the data directory and ledger database.
    Init(InitArgs),
    /// Query the status of a running facilitator via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory holding the ledger database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "NP_DATA_DIR", default_value = "~/.nanda-points")]
    pub data_dir: PathBuf,

    /// Port for the facilitator REST API.
    #[arg(long, env = "NP_API_PORT", default_value_t = 9402)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "NP_METRICS_PORT", default_value_t = 9403)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "NP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Network label reported in /status and /supported responses.
    #[arg(long, env = "NP_NETWORK", default_value = "nanda-network")]
    pub network: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "NP_DATA_DIR", default_value = "~/.nanda-points")]
    pub data_dir: PathBuf,

    /// Optional treasury wallet to create during initialization. The
    /// treasury is allowed to overdraft so it can act as a mint source
    /// for operational flows.
    #[arg(long, env = "NP_TREASURY_DID")]
    pub treasury_did: Option<String>,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running facilitator.
    #[arg(long, default_value = "http://127.0.0.1:9402")]
    pub api_url: String,
}
