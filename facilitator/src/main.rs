// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NANDA Points Facilitator
//!
//! Entry point for the `nanda-facilitator` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger database, and serves
//! the x402 facilitator API alongside the wallet/invoice REST interface.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the facilitator service
//! - `init`    — initialize the data directory and ledger database
//! - `status`  — query a running facilitator's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;

use nanda_invoicing::InvoiceRegistry;
use nanda_points::facilitator::{Facilitator, SettlementWorker};
use nanda_points::ledger::LedgerEngine;
use nanda_points::store::PointsStore;
use nanda_points::wallet::WalletLimits;

use cli::{Commands, FacilitatorCli};
use logging::LogFormat;
use metrics::FacilitatorMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = FacilitatorCli::parse();

    match cli.command {
        Commands::Run(args) => run_facilitator(args).await,
        Commands::Init(args) => init_facilitator(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full facilitator: REST API, settlement worker, and
/// metrics endpoint.
async fn run_facilitator(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "nanda_facilitator=info,nanda_points=info,nanda_invoicing=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        network = %args.network,
        "starting nanda-facilitator"
    );

    // --- Persistent storage ---
    let db_path = expand_data_dir(&args.data_dir).join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create ledger directory: {}", db_path.display()))?;

    let store = Arc::new(
        PointsStore::open(&db_path)
            .with_context(|| format!("failed to open ledger at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), wallets = store.wallet_count(), "ledger opened");

    // --- Ledger engine & facilitator ---
    let engine = Arc::new(LedgerEngine::new(store));
    let facilitator = Arc::new(Facilitator::new(Arc::clone(&engine)));

    // --- Invoice registry ---
    let invoices = Arc::new(
        InvoiceRegistry::open(Arc::clone(&engine)).context("failed to open invoice registry")?,
    );

    // --- Metrics ---
    let facilitator_metrics = Arc::new(FacilitatorMetrics::new());
    facilitator_metrics
        .wallets_total
        .set(engine.store().wallet_count() as i64);

    // --- Deferred settlement worker ---
    let (settle_queue, settle_worker) = SettlementWorker::spawn(Arc::clone(&facilitator));
    facilitator_metrics
        .settlement_queue_free
        .set(settle_queue.capacity() as i64);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: args.network.clone(),
        facilitator,
        invoices,
        settle_queue,
        metrics: Arc::clone(&facilitator_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("facilitator API listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&facilitator_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    // The select arms dropped the router and with it the last queue
    // handle; the worker drains remaining jobs and exits.
    settle_worker.join().await;
    engine.store().flush().context("final ledger flush failed")?;
    tracing::info!("nanda-facilitator stopped");
    Ok(())
}

/// Initializes the facilitator data directory and ledger database, and
/// optionally creates a treasury wallet.
fn init_facilitator(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("nanda_facilitator=info", LogFormat::Pretty);

    let data_dir = expand_data_dir(&args.data_dir);
    tracing::info!(data_dir = %data_dir.display(), "initializing facilitator");

    let db_path = data_dir.join("ledger");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create ledger directory: {}", db_path.display()))?;

    let store = Arc::new(
        PointsStore::open(&db_path)
            .with_context(|| format!("failed to open ledger at {}", db_path.display()))?,
    );
    let engine = LedgerEngine::new(Arc::clone(&store));

    let treasury = match &args.treasury_did {
        Some(did) => {
            // The treasury may overdraft so it can serve as a mint
            // counterparty for operational flows.
            let limits = WalletLimits {
                daily_spend_cap: None,
                allow_overdraft: true,
            };
            let wallet = engine
                .register_wallet(did, did, limits)
                .with_context(|| format!("failed to create treasury wallet {}", did))?;
            Some(wallet.id)
        }
        None => None,
    };
    store.flush().context("ledger flush failed")?;

    println!("Facilitator initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Ledger path    : {}", db_path.display());
    println!("  Wallets        : {}", store.wallet_count());
    match treasury {
        Some(id) => println!("  Treasury       : {}", id),
        None => println!("  Treasury       : (none)"),
    }

    Ok(())
}

/// Queries a running facilitator's status endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = args.api_url.trim_end_matches('/');
    let (host, port, _) = split_url(url)?;
    let addr = format!("{}:{}", host, port);

    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;

    // Raw HTTP/1.1 GET keeps the binary free of an HTTP client
    // dependency for a single diagnostic call.
    let request = format!(
        "GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        host,
    );

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    // Everything after the first blank line is the body.
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string());
    println!("{}", body.trim());
    Ok(())
}

/// Splits an `http://host[:port][/path]` URL into (host, port, path).
fn split_url(url: &str) -> Result<(String, u16, String)> {
    let rest = url.strip_prefix("http://").unwrap_or(url);
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let port = p
                .parse::<u16>()
                .with_context(|| format!("bad port in URL: {}", p))?;
            (h.to_string(), port)
        }
        None => (authority.to_string(), 80),
    };
    if host.is_empty() {
        anyhow::bail!("missing host in URL: {}", url);
    }
    Ok((host, port, path.to_string()))
}

/// Expands a leading `~` in the data directory to the user's home.
fn expand_data_dir(dir: &Path) -> PathBuf {
    if let Ok(stripped) = dir.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    dir.to_path_buf()
}

/// Prints version information to stdout.
fn print_version() {
    println!("nanda-facilitator {}", env!("CARGO_PKG_VERSION"));
    println!(
        "scheme  {} ({})",
        nanda_points::config::PAYMENT_SCHEME,
        nanda_points::config::ASSET_CODE,
    );
    println!("network {}", nanda_points::config::PAYMENT_NETWORK);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
