//! # Reserve Treasury Node
//!
//! Entry point for the `reserve-node` binary. Parses CLI arguments, sets up
//! logging and metrics, opens the ledger store, and serves the API.
//!
//! - `run`: serve the ledger
//! - `init`: create the data directory and write `config.json`
//! - `status`: query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod config;
mod host;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use reserve_contracts::LedgerStore;
use reserve_protocol::config::{NETWORKS, PROTOCOL_VERSION, STORAGE_SCHEMA_VERSION};
use reserve_protocol::SystemClock;

use cli::{Commands, ReserveNodeCli};
use config::{NodeConfig, CONFIG_FILE};
use host::Host;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ReserveNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the ledger and serves the API and metrics until shutdown.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "reserve_node=info,reserve_contracts=info,tower_http=debug",
        args.log_format,
    );

    let config_path = args.data_dir.join(CONFIG_FILE);
    let config = NodeConfig::load(&config_path)
        .context("node is not initialized; run `reserve-node init` first")?;

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        network = %config.network,
        "starting reserve-node"
    );

    // --- Ledger store ---
    let db_path = args.data_dir.join("ledger");
    let store = LedgerStore::open(&db_path)
        .with_context(|| format!("failed to open ledger store at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), records = store.record_count(), "ledger store opened");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Host ---
    let host = Arc::new(
        Host::open(store, &config, Arc::new(SystemClock), Arc::clone(&node_metrics))
            .context("failed to open ledger")?,
    );

    let app_state = api::AppState {
        version: format!("{} (protocol {})", env!("CARGO_PKG_VERSION"), PROTOCOL_VERSION),
        network: config.network.clone(),
        host: Arc::clone(&host),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    host.flush().context("failed to flush ledger store")?;
    tracing::info!("reserve-node stopped");
    Ok(())
}

/// Creates the data directory and writes a fresh `config.json`.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("reserve_node=info", LogFormat::Pretty);

    if !NETWORKS.contains(&args.network.as_str()) {
        bail!("unknown network '{}' (expected one of {:?})", args.network, NETWORKS);
    }

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }

    let mut config = NodeConfig::new(&args.network, args.controller);
    if let Some(backed) = args.backed_token {
        config.backed_token = backed;
    }
    config.save(&config_path)?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", config.network);
    println!("  Controller     : {}", config.controller);
    println!("  Treasury       : {}", config.treasury_address);
    println!("  Backed token   : {}", config.backed_token);

    Ok(())
}

/// Queries a running node's `/status` endpoint and prints the body.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(&args.api_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.api_addr))?;

    let request = format!(
        "GET /status HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        args.api_addr
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);

    let (head, body) = response
        .split_once("\r\n\r\n")
        .unwrap_or((&*response, ""));
    if !head.starts_with("HTTP/1.1 200") {
        bail!("status request failed: {}", head.lines().next().unwrap_or(head));
    }
    println!("{body}");
    Ok(())
}

fn print_version() {
    println!("reserve-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", PROTOCOL_VERSION);
    println!("schema       {}", STORAGE_SCHEMA_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
