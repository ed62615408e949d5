//! chatrelay Server
//!
//! Serves the browser client from a static directory, relays chat frames
//! between WebSocket clients, and appends every message to a log file.

mod config;

use anyhow::{Context, Result};
use chatrelay_router::{FileLogSink, RelayServer, Router};
use clap::Parser;
use config::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "chatrelay WebSocket chat server")]
#[command(version)]
struct Cli {
    /// Directory holding index.html and index.js
    dir: PathBuf,

    /// File every chat message is appended to
    log_file: PathBuf,

    /// Listen address [default: 0.0.0.0:8080]
    #[arg(short, long)]
    listen: Option<String>,

    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    }
    .with_listen(cli.listen);

    let listen = settings.listen_addr()?;
    let router_config = settings.router_config()?;

    tracing::info!("Starting chatrelay");
    tracing::info!("Static files: {}", cli.dir.display());

    let sink = FileLogSink::open(&cli.log_file)
        .await
        .with_context(|| format!("opening message log {}", cli.log_file.display()))?;

    let (router, _router_task) = Router::new(sink).spawn(&router_config);

    let server = RelayServer::bind(listen, router, cli.dir)
        .await
        .with_context(|| format!("binding {}", listen))?;

    tracing::info!("Router ready, accepting connections...");
    server.serve().await?;

    Ok(())
}
