// src/main.rs
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use quiniela::server::{Server, ServerConfig};
use quiniela::store::Store;

#[derive(Parser, Debug)]
#[command(name = "quiniela", version, about = "Lottery bet intake server")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:12345")]
    bind: SocketAddr,
    /// Listen backlog.
    #[arg(long, default_value_t = 128)]
    backlog: u32,
    /// Number of agency connections to wait for before running the draw.
    #[arg(long, default_value_t = 5)]
    agencies: usize,
    /// Bet store file (CSV, appended to if it exists).
    #[arg(long, default_value = "bets.csv")]
    store: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();
    let store = Arc::new(Store::open(&cli.store).await?);
    let server = Server::new(
        ServerConfig {
            bind: cli.bind,
            backlog: cli.backlog,
            agencies: cli.agencies,
        },
        store,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run(shutdown_rx).await
}
