//! keytocoin node entry point.

use anyhow::Context;
use clap::Parser;
use keyto_chain::Node;
use keyto_storage::Storage;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;
mod ws;

use config::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let node = Arc::new(open_node(&args)?);

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, routes::router(Arc::clone(&node)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    node.flush().context("failed to flush storage")?;
    info!("Shut down");
    Ok(())
}

fn open_node(args: &Args) -> anyhow::Result<Node> {
    let config = args.node_config();
    let node = match &args.data_dir {
        Some(dir) => {
            let storage = Storage::open(dir)
                .with_context(|| format!("failed to open database at {}", dir.display()))?;
            info!(path = %dir.display(), "Opened database");
            Node::open(storage, config)
        }
        None => {
            info!("No data directory given, running in memory");
            Node::in_memory(config)
        }
    };
    node.context("chain failed verification, refusing to start")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
}
