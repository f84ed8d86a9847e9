mod relay;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use procfleet_shared::defaults;
use session::SessionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Shared channel every fleet instance and operator connects to
#[derive(Parser, Debug)]
#[command(name = "hub", version)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "PROCFLEET_HUB", default_value = defaults::HUB_ADDRESS)]
    listen: String,

    /// Frames a client may fall behind by before it is disconnected
    #[arg(long, default_value_t = session::DEFAULT_QUEUE_DEPTH)]
    queue_depth: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("failed to listen on {}", cli.listen))?;
    info!("Hub listening on {}", listener.local_addr()?);

    let sessions = SessionManager::with_queue_depth(cli.queue_depth);
    relay::serve(listener, Arc::new(sessions)).await
}
