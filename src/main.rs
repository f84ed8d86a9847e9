mod command;
mod config;
mod connection;
mod files;
mod identity;
mod response;
mod shell;
mod supervisor;
mod transport;

use anyhow::Result;
use clap::Parser;
use command::{CommandExecutor, CommandResult, Services};
use connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, HubReplySink};
use files::{FileGateway, LocalStorage};
use identity::DeviceIdentity;
use shell::ShellExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supervisor::{CommandProvider, Supervisor};

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How long queued replies get to reach the hub on exit
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(
    name = "procfleet",
    version,
    about = "Process manager instance driven from a shared chat channel"
)]
struct Cli {
    /// Config file (defaults to ./procfleet.toml when present)
    #[arg(short, long, env = "PROCFLEET_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let config = config::discover_and_load(cli.config.as_deref())?;
    let identity = DeviceIdentity::load(&config.identity_file)?;

    info!("Instance starting: {}", identity);
    info!("  Hub: {}", config.hub.address);
    info!("  File root: {}", config.files.root.display());

    let services = Services {
        supervisor: Arc::new(Supervisor::new()),
        provider: Arc::new(CommandProvider::new(&config.workload)),
        files: FileGateway::new(
            Arc::new(LocalStorage::new(config.files.root.clone())),
            config.files.reserved.clone(),
        ),
        shell: ShellExecutor::new(config.shell.working_dir.clone()),
    };
    let executor = CommandExecutor::new(identity.clone(), config.command_prefix.clone(), services);

    let mut conn = ConnectionManager::new(ConnectionConfig::new(&identity, &config.hub));
    let sink = HubReplySink::new(conn.get_sender());
    let mut boot_pending = config.start_on_boot;

    // Main event loop
    loop {
        tokio::select! {
            event = conn.recv() => match event {
                Some(ConnectionEvent::Connected { transport }) => {
                    info!("Connected to hub via {}", transport);
                    if std::mem::take(&mut boot_pending) {
                        start_on_boot(&executor);
                    }
                }
                Some(ConnectionEvent::Disconnected { reason }) => {
                    warn!("Disconnected: {}", reason);
                }
                Some(ConnectionEvent::ConnectionFailed { reason }) => {
                    error!("Connection failed: {}", reason);
                }
                Some(ConnectionEvent::Received(message)) => {
                    if executor.handle_message(&message, &sink).await == CommandResult::Shutdown {
                        info!("System off requested over the channel");
                        break;
                    }
                }
                None => {
                    error!("Connection manager closed");
                    break;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    match executor.services().supervisor.stop() {
        Ok(outcome) => info!(?outcome, "workload stopped"),
        Err(e) => error!("Failed to stop workload on exit: {}", e),
    }

    drop(sink);
    if tokio::time::timeout(FLUSH_TIMEOUT, conn.finish()).await.is_err() {
        warn!("Hub session did not close within {:?}", FLUSH_TIMEOUT);
    }

    info!("Instance switched off: {}", executor.identity());
    Ok(())
}

fn start_on_boot(executor: &CommandExecutor) {
    let services = executor.services();
    match services.supervisor.start(services.provider.as_ref(), false) {
        Ok(outcome) => info!(?outcome, "workload started on boot"),
        Err(e) => error!("Start on boot failed: {}", e),
    }
}
