//! Warden daemon
//!
//! Hosts the moderation engine. Without a chat platform connection the
//! daemon runs in dry-run mode: role changes are journaled in memory.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use warden_daemon::{Daemon, DaemonConfig, DaemonError, DaemonResult};
use warden_types::RoleId;

/// Warden daemon CLI arguments
#[derive(Parser, Debug)]
#[command(name = "wardend")]
#[command(author, version, about = "Warden moderation daemon")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<String>,

    /// Log level filter; overrides the configured level
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Use JSON logging
    #[arg(long)]
    log_json: bool,

    /// Marker role id; overrides restriction.marker_role_id
    #[arg(long, env = "WARDEN_MARKER_ROLE")]
    marker_role: Option<u64>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(marker) = cli.marker_role {
        config.restriction.marker_role = RoleId::new(marker);
    }

    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.log_json || config.logging.json,
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        marker_role = %config.restriction.marker_role,
        "Starting wardend (dry-run platform)"
    );

    let daemon = Daemon::start_dry_run(&config).await?;
    daemon.run_until(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(level: &str, json: bool) -> DaemonResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| DaemonError::Config(format!("failed to initialise tracing: {e}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
