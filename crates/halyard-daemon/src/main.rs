//! Halyard Daemon - Declarative subsystem orchestrator
//!
//! Keeps the log storage, log collector, manager, and management cluster
//! connection subsystems converged on their configuration records.

use clap::Parser;
use halyard_daemon::{Daemon, DaemonConfig, DaemonError, DaemonResult};
use halyard_types::Provider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Halyard Daemon CLI
#[derive(Parser)]
#[command(name = "halyardd")]
#[command(about = "Halyard Daemon - Declarative subsystem orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HALYARD_CONFIG")]
    config: Option<String>,

    /// Kubernetes provider (eks, gke, aks, openshift, none)
    #[arg(short, long, env = "HALYARD_PROVIDER")]
    provider: Option<String>,

    /// JSON file of artifacts to seed the store with
    #[arg(long, env = "HALYARD_SEED")]
    seed: Option<String>,

    /// Log level
    #[arg(long, env = "HALYARD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "HALYARD_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(provider) = cli.provider {
        config.provider = provider
            .parse::<Provider>()
            .map_err(DaemonError::Config)?;
    }
    if let Some(seed) = cli.seed {
        config.store.seed_path = Some(seed);
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.provider,
        enabled = ?config.controllers.enabled,
        "Starting halyardd"
    );

    let daemon = Daemon::new(config).await?;
    daemon.run().await?;
    Ok(())
}
