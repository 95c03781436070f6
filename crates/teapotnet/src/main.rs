//! Command-line entry point for a Teapotnet node.
//!
//! `teapotnet` parses its configuration file, loads or generates the
//! node's identity, starts the overlay listener and any configured
//! peers/trackers, and then runs until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use teapotnet_config::CoreConfig;
use teapotnet_core::CoreContext;
use teapotnet_error::HasKind;
use tracing_subscriber::EnvFilter;

/// Run a private peer-to-peer overlay node.
#[derive(Debug, Parser)]
#[command(name = "teapotnet", version, about)]
struct Cli {
    /// Port to bind the overlay listener to (0 picks an ephemeral port).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Disable the bound listener; only dial configured peers and trackers.
    #[arg(long)]
    nointerface: bool,
}

/// Exit code for a configuration error (spec.md §6).
const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for a listener bind failure (spec.md §6).
const EXIT_BIND_ERROR: u8 = 2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if cli.nointerface {
        config.network.nointerface = true;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(%err, "failed to start async runtime");
            return ExitCode::from(EXIT_BIND_ERROR);
        }
    };

    runtime.block_on(run(config))
}

fn load_config(path: Option<&std::path::Path>) -> teapotnet_config::Result<CoreConfig> {
    match path {
        Some(path) => teapotnet_config::load(path),
        None => Ok(CoreConfig::default()),
    }
}

async fn run(config: CoreConfig) -> ExitCode {
    let context = match CoreContext::bootstrap(config).await {
        Ok(context) => context,
        Err(err) => {
            let exit = match err.kind() {
                teapotnet_error::ErrorKind::NetworkUnreachable => EXIT_BIND_ERROR,
                _ => EXIT_CONFIG_ERROR,
            };
            tracing::error!(%err, "failed to bootstrap node");
            return ExitCode::from(exit);
        }
    };

    tracing::info!(self_id = %context.self_id(), "node running");

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "failed to wait for shutdown signal");
    }
    tracing::info!("shutting down");
    ExitCode::SUCCESS
}
