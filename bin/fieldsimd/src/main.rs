//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "binary"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Binary entrypoint for the fieldsim daemon."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fieldsim_common::config::AppConfig;
use fieldsim_common::logging::init_tracing;
use fieldsim_core::FieldDevice;
use fieldsim_io::{Subscriber, TcpSubscriber, TcpUpdater, Updater};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated field device daemon",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "FILE",
        env = "FIELDSIMD_CONFIG_FILE",
        help = "Configuration file to load"
    )]
    config_file: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        env = "FIELDSIMD_LOG_VERBOSITY",
        help = "Increase verbosity with 1 or 2; -1 disables logging"
    )]
    log_verbosity: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config_file {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/fieldsim.toml"));
    candidates.push(PathBuf::from("/etc/fieldsim/config.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;

    init_tracing("fieldsimd", &config.logging, cli.log_verbosity)?;
    info!(config_path = %loaded.source.display(), devices = config.field_devices.len(), "configuration loaded");

    let (shutdown_tx, _) = broadcast::channel(16);
    let mut handles = Vec::new();

    for device_config in &config.field_devices {
        let subscriber = device_config
            .input
            .as_ref()
            .map(|io| Box::new(TcpSubscriber::new(&io.endpoint)) as Box<dyn Subscriber>);

        let update_endpoint = device_config
            .output
            .as_ref()
            .map(|io| io.endpoint.clone())
            .unwrap_or_default();
        let updater = Arc::new(TcpUpdater::new(update_endpoint)) as Arc<dyn Updater>;

        let device = FieldDevice::from_config(device_config, subscriber, updater)
            .with_context(|| format!("building field device {}", device_config.name))?;
        handles.push(device.spawn(&shutdown_tx));
    }

    info!("daemon running; waiting for termination signal");
    shutdown_signal().await;
    info!("termination signal received; shutting down");

    let _ = shutdown_tx.send(());
    for handle in handles {
        handle.join().await;
    }

    info!("daemon shutdown complete");
    Ok(())
}

/// Resolve on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
