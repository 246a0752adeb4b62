//! foldersync CLI - periodic one-way folder synchronization.
//!
//! Mirrors a source folder onto a replica folder every INTERVAL seconds until
//! interrupted, recording every change to a log file and to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use foldersync_sync::{ActivityLog, SyncConfig, SyncLoop};

#[derive(Parser, Debug)]
#[command(name = "foldersync")]
#[command(about = "Synchronize two folders")]
#[command(version)]
struct Cli {
    /// Path to the source folder.
    source: PathBuf,

    /// Path to the replica folder.
    replica: PathBuf,

    /// Sync interval in seconds.
    interval: u64,

    /// Path to the log file.
    log_file: PathBuf,
}

impl Cli {
    fn into_config(self) -> SyncConfig {
        SyncConfig::new(self.source, self.replica, self.interval, self.log_file)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries the activity log echo.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = cli.into_config();
    config.validate().context("Invalid folder configuration")?;

    let activity = ActivityLog::open(&config.log_file).with_context(|| {
        format!("Failed to open log file {}", config.log_file.display())
    })?;
    info!("Logging activity to {}", activity.path().display());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel.clone()));

    let passes = SyncLoop::new(config, Arc::new(activity), cancel)
        .run()
        .await
        .context("Synchronization failed")?;

    info!("Completed {} passes", passes);
    Ok(())
}

/// Cancel `token` on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => log_signal_error(result),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                log_signal_error(tokio::signal::ctrl_c().await);
            }
        }
    }

    #[cfg(not(unix))]
    log_signal_error(tokio::signal::ctrl_c().await);

    token.cancel();
}

fn log_signal_error(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received interrupt"),
        Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
    }
}
