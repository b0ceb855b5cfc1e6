//! zoomdl-rs: incremental sync of cloud meeting recordings.
//!
//! Periodically lists every cloud recording since the newest one already
//! stored, downloads the allow-listed files in parallel byte ranges, fans each
//! one out to every configured destination (local disk, S3, SFTP) and records
//! it in a JSON ledger kept next to the recordings. Optionally deletes the
//! cloud copy once a meeting is fully stored.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod download;
mod ledger;
mod shutdown;
mod storage;
mod sync;
mod systemd;
#[cfg(test)]
mod testutil;
mod types;
mod zoom;

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fs4::fs_std::FileExt;
use tracing_subscriber::EnvFilter;

use auth::CredentialManager;
use cli::Command;
use config::{Config, StorageConfig};
use download::TransferClient;
use ledger::{Ledger, LEDGER_FILE_NAME};
use storage::Storage;
use sync::Syncer;
use systemd::SystemdNotifier;
use zoom::ZoomClient;

/// Take the single-instance lock in `state_directory`. The lock is held for
/// as long as the returned file is open.
async fn acquire_instance_lock(state_directory: &Path) -> anyhow::Result<File> {
    tokio::fs::create_dir_all(state_directory)
        .await
        .with_context(|| {
            format!(
                "Failed to create state directory: {}",
                state_directory.display()
            )
        })?;

    let lock_path = state_directory.join("zoomdl-rs.lock");
    tokio::task::spawn_blocking(move || {
        let file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another zoomdl-rs instance is running (lock: {})",
                lock_path.display()
            )
        })?;
        Ok::<File, anyhow::Error>(file)
    })
    .await?
}

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let storage = StorageConfig::from_args(args.storage)?.open().await?;
    let ledger = Ledger::load(&storage).await;

    println!("Ledger: {} on {}", LEDGER_FILE_NAME, storage.describe());
    println!();
    println!("Records: {}", ledger.len());
    if let Some(oldest) = ledger.oldest() {
        println!("Oldest recording: {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    match ledger.checkpoint() {
        Some(newest) => {
            println!("Newest recording: {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
            println!();
            println!("Next sweep lists recordings from {}", newest.format("%Y-%m-%d"));
        }
        None => {
            println!();
            println!("Next sweep lists recordings from January 1st of --start-year");
        }
    }

    Ok(())
}

async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_cli(args)?;
    tracing::debug!(?config, "Loaded configuration");

    let _lock = acquire_instance_lock(&config.state_directory).await?;
    let storage = config.storage.open().await?;
    tracing::info!(
        destinations = storage.backend_count(),
        storage = %storage.describe(),
        "Starting zoomdl-rs"
    );

    let http = zoom::build_http_client().context("Failed to build HTTP client")?;
    let credentials = Arc::new(CredentialManager::new(
        http.clone(),
        &config.auth_endpoint,
        config.credentials.clone(),
    ));
    let zoom = ZoomClient::new(
        http.clone(),
        config.api_endpoint.clone(),
        Arc::clone(&credentials),
        config.page_size,
    );
    let transfer = TransferClient::new(http, credentials);
    let syncer = Syncer::new(zoom, transfer, Arc::new(storage), config.sync_policy());

    let shutdown_token =
        shutdown::install_signal_handler().context("Failed to install signal handlers")?;
    let notifier = SystemdNotifier::new(config.notify_systemd);
    notifier.notify_ready();

    let mut last_error = None;
    loop {
        notifier.notify_watchdog();
        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            break;
        }

        let wait = match syncer.sweep(&shutdown_token).await.into_result() {
            Ok(stats) => {
                notifier.notify_status(&format!("Last sweep: {stats}"));
                last_error = None;
                config.interval
            }
            Err(e) => {
                tracing::error!(error = %e, "Sweep failed");
                notifier.notify_status(&format!(
                    "Last sweep: {} ({} errors)",
                    e.stats,
                    e.failures.len()
                ));
                last_error = Some(e);
                config.error_backoff
            }
        };

        if config.once || shutdown_token.is_cancelled() {
            break;
        }

        tracing::info!("Waiting {} seconds...", wait.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_token.cancelled() => {
                tracing::info!("Shutdown during wait, exiting...");
                break;
            }
        }
    }

    notifier.notify_stopping();
    match last_error {
        Some(e) if config.once => Err(e.into()),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Status(args) => run_status(args).await,
        Command::Sync(args) => run_sync(args).await,
    }
}
