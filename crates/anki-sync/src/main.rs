//! anki-sync: keeps Anki in step with the notes of an Obsidian vault.
//!
//! Talks to a running Anki through the AnkiConnect add-on. `sync` runs one
//! pass; `watch` keeps running and re-synchronizes on a timer and whenever a
//! note changes.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use anki_sync::{Cli, Command, Config, FileWatcher, HttpTransport, LogNotifier, NativeFs, Scheduler};
use anki_sync_core::{AnkiClient, Synchronizer};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if cli.verbose {
        "debug,anki_sync=debug,anki_sync_core=debug"
    } else {
        "info,anki_sync=info,anki_sync_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_cli(&cli)?;
    info!("Vault: {:?} ({})", config.vault_path, config.vault_name);
    info!("AnkiConnect: {}", config.anki_url);

    let transport = HttpTransport::new(config.anki_url.clone())?;
    let mut sync = Synchronizer::load(
        NativeFs::new(config.vault_path.clone()),
        AnkiClient::new(transport),
        LogNotifier,
        config.vault_name.clone(),
    )
    .await
    .context("failed to load synchronizer state")?;

    if cli.settings.apply(sync.settings_mut()) {
        info!("Settings updated from command line");
    }

    let command = cli.command.clone().unwrap_or(Command::Sync);
    match command {
        Command::Sync => {
            sync.run_pass().await?;
        }
        Command::Watch { no_watch, .. } => {
            let mut watcher = if no_watch {
                None
            } else {
                let excluded = vec![sync.settings().template_folder.clone()];
                match FileWatcher::new(config.vault_path.clone(), excluded) {
                    Ok(watcher) => {
                        info!("File watcher started");
                        Some(watcher)
                    }
                    Err(e) => {
                        warn!("File watcher unavailable, using the timer only: {}", e);
                        None
                    }
                }
            };

            let mut scheduler = Scheduler::new(sync, command.interval());
            info!("Running. Press Ctrl+C to stop.");
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let passes = scheduler
                .run(watcher.as_mut().map(FileWatcher::event_rx), shutdown)
                .await?;
            info!("Shutting down after {} passes", passes);
        }
    }

    Ok(())
}
