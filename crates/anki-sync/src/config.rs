//! Command-line configuration.
//!
//! Every option can also come from the environment, so the daemon can run
//! under a service manager without arguments.

use anki_sync_core::Settings;
use anki_sync_core::anki::DEFAULT_URL;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "anki-sync")]
#[command(about = "Synchronize an Obsidian vault into Anki through AnkiConnect")]
pub struct Cli {
    /// Path to the vault directory (supports ~ for home directory)
    #[arg(short, long, env = "OBSIDIAN_VAULT_PATH")]
    pub vault: String,

    /// AnkiConnect endpoint
    #[arg(long, env = "ANKI_CONNECT_URL", default_value = DEFAULT_URL)]
    pub anki_url: String,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a single pass and exit (default)
    Sync,
    /// Keep running, synchronizing on a timer and on file changes
    Watch {
        /// Seconds between timed passes
        #[arg(long, default_value_t = 300)]
        interval: u64,

        /// Only run timed passes
        #[arg(long)]
        no_watch: bool,
    },
}

/// Overrides for the persisted settings.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsArgs {
    /// Render fields to HTML
    #[arg(long, value_name = "BOOL")]
    pub render: Option<bool>,

    /// Link the title field back to the note
    #[arg(long, value_name = "BOOL")]
    pub linkify: Option<bool>,

    /// Turn ==highlights== into cloze deletions
    #[arg(long, value_name = "BOOL")]
    pub highlight_as_cloze: Option<bool>,

    /// Heading level that separates fields
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
    pub heading_level: Option<u8>,

    /// Deck for notes at the vault root
    #[arg(long)]
    pub default_deck: Option<String>,

    /// Note type whose first field is read from the body
    #[arg(long)]
    pub cloze_note_type: Option<String>,

    /// Vault folder for note type templates
    #[arg(long)]
    pub template_folder: Option<String>,

    /// Delete notes from Anki when their file is removed
    #[arg(long, value_name = "BOOL")]
    pub prune_remote: Option<bool>,
}

impl SettingsArgs {
    /// Apply the overrides; returns whether anything changed.
    pub fn apply(&self, settings: &mut Settings) -> bool {
        let before = settings.clone();
        if let Some(render) = self.render {
            settings.render = render;
        }
        if let Some(linkify) = self.linkify {
            settings.linkify = linkify;
        }
        if let Some(highlight) = self.highlight_as_cloze {
            settings.highlight_as_cloze = highlight;
        }
        if let Some(level) = self.heading_level {
            settings.heading_level = level;
        }
        if let Some(deck) = &self.default_deck {
            settings.default_deck = deck.clone();
        }
        if let Some(name) = &self.cloze_note_type {
            settings.cloze_note_type = name.clone();
        }
        if let Some(folder) = &self.template_folder {
            settings.template_folder = folder.clone();
        }
        if let Some(prune) = self.prune_remote {
            settings.prune_remote = prune;
        }
        *settings != before
    }
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Obsidian vault root directory
    pub vault_path: PathBuf,
    /// Name of the vault (derived from vault_path), used in backlinks
    pub vault_name: String,
    pub anki_url: String,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let vault_path = expand_tilde(&cli.vault);
        if !vault_path.is_dir() {
            return Err(ConfigError::VaultNotFound(vault_path));
        }
        let vault_path = vault_path.canonicalize().unwrap_or(vault_path);

        let vault_name = vault_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vault")
            .to_string();

        Ok(Self {
            vault_path,
            vault_name,
            anki_url: cli.anki_url.clone(),
        })
    }
}

impl Command {
    /// Timer period for `watch`.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Command::Sync => None,
            Command::Watch { interval, .. } => Some(Duration::from_secs((*interval).max(1))),
        }
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("vault directory {0:?} does not exist")]
    VaultNotFound(PathBuf),
}
