//! Debounced watcher for note changes in the vault.
//!
//! Uses notify-debouncer-mini so an editor's burst of writes during a save
//! arrives as a single event.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A note file was created, modified or removed.
///
/// Only used as a pass trigger; the pass itself rescans the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// Path relative to vault root, `/`-separated
    pub path: String,
}

pub struct FileWatcher {
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    /// Watch `vault_path` recursively, ignoring hidden paths and anything
    /// under the `excluded` vault-relative folders.
    pub fn new(vault_path: PathBuf, excluded: Vec<String>) -> Result<Self> {
        // FSEvents on macOS reports resolved paths (/private/var/...)
        let vault_path = vault_path.canonicalize().unwrap_or(vault_path);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let root = vault_path.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        let Some(path) = note_path(&event.path, &root, &excluded) else {
                            continue;
                        };
                        debug!("File event: {}", path);
                        if event_tx.send(FileEvent { path }).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("File watcher error: {}", e),
            },
        )?;

        debouncer
            .watcher()
            .watch(&vault_path, RecursiveMode::Recursive)?;

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Get the receiver for file events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }
}

/// Vault-relative path of a markdown note worth a pass, if `path` is one.
pub fn note_path(path: &Path, vault_path: &Path, excluded: &[String]) -> Option<String> {
    let relative = path.strip_prefix(vault_path).ok()?;
    let components: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;

    if components.iter().any(|c| c.starts_with('.')) {
        return None;
    }
    let relative = components.join("/");
    if !relative.ends_with(".md") {
        return None;
    }
    let is_excluded = excluded.iter().any(|folder| {
        let folder = folder.trim_matches('/');
        !folder.is_empty()
            && relative
                .strip_prefix(folder)
                .is_some_and(|rest| rest.starts_with('/'))
    });
    if is_excluded {
        return None;
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(path: &str) -> Option<String> {
        note_path(
            &Path::new("/vault").join(path),
            Path::new("/vault"),
            &["Templates".to_string()],
        )
    }

    #[test]
    fn only_visible_notes_outside_templates() {
        assert_eq!(check("deck/note.md").as_deref(), Some("deck/note.md"));
        assert_eq!(check("Templates Old/note.md").as_deref(), Some("Templates Old/note.md"));
        assert_eq!(check("Templates/Basic.md"), None);
        assert_eq!(check(".anki-sync/state.json"), None);
        assert_eq!(check(".obsidian/workspace.md"), None);
        assert_eq!(check("deck/.hidden.md"), None);
        assert_eq!(check("image.png"), None);
        assert_eq!(note_path(Path::new("/elsewhere/a.md"), Path::new("/vault"), &[]), None);
    }
}
