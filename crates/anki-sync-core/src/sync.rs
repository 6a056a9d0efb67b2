//! Synchronization driver: one pass over the vault.

use crate::anki::{AnkiClient, AnkiTransport};
use crate::error::SyncError;
use crate::format::Formatter;
use crate::fs::{FileSystem, walk_files};
use crate::note::{NoteId, NoteRecord, NoteTypeId, claimed_id};
use crate::notify::{Notice, Notifier};
use crate::settings::Settings;
use crate::state::note::{MediaIndex, NoteReconciler};
use crate::state::note_type::{NoteTypeDigest, TemplateReconciler};
use crate::state::{reconcile, reconcile_retaining};
use crate::store::SyncState;

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Counts of what a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Notes whose digest was dropped because their file disappeared
    pub forgotten: usize,
    pub failed: usize,
    /// Broken or duplicated note files
    pub skipped: usize,
}

/// Markdown candidates and the media index from one vault walk.
struct VaultScan {
    notes: Vec<String>,
    media: MediaIndex,
}

pub struct Synchronizer<F, T, N> {
    fs: F,
    client: AnkiClient<T>,
    notifier: N,
    vault_name: String,
    state: SyncState,
}

impl<F, T, N> Synchronizer<F, T, N>
where
    F: FileSystem,
    T: AnkiTransport,
    N: Notifier,
{
    pub fn new(
        fs: F,
        client: AnkiClient<T>,
        notifier: N,
        vault_name: impl Into<String>,
        state: SyncState,
    ) -> Self {
        Self {
            fs,
            client,
            notifier,
            vault_name: vault_name.into(),
            state,
        }
    }

    /// Create a synchronizer with the state stored in the vault.
    pub async fn load(
        fs: F,
        client: AnkiClient<T>,
        notifier: N,
        vault_name: impl Into<String>,
    ) -> Result<Self, SyncError> {
        let state = SyncState::load(&fs).await?;
        Ok(Self::new(fs, client, notifier, vault_name, state))
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.state.settings
    }

    /// Write the state file.
    pub async fn persist(&self) -> Result<(), SyncError> {
        self.state.save(&self.fs).await?;
        Ok(())
    }

    /// Run one synchronization pass and report the outcome to the notifier.
    ///
    /// State is persisted only when the pass completes.
    pub async fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        match self.pass().await {
            Ok(report) => {
                info!(
                    "Pass complete: {} created, {} updated, {} unchanged, {} forgotten, {} failed, {} skipped",
                    report.created,
                    report.updated,
                    report.unchanged,
                    report.forgotten,
                    report.failed,
                    report.skipped
                );
                self.notifier.notify(Notice::PassCompleted {
                    created: report.created,
                    updated: report.updated,
                    failed: report.failed,
                });
                Ok(report)
            }
            Err(err) => {
                warn!("Pass aborted: {}", err);
                self.notifier.notify(Notice::PassFailed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn pass(&mut self) -> Result<PassReport, SyncError> {
        let folder = self.template_folder().await?;

        let version = self.client.version().await?;
        debug!("AnkiConnect version {}", version);

        self.import_note_types(&folder).await?;
        let scan = self.scan(&folder).await?;

        let settings = self.state.settings.clone();
        let formatter = Formatter::new(self.vault_name.clone(), settings.clone());
        let strategy = NoteReconciler::new(
            &self.client,
            &self.fs,
            &formatter,
            &scan.media,
            settings.prune_remote,
        );

        let mut report = PassReport::default();
        let mut created = BTreeSet::new();
        let mut fresh: BTreeMap<NoteId, NoteRecord> = BTreeMap::new();
        // Identities of synchronized notes whose file is currently unreadable
        let mut claimed = BTreeSet::new();

        for path in &scan.notes {
            let raw = match String::from_utf8(self.fs.read(path).await?) {
                Ok(raw) => raw,
                Err(err) => {
                    debug!("Skipping {}: not UTF-8", path);
                    claimed.extend(claimed_id(&String::from_utf8_lossy(err.as_bytes())));
                    continue;
                }
            };

            let mut record =
                match NoteRecord::parse(path, &raw, &self.state.note_type_state, &settings) {
                    Ok(record) => record,
                    Err(rejection) => {
                        if let Some(id) = claimed_id(&raw) {
                            debug!("Keeping note {} while {} is rejected", id, path);
                            claimed.insert(id);
                        }
                        if !rejection.is_not_a_note() {
                            debug!("Skipping {}: {}", path, rejection);
                            report.skipped += 1;
                        }
                        continue;
                    }
                };

            if record.id.is_unset() {
                match strategy.create(&record).await {
                    Ok(id) => {
                        record.id = id;
                        let content =
                            record
                                .serialize(&settings)
                                .map_err(|source| SyncError::Serialize {
                                    path: path.clone(),
                                    source,
                                })?;
                        self.fs.write(path, content.as_bytes()).await?;
                        self.state.note_state.insert(id, record.fingerprint());
                        created.insert(id);
                        report.created += 1;
                    }
                    Err(err) if !err.is_fatal() => {
                        self.notifier.notify(Notice::NoteFailed {
                            path: path.clone(),
                            message: err.to_string(),
                        });
                        report.failed += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            match fresh.entry(record.id) {
                Entry::Occupied(first) => {
                    warn!(
                        "Note {} appears in both {} and {}; ignoring {}",
                        record.id,
                        first.get().path,
                        path,
                        path
                    );
                    report.skipped += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
            }
        }

        let outcome =
            reconcile_retaining(&mut self.state.note_state, &strategy, &fresh, &claimed).await?;
        report.updated = outcome.applied.len();
        report.forgotten = outcome.retired.len();
        report.unchanged = outcome.adopted.len()
            + outcome
                .unchanged
                .iter()
                .filter(|id| !created.contains(*id))
                .count();
        for (id, failures) in outcome.failed {
            let path = fresh.get(&id).map(|r| r.path.clone()).unwrap_or_default();
            self.notifier.notify(Notice::NoteFailed {
                path,
                message: failures.join("; "),
            });
            report.failed += 1;
        }

        self.state.save(&self.fs).await?;
        Ok(report)
    }

    /// Validate the configured template folder and make sure it exists.
    async fn template_folder(&self) -> Result<String, SyncError> {
        let configured = self.state.settings.template_folder.trim();
        let folder = configured.trim_end_matches('/');

        let reason = if folder.is_empty() {
            Some("no folder configured")
        } else if folder.starts_with('/') || folder.starts_with('\\') || folder.contains(':') {
            Some("must be relative to the vault")
        } else if folder.split('/').any(|part| part == "..") {
            Some("must stay inside the vault")
        } else if self.fs.exists(folder).await? && !self.fs.is_dir(folder).await? {
            Some("is not a directory")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SyncError::TemplatesMisconfigured {
                folder: configured.to_string(),
                reason,
            });
        }

        self.fs.mkdir(folder).await?;
        Ok(folder.to_string())
    }

    /// Fetch note types from Anki and bring the templates up to date.
    async fn import_note_types(&mut self, folder: &str) -> Result<(), SyncError> {
        let models = self.client.model_names_and_ids().await?;
        let names: Vec<String> = models.keys().cloned().collect();
        let field_names = self.client.model_field_names(&names).await?;

        let fresh: BTreeMap<NoteTypeId, NoteTypeDigest> = models
            .into_iter()
            .zip(field_names)
            .map(|((name, id), field_names)| (id, NoteTypeDigest { name, field_names }))
            .collect();

        let strategy = TemplateReconciler::new(&self.fs, folder, &self.state.settings);
        let outcome = reconcile(&mut self.state.note_type_state, &strategy, &fresh).await?;
        debug!(
            "Note types: {} written, {} unchanged, {} removed",
            outcome.applied.len() + outcome.adopted.len(),
            outcome.unchanged.len(),
            outcome.retired.len()
        );
        Ok(())
    }

    async fn scan(&self, template_folder: &str) -> Result<VaultScan, SyncError> {
        let files = walk_files(&self.fs, "", &[template_folder]).await?;
        let mut scan = VaultScan {
            notes: Vec::new(),
            media: MediaIndex::new(),
        };
        for path in files {
            if path.ends_with(".md") {
                scan.notes.push(path);
            } else {
                let file_name = path.rsplit('/').next().unwrap_or(&path).to_string();
                scan.media.entry(file_name).or_insert(path);
            }
        }
        debug!(
            "Scanned vault: {} markdown files, {} other files",
            scan.notes.len(),
            scan.media.len()
        );
        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::InMemoryAnki;
    use crate::fs::InMemoryFs;
    use crate::notify::CollectingNotifier;
    use std::sync::Arc;

    fn synchronizer(
        fs: InMemoryFs,
        template_folder: &str,
    ) -> Synchronizer<InMemoryFs, Arc<InMemoryAnki>, CollectingNotifier> {
        let anki = Arc::new(InMemoryAnki::new());
        let state = SyncState::new(Settings {
            template_folder: template_folder.to_string(),
            ..Settings::default()
        });
        Synchronizer::new(fs, AnkiClient::new(anki), CollectingNotifier::new(), "vault", state)
    }

    #[tokio::test]
    async fn rejects_unusable_template_folders() {
        for folder in ["", "/abs", "../outside", "a/../../b", "C:/x"] {
            let sync = synchronizer(InMemoryFs::new(), folder);
            assert!(
                matches!(
                    sync.template_folder().await,
                    Err(SyncError::TemplatesMisconfigured { .. })
                ),
                "{:?} should be rejected",
                folder
            );
        }

        let sync = synchronizer(InMemoryFs::with_files([("Templates", "a file")]), "Templates");
        assert!(sync.template_folder().await.is_err());
    }

    #[tokio::test]
    async fn creates_missing_template_folder() {
        let sync = synchronizer(InMemoryFs::new(), "Meta/Templates/");
        assert_eq!(sync.template_folder().await.unwrap(), "Meta/Templates");
        assert!(sync.fs.is_dir("Meta/Templates").await.unwrap());
    }

    #[tokio::test]
    async fn misconfiguration_aborts_before_contacting_anki() {
        let mut sync = synchronizer(InMemoryFs::new(), "");
        assert!(sync.run_pass().await.is_err());
        assert!(matches!(
            sync.notifier.notices().as_slice(),
            [Notice::PassFailed(_)]
        ));
    }
}
