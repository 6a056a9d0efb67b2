//! Note digests and the note synchronization strategy.
//!
//! Deck, content and tags are checked and pushed independently. Each part
//! that reaches Anki is committed to the digest on its own; a part that
//! fails keeps its old digest value and is retried on the next pass.
//!
//! Operations that target a deck (`addNote`, `changeDeck`) create the deck
//! and retry exactly once when Anki reports it missing.

use super::{Applied, ChangeSet, Reconcile};
use crate::anki::{AnkiClient, AnkiError, AnkiTransport, NewNote, NoteOptions};
use crate::error::SyncError;
use crate::format::Formatter;
use crate::fs::FileSystem;
use crate::hash::ContentHash;
use crate::note::{NoteId, NoteRecord};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use tracing::{debug, info, warn};

/// Non-markdown vault files by file name, used to resolve media embeds.
pub type MediaIndex = BTreeMap<String, String>;

/// Stored form of a synchronized note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDigest {
    pub deck: String,
    pub hash: ContentHash,
    pub tags: Vec<String>,
}

/// Differences between a stored note digest and a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteChanges {
    /// Target deck when the note moved
    pub deck: Option<String>,
    pub content: bool,
    pub added_tags: Vec<String>,
    pub removed_tags: Vec<String>,
}

impl NoteChanges {
    pub fn tags_changed(&self) -> bool {
        !self.added_tags.is_empty() || !self.removed_tags.is_empty()
    }
}

impl ChangeSet for NoteChanges {
    fn is_empty(&self) -> bool {
        self.deck.is_none() && !self.content && !self.tags_changed()
    }
}

/// Pushes note records to Anki.
pub struct NoteReconciler<'a, F: ?Sized, T> {
    client: &'a AnkiClient<T>,
    fs: &'a F,
    formatter: &'a Formatter,
    media: &'a MediaIndex,
    prune_remote: bool,
}

impl<'a, F, T> NoteReconciler<'a, F, T>
where
    F: FileSystem + ?Sized,
    T: AnkiTransport,
{
    pub fn new(
        client: &'a AnkiClient<T>,
        fs: &'a F,
        formatter: &'a Formatter,
        media: &'a MediaIndex,
        prune_remote: bool,
    ) -> Self {
        Self {
            client,
            fs,
            formatter,
            media,
            prune_remote,
        }
    }

    /// Create the note in Anki and return its new identity.
    ///
    /// `SyncError::Anki` means this note failed; other errors abort the pass.
    pub async fn create(&self, record: &NoteRecord) -> Result<NoteId, SyncError> {
        let formatted = self.formatter.format(record);
        self.upload_media(&formatted.media).await?;

        let note = NewNote {
            deck_name: record.deck.clone(),
            model_name: record.type_name.clone(),
            fields: formatted.fields,
            tags: record.tags.clone(),
            options: NoteOptions::default(),
        };
        let id = self
            .with_deck(&record.deck, || self.client.add_note(&note))
            .await?;
        info!("Created note {} from {} in {}", id, record.path, record.deck);
        Ok(id)
    }

    /// Run a deck-targeting operation, creating the deck and retrying once if
    /// Anki reports it missing.
    async fn with_deck<R, Fut, Op>(&self, deck: &str, op: Op) -> Result<R, AnkiError>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<R, AnkiError>>,
    {
        match op().await {
            Err(err) if err.is_missing_deck() => {
                warn!("Deck {} does not exist, creating it ({})", deck, err);
                self.client.create_deck(deck).await?;
                op().await
            }
            result => result,
        }
    }

    async fn move_to_deck(&self, id: NoteId, deck: &str) -> Result<(), AnkiError> {
        let cards: Vec<i64> = self
            .client
            .notes_info(&[id])
            .await?
            .into_iter()
            .flat_map(|info| info.cards)
            .collect();
        if cards.is_empty() {
            return Err(AnkiError::Remote(format!("note {} was not found", id)));
        }
        self.with_deck(deck, || self.client.change_deck(&cards, deck))
            .await
    }

    async fn update_fields(&self, id: NoteId, record: &NoteRecord) -> Result<(), SyncError> {
        let formatted = self.formatter.format(record);
        self.upload_media(&formatted.media).await?;
        self.client
            .update_note_fields(id, &formatted.fields)
            .await?;
        Ok(())
    }

    async fn update_tags(&self, id: NoteId, changes: &NoteChanges) -> Result<(), AnkiError> {
        if !changes.added_tags.is_empty() {
            self.client.add_tags(&[id], &changes.added_tags).await?;
        }
        if !changes.removed_tags.is_empty() {
            self.client.remove_tags(&[id], &changes.removed_tags).await?;
        }
        Ok(())
    }

    async fn upload_media(&self, media: &[String]) -> Result<(), SyncError> {
        for file_name in media {
            let Some(path) = self.media.get(file_name) else {
                debug!("Embedded file {} not found in vault", file_name);
                continue;
            };
            let data = self.fs.read(path).await?;
            self.client.store_media_file(file_name, &data).await?;
            debug!("Uploaded media {}", path);
        }
        Ok(())
    }
}

/// Record a non-fatal failure for one part of a note; fatal errors propagate.
fn record_failure(
    failures: &mut Vec<String>,
    id: NoteId,
    action: &str,
    err: SyncError,
) -> Result<(), SyncError> {
    if err.is_fatal() {
        return Err(err);
    }
    warn!("Failed to {} for note {}: {}", action, id, err);
    failures.push(format!("failed to {}: {}", action, err));
    Ok(())
}

#[async_trait]
impl<'a, F, T> Reconcile for NoteReconciler<'a, F, T>
where
    F: FileSystem + ?Sized,
    T: AnkiTransport,
{
    type Key = NoteId;
    type Digest = NoteDigest;
    type Item = NoteRecord;
    type Changes = NoteChanges;

    fn fingerprint(&self, item: &NoteRecord) -> NoteDigest {
        item.fingerprint()
    }

    /// A note seen for the first time is recorded as-is.
    fn diff(&self, old: Option<&NoteDigest>, new: &NoteDigest) -> NoteChanges {
        let Some(old) = old else {
            return NoteChanges::default();
        };
        let old_tags: BTreeSet<&String> = old.tags.iter().collect();
        let new_tags: BTreeSet<&String> = new.tags.iter().collect();

        NoteChanges {
            deck: (old.deck != new.deck).then(|| new.deck.clone()),
            content: old.hash != new.hash,
            added_tags: new_tags.difference(&old_tags).map(|t| t.to_string()).collect(),
            removed_tags: old_tags.difference(&new_tags).map(|t| t.to_string()).collect(),
        }
    }

    async fn apply(
        &self,
        key: &NoteId,
        item: &NoteRecord,
        old: Option<&NoteDigest>,
        new: &NoteDigest,
        changes: NoteChanges,
    ) -> Result<Applied<NoteDigest>, SyncError> {
        let id = *key;
        let mut committed = old.cloned().unwrap_or_else(|| new.clone());
        let mut failures = Vec::new();

        if let Some(deck) = &changes.deck {
            match self.move_to_deck(id, deck).await {
                Ok(()) => {
                    info!("Moved note {} to {}", id, deck);
                    committed.deck = new.deck.clone();
                }
                Err(err) => record_failure(&mut failures, id, "change deck", err.into())?,
            }
        }

        if changes.content {
            match self.update_fields(id, item).await {
                Ok(()) => {
                    info!("Updated fields of note {} from {}", id, item.path);
                    committed.hash = new.hash.clone();
                }
                Err(err) => record_failure(&mut failures, id, "update fields", err)?,
            }
        }

        if changes.tags_changed() {
            match self.update_tags(id, &changes).await {
                Ok(()) => {
                    info!(
                        "Updated tags of note {} (+{:?} -{:?})",
                        id, changes.added_tags, changes.removed_tags
                    );
                    committed.tags = new.tags.clone();
                }
                Err(err) => record_failure(&mut failures, id, "update tags", err.into())?,
            }
        }

        Ok(Applied {
            committed,
            failures,
        })
    }

    async fn retire(&self, key: &NoteId, _old: &NoteDigest) -> Result<(), SyncError> {
        if !self.prune_remote {
            debug!("Note {} no longer in vault; leaving it in Anki", key);
            return Ok(());
        }
        match self.client.delete_notes(&[*key]).await {
            Ok(()) => {
                info!("Deleted note {} from Anki", key);
                Ok(())
            }
            Err(err) if err.is_transport() => Err(err.into()),
            Err(err) => {
                warn!("Failed to delete note {}: {}", key, err);
                Ok(())
            }
        }
    }
}
