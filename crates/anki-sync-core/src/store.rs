//! Persistent synchronizer state.
//!
//! Stored as `.anki-sync/state.json` inside the vault:
//!
//! ```json
//! { "version": "1", "settings": {...}, "noteState": {"<id>": {...}}, "noteTypeState": {"<id>": {...}} }
//! ```

use crate::fs::{FileSystem, FsError};
use crate::note::{NoteId, NoteTypeId};
use crate::settings::Settings;
use crate::state::DigestMap;
use crate::state::note::NoteDigest;
use crate::state::note_type::NoteTypeDigest;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const STATE_DIR: &str = ".anki-sync";
pub const STATE_PATH: &str = ".anki-sync/state.json";
const STATE_TMP_PATH: &str = ".anki-sync/state.json.tmp";

/// Digest format version; stored digests from other versions are discarded.
pub const FORMAT_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("malformed state file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub version: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub note_state: DigestMap<NoteId, NoteDigest>,
    #[serde(default)]
    pub note_type_state: DigestMap<NoteTypeId, NoteTypeDigest>,
}

/// Just enough of the file to decide whether the digests are usable.
#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    settings: Settings,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SyncState {
    pub fn new(settings: Settings) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            settings,
            note_state: DigestMap::new(),
            note_type_state: DigestMap::new(),
        }
    }

    /// Load the state file, or start fresh when there is none.
    pub async fn load<F: FileSystem + ?Sized>(fs: &F) -> Result<Self, StoreError> {
        if !fs.exists(STATE_PATH).await? {
            debug!("No state file, starting fresh");
            return Ok(Self::default());
        }

        let contents = fs.read_to_string(STATE_PATH).await?;
        let header: Header = serde_json::from_str(&contents)?;
        if header.version.as_deref() != Some(FORMAT_VERSION) {
            warn!(
                "State file version {:?} does not match {}, discarding digests",
                header.version, FORMAT_VERSION
            );
            return Ok(Self::new(header.settings));
        }

        let state: SyncState = serde_json::from_str(&contents)?;
        debug!(
            "Loaded state: {} notes, {} note types",
            state.note_state.len(),
            state.note_type_state.len()
        );
        Ok(state)
    }

    /// Write the state file atomically: a temp file renamed over the old one.
    pub async fn save<F: FileSystem + ?Sized>(&self, fs: &F) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(self)?;
        fs.mkdir(STATE_DIR).await?;
        fs.write(STATE_TMP_PATH, &contents).await?;
        fs.rename(STATE_TMP_PATH, STATE_PATH).await?;
        debug!("Saved state: {} notes", self.note_state.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::fs::InMemoryFs;

    fn sample() -> SyncState {
        let mut state = SyncState::new(Settings {
            render: true,
            ..Settings::default()
        });
        state.note_state.insert(
            NoteId(555),
            NoteDigest {
                deck: "deck".into(),
                hash: ContentHash::from_fields(&[("Front".into(), "x".into())]),
                tags: vec!["a".into()],
            },
        );
        state
            .note_type_state
            .insert(NoteTypeId(100), NoteTypeDigest::new("Basic", &["Front", "Back"]));
        state
    }

    #[tokio::test]
    async fn save_then_load() {
        let fs = InMemoryFs::new();
        let state = sample();
        state.save(&fs).await.unwrap();

        assert!(!fs.exists(STATE_TMP_PATH).await.unwrap());
        let json: serde_json::Value =
            serde_json::from_str(&fs.contents(STATE_PATH).unwrap()).unwrap();
        assert_eq!(json["version"], "1");
        assert_eq!(json["noteState"]["555"]["deck"], "deck");
        assert_eq!(json["noteTypeState"]["100"]["fieldNames"][1], "Back");

        assert_eq!(SyncState::load(&fs).await.unwrap(), state);
    }

    #[tokio::test]
    async fn missing_file_starts_fresh() {
        let fs = InMemoryFs::new();
        assert_eq!(SyncState::load(&fs).await.unwrap(), SyncState::default());
    }

    #[tokio::test]
    async fn version_mismatch_keeps_only_settings() {
        let fs = InMemoryFs::with_files([(
            STATE_PATH,
            r#"{"version": "0", "settings": {"headingLevel": 2}, "noteState": {"1": "old format"}}"#,
        )]);

        let state = SyncState::load(&fs).await.unwrap();
        assert_eq!(state.version, FORMAT_VERSION);
        assert_eq!(state.settings.heading_level, 2);
        assert!(state.note_state.is_empty());
        assert!(state.note_type_state.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let fs = InMemoryFs::with_files([(STATE_PATH, "{not json")]);
        assert!(matches!(
            SyncState::load(&fs).await.unwrap_err(),
            StoreError::Json(_)
        ));
    }
}
