//! anki-sync-core: one-way synchronization of Obsidian notes into Anki.
//!
//! This crate provides:
//! - The note model (front matter + heading-delimited fields)
//! - Field formatting (backlinks, highlight clozes, markdown rendering)
//! - A typed AnkiConnect client over a pluggable transport
//! - Digest stores and the reconciliation loop
//! - The synchronization driver and its persisted state
//! - FileSystem, AnkiTransport and Notifier trait abstractions

pub mod anki;
pub mod error;
pub mod format;
pub mod frontmatter;
pub mod fs;
pub mod hash;
pub mod note;
pub mod notify;
pub mod settings;
pub mod state;
pub mod store;
pub mod sync;

pub use anki::{AnkiClient, AnkiError, AnkiTransport, InMemoryAnki};
pub use error::SyncError;
pub use format::{FormattedNote, Formatter};
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
pub use hash::ContentHash;
pub use note::{NoteId, NoteRecord, NoteTypeId, Rejection};
pub use notify::{CollectingNotifier, Notice, Notifier};
pub use settings::Settings;
pub use store::{StoreError, SyncState};
pub use sync::{PassReport, Synchronizer};
