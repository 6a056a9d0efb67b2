//! Note type digests and template files.
//!
//! Every note type in Anki gets a skeleton note in the template folder that
//! users copy to start a new note. The skeleton is rewritten when the note
//! type's field list changes and deleted when the note type disappears.

use super::{Applied, ChangeSet, Reconcile};
use crate::error::SyncError;
use crate::fs::FileSystem;
use crate::note::{NoteRecord, NoteTypeId, template_path};
use crate::settings::Settings;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Stored form of a note type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteTypeDigest {
    pub name: String,
    /// Field names in note type order; the first one is the title
    pub field_names: Vec<String>,
}

impl NoteTypeDigest {
    pub fn new(name: &str, field_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            field_names: field_names.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateChanges {
    pub rewrite: bool,
}

impl ChangeSet for TemplateChanges {
    fn is_empty(&self) -> bool {
        !self.rewrite
    }
}

/// Keeps the template folder in line with Anki's note types.
pub struct TemplateReconciler<'a, F: ?Sized> {
    fs: &'a F,
    folder: &'a str,
    settings: &'a Settings,
}

impl<'a, F: FileSystem + ?Sized> TemplateReconciler<'a, F> {
    pub fn new(fs: &'a F, folder: &'a str, settings: &'a Settings) -> Self {
        Self {
            fs,
            folder,
            settings,
        }
    }

    async fn remove_template(&self, type_name: &str) -> Result<(), SyncError> {
        let path = template_path(self.folder, type_name);
        if self.fs.exists(&path).await? {
            self.fs.delete(&path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, F: FileSystem + ?Sized> Reconcile for TemplateReconciler<'a, F> {
    type Key = NoteTypeId;
    type Digest = NoteTypeDigest;
    type Item = NoteTypeDigest;
    type Changes = TemplateChanges;

    fn fingerprint(&self, item: &NoteTypeDigest) -> NoteTypeDigest {
        item.clone()
    }

    fn diff(&self, old: Option<&NoteTypeDigest>, new: &NoteTypeDigest) -> TemplateChanges {
        TemplateChanges {
            rewrite: old != Some(new),
        }
    }

    async fn apply(
        &self,
        key: &NoteTypeId,
        _item: &NoteTypeDigest,
        old: Option<&NoteTypeDigest>,
        new: &NoteTypeDigest,
        _changes: TemplateChanges,
    ) -> Result<Applied<NoteTypeDigest>, SyncError> {
        if let Some(old) = old {
            self.remove_template(&old.name).await?;
        }
        self.remove_template(&new.name).await?;

        let template = NoteRecord::template(*key, new, self.folder, self.settings);
        let content = template
            .serialize(self.settings)
            .map_err(|source| SyncError::Serialize {
                path: template.path.clone(),
                source,
            })?;
        self.fs.write(&template.path, content.as_bytes()).await?;
        info!("Wrote template {} for note type {}", template.path, new.name);

        Ok(Applied::complete(new.clone()))
    }

    async fn retire(&self, _key: &NoteTypeId, old: &NoteTypeDigest) -> Result<(), SyncError> {
        self.remove_template(&old.name).await?;
        info!("Removed template for deleted note type {}", old.name);
        Ok(())
    }
}
