//! User-facing synchronization settings.
//!
//! Persisted in the `settings` section of the state file; command-line flags
//! override individual values.

use serde::{Deserialize, Serialize};

/// Synchronization settings with plugin-compatible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Render fields to HTML before sending them to Anki
    pub render: bool,
    /// Turn the title field into a link back to the note
    pub linkify: bool,
    /// Convert `==highlight==` spans into cloze deletions
    pub highlight_as_cloze: bool,
    /// Heading level (1-6) that separates fields in the note body
    pub heading_level: u8,
    /// Deck used for notes at the vault root
    pub default_deck: String,
    /// Note type whose first field comes from the body instead of the file name
    pub cloze_note_type: String,
    /// Vault folder holding generated note type templates
    pub template_folder: String,
    /// Delete notes from Anki when their source file disappears
    pub prune_remote: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render: false,
            linkify: true,
            highlight_as_cloze: false,
            heading_level: 1,
            default_deck: "Obsidian".to_string(),
            cloze_note_type: "Cloze".to_string(),
            template_folder: "Templates".to_string(),
            prune_remote: false,
        }
    }
}

impl Settings {
    /// The heading prefix that opens a new field, e.g. `"## "` for level 2.
    pub fn heading_marker(&self) -> String {
        let level = self.heading_level.clamp(1, 6) as usize;
        format!("{} ", "#".repeat(level))
    }

    pub fn is_cloze_type(&self, type_name: &str) -> bool {
        type_name == self.cloze_note_type
    }
}
