//! Note model: converts between vault files and structured note records.
//!
//! A note file carries its Anki identity in front matter and its fields in
//! the body:
//!
//! ```markdown
//! ---
//! mid: 1607392319495
//! nid: 0
//! tags: [a, b]
//! ---
//! text of the second field
//! # Back
//! text of the third field
//! ```
//!
//! The first field (the title) is the file name, except for the cloze note
//! type which has no distinct title and reads its first field from the body.

use crate::frontmatter;
use crate::hash::ContentHash;
use crate::settings::Settings;
use crate::state::note::NoteDigest;
use crate::state::note_type::NoteTypeDigest;
use crate::state::DigestMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use thiserror::Error;

const MID_KEY: &str = "mid";
const NID_KEY: &str = "nid";
const TAGS_KEY: &str = "tags";

/// Identity of a note in Anki. `0` means the note has not been created yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl NoteId {
    pub const UNSET: NoteId = NoteId(0);

    pub fn is_unset(self) -> bool {
        self == Self::UNSET
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a note type (model) in Anki.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteTypeId(pub i64);

impl fmt::Display for NoteTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a vault file was not accepted as a note.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no front matter")]
    NoFrontMatter,

    #[error("front matter is not a YAML mapping")]
    InvalidFrontMatter,

    #[error("missing or invalid `{0}` in front matter")]
    MissingKey(&'static str),

    #[error("unknown note type {0}")]
    UnknownNoteType(NoteTypeId),

    #[error("note type {note_type} has {expected} fields but the note has {found}")]
    FieldCount {
        note_type: String,
        expected: usize,
        found: usize,
    },
}

impl Rejection {
    /// Whether the file simply isn't meant to be a note (as opposed to a
    /// broken note).
    pub fn is_not_a_note(&self) -> bool {
        matches!(
            self,
            Rejection::NoFrontMatter | Rejection::InvalidFrontMatter | Rejection::MissingKey(_)
        )
    }
}

/// A note parsed from a vault file. Constructed fresh on every pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRecord {
    pub id: NoteId,
    pub note_type: NoteTypeId,
    /// Name of the note type, needed when creating the note in Anki
    pub type_name: String,
    /// Vault-relative path of the source file
    pub path: String,
    /// Deck derived from the source folder
    pub deck: String,
    /// Tags in front matter order
    pub tags: Vec<String>,
    /// Field name and raw text, in note type order
    pub fields: Vec<(String, String)>,
    /// Front matter keys the synchronizer does not interpret
    pub extras: Mapping,
}

impl NoteRecord {
    /// Parse a vault file into a note record.
    pub fn parse(
        path: &str,
        raw: &str,
        note_types: &DigestMap<NoteTypeId, NoteTypeDigest>,
        settings: &Settings,
    ) -> Result<Self, Rejection> {
        let (yaml, body) = frontmatter::split(raw).ok_or(Rejection::NoFrontMatter)?;
        let mapping = frontmatter::parse_mapping(yaml).ok_or(Rejection::InvalidFrontMatter)?;

        let note_type = mapping
            .get(MID_KEY)
            .and_then(Value::as_i64)
            .map(NoteTypeId)
            .ok_or(Rejection::MissingKey(MID_KEY))?;
        let id = mapping
            .get(NID_KEY)
            .and_then(Value::as_i64)
            .map(NoteId)
            .ok_or(Rejection::MissingKey(NID_KEY))?;
        let tags = mapping
            .get(TAGS_KEY)
            .ok_or(Rejection::MissingKey(TAGS_KEY))
            .and_then(parse_tags)?;
        let extras: Mapping = mapping
            .iter()
            .filter(|(key, _)| !is_reserved_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let schema = note_types
            .get(&note_type)
            .ok_or(Rejection::UnknownNoteType(note_type))?;
        let is_cloze = settings.is_cloze_type(&schema.name);

        let sections = split_sections(basename(path), body, is_cloze, settings);
        let expected = schema.field_names.len();
        let sections = match sections {
            // A single-field note type has nothing but its title
            mut s if !is_cloze && expected == 1 && s.len() == 2 && s[1].trim().is_empty() => {
                s.truncate(1);
                s
            }
            s => s,
        };
        if sections.len() != expected {
            return Err(Rejection::FieldCount {
                note_type: schema.name.clone(),
                expected,
                found: sections.len(),
            });
        }

        Ok(Self {
            id,
            note_type,
            type_name: schema.name.clone(),
            path: path.to_string(),
            deck: deck_for_path(path, &settings.default_deck),
            tags,
            fields: schema.field_names.iter().cloned().zip(sections).collect(),
            extras,
        })
    }

    /// Render the record back into note file content.
    pub fn serialize(&self, settings: &Settings) -> Result<String, serde_yaml::Error> {
        let mut fm = Mapping::new();
        fm.insert(MID_KEY.into(), self.note_type.0.into());
        fm.insert(NID_KEY.into(), self.id.0.into());
        fm.insert(
            TAGS_KEY.into(),
            Value::Sequence(self.tags.iter().map(|t| Value::from(t.as_str())).collect()),
        );
        for (key, value) in &self.extras {
            fm.insert(key.clone(), value.clone());
        }

        let first_body_field = if settings.is_cloze_type(&self.type_name) { 0 } else { 1 };
        let marker = settings.heading_marker();
        let mut body = String::new();
        for (index, (name, text)) in self.fields.iter().enumerate().skip(first_body_field) {
            if index > first_body_field {
                body.push('\n');
                body.push_str(&marker);
                body.push_str(name);
                body.push('\n');
            }
            body.push_str(text);
        }

        frontmatter::compose(&fm, &body)
    }

    /// An empty note of the given type, stored at `{folder}/{type name}.md`.
    ///
    /// Used as the template users copy to create new notes.
    pub fn template(
        note_type: NoteTypeId,
        schema: &NoteTypeDigest,
        folder: &str,
        settings: &Settings,
    ) -> Self {
        let path = template_path(folder, &schema.name);
        let mut extras = Mapping::new();
        extras.insert("date".into(), "{{date}} {{time}}".into());

        let mut fields: Vec<(String, String)> = schema
            .field_names
            .iter()
            .map(|name| (name.clone(), String::new()))
            .collect();
        if let Some(title) = fields.first_mut().filter(|_| !settings.is_cloze_type(&schema.name)) {
            title.1 = basename(&path).to_string();
        }

        Self {
            id: NoteId::UNSET,
            note_type,
            type_name: schema.name.clone(),
            deck: deck_for_path(&path, &settings.default_deck),
            path,
            tags: Vec::new(),
            fields,
            extras,
        }
    }

    /// The digest recorded for this note after a successful sync.
    pub fn fingerprint(&self) -> NoteDigest {
        NoteDigest {
            deck: self.deck.clone(),
            hash: ContentHash::from_fields(&self.fields),
            tags: self.tags.clone(),
        }
    }

    /// The first field, used to name the note in logs and notices.
    pub fn title(&self) -> &str {
        self.fields
            .first()
            .map(|(_, text)| text.as_str())
            .unwrap_or(&self.path)
    }
}

/// The non-zero `nid` declared by a file that may not parse as a note.
///
/// Falls back to scanning the front matter line by line when it is not
/// valid YAML.
pub fn claimed_id(raw: &str) -> Option<NoteId> {
    let (yaml, _) = frontmatter::split(raw)?;
    let id = match frontmatter::parse_mapping(yaml) {
        Some(mapping) => mapping.get(NID_KEY).and_then(Value::as_i64),
        None => yaml.lines().find_map(|line| {
            line.strip_prefix(NID_KEY)?
                .trim_start()
                .strip_prefix(':')?
                .trim()
                .parse()
                .ok()
        }),
    };
    id.map(NoteId).filter(|id| !id.is_unset())
}

/// Deck name for a vault path: the parent folder with `/` replaced by `::`.
pub fn deck_for_path(path: &str, default_deck: &str) -> String {
    match path.trim_matches('/').rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.split('/').collect::<Vec<_>>().join("::"),
        _ => default_deck.to_string(),
    }
}

/// Vault path of the template for a note type.
pub fn template_path(folder: &str, type_name: &str) -> String {
    let file_stem: String = type_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect();
    crate::fs::join(folder.trim_matches('/'), &format!("{}.md", file_stem))
}

/// File name without directory or `.md` extension.
fn basename(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.strip_suffix(".md").unwrap_or(file_name)
}

fn is_reserved_key(key: &Value) -> bool {
    matches!(key.as_str(), Some(MID_KEY | NID_KEY | TAGS_KEY))
}

fn parse_tags(value: &Value) -> Result<Vec<String>, Rejection> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(tag) => Ok(vec![tag.clone()]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag.clone()),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(Rejection::MissingKey(TAGS_KEY)),
            })
            .collect(),
        _ => Err(Rejection::MissingKey(TAGS_KEY)),
    }
}

/// Split the body into field sections at heading lines of the configured level.
fn split_sections(title: &str, body: &str, is_cloze: bool, settings: &Settings) -> Vec<String> {
    let marker = settings.heading_marker();
    let mut sections = Vec::new();
    if !is_cloze {
        sections.push(title.to_string());
    }

    let mut buffer: Vec<&str> = Vec::new();
    for line in body.split('\n') {
        if line.starts_with(&marker) {
            sections.push(buffer.join("\n"));
            buffer.clear();
        } else {
            buffer.push(line);
        }
    }
    sections.push(buffer.join("\n"));
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_types() -> DigestMap<NoteTypeId, NoteTypeDigest> {
        let mut types = DigestMap::new();
        types.insert(NoteTypeId(100), NoteTypeDigest::new("Basic", &["Front", "Back"]));
        types.insert(
            NoteTypeId(200),
            NoteTypeDigest::new("Cloze", &["Text", "Back Extra"]),
        );
        types.insert(
            NoteTypeId(300),
            NoteTypeDigest::new("Vocab", &["Word", "Meaning", "Example"]),
        );
        types
    }

    #[test]
    fn parses_basic_note() {
        let raw = "---\nmid: 100\nnid: 0\ntags: [a, b]\n---\nbody text";
        let note =
            NoteRecord::parse("deck/sub/My Note.md", raw, &note_types(), &Settings::default())
                .unwrap();

        assert_eq!(note.id, NoteId::UNSET);
        assert_eq!(note.note_type, NoteTypeId(100));
        assert_eq!(note.type_name, "Basic");
        assert_eq!(note.deck, "deck::sub");
        assert_eq!(note.tags, vec!["a", "b"]);
        assert_eq!(
            note.fields,
            vec![
                ("Front".to_string(), "My Note".to_string()),
                ("Back".to_string(), "body text".to_string()),
            ]
        );
        assert!(note.extras.is_empty());
    }

    #[test]
    fn rejects_field_count_mismatch() {
        let raw = "---\nmid: 100\nnid: 0\ntags: []\n---\none\n# Two\ntwo";
        let err = NoteRecord::parse("n.md", raw, &note_types(), &Settings::default()).unwrap_err();
        assert_eq!(
            err,
            Rejection::FieldCount {
                note_type: "Basic".into(),
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn splits_fields_at_configured_heading_level() {
        let raw = "---\nmid: 300\nnid: 7\ntags: []\n---\nmeaning\n# not a field\n## Example\nexample";
        let settings = Settings {
            heading_level: 2,
            ..Settings::default()
        };
        let note = NoteRecord::parse("word.md", raw, &note_types(), &settings).unwrap();

        assert_eq!(note.fields[0].1, "word");
        assert_eq!(note.fields[1].1, "meaning\n# not a field");
        assert_eq!(note.fields[2].1, "example");
    }

    #[test]
    fn cloze_notes_take_first_field_from_body() {
        let raw = "---\nmid: 200\nnid: 1\ntags: []\n---\n==Paris== is in France\n# Back Extra\ngeo";
        let note = NoteRecord::parse("capital.md", raw, &note_types(), &Settings::default()).unwrap();

        assert_eq!(note.fields[0], ("Text".into(), "==Paris== is in France".into()));
        assert_eq!(note.fields[1], ("Back Extra".into(), "geo".into()));
    }

    #[test]
    fn rejects_missing_keys_and_unknown_types() {
        let types = note_types();
        let settings = Settings::default();

        let missing = NoteRecord::parse("n.md", "---\nmid: 100\ntags: []\n---\n", &types, &settings);
        assert_eq!(missing.unwrap_err(), Rejection::MissingKey("nid"));

        let unknown = NoteRecord::parse("n.md", "---\nmid: 9\nnid: 0\ntags: []\n---\n", &types, &settings);
        assert_eq!(unknown.unwrap_err(), Rejection::UnknownNoteType(NoteTypeId(9)));

        let plain = NoteRecord::parse("n.md", "# A regular note", &types, &settings);
        assert!(plain.unwrap_err().is_not_a_note());
    }

    #[test]
    fn null_tags_are_empty() {
        let raw = "---\nmid: 100\nnid: 0\ntags:\n---\nback";
        let note = NoteRecord::parse("n.md", raw, &note_types(), &Settings::default()).unwrap();
        assert!(note.tags.is_empty());
    }

    #[test]
    fn serialize_roundtrip_preserves_extras() {
        let raw = "---\nmid: 300\nnid: 42\ntags: [x]\naliases: [w]\ncreated: 2024-01-01\n---\nmeaning\n\n# Example\n  indented\n";
        let settings = Settings::default();
        let note = NoteRecord::parse("dir/word.md", raw, &note_types(), &settings).unwrap();

        let serialized = note.serialize(&settings).unwrap();
        let reparsed = NoteRecord::parse("dir/word.md", &serialized, &note_types(), &settings).unwrap();

        assert_eq!(reparsed, note);
        assert_eq!(
            note.extras.keys().filter_map(Value::as_str).collect::<Vec<_>>(),
            vec!["aliases", "created"]
        );
    }

    #[test]
    fn serialize_writes_assigned_identity() {
        let raw = "---\nmid: 100\nnid: 0\ntags: [a, b]\n---\nbody text";
        let settings = Settings::default();
        let mut note = NoteRecord::parse("title.md", raw, &note_types(), &settings).unwrap();
        note.id = NoteId(555);

        let serialized = note.serialize(&settings).unwrap();
        assert!(serialized.contains("nid: 555"));
        assert!(serialized.ends_with("---\nbody text"));
    }

    #[test]
    fn deck_from_path() {
        assert_eq!(deck_for_path("a/b/note.md", "Obsidian"), "a::b");
        assert_eq!(deck_for_path("note.md", "Obsidian"), "Obsidian");
        assert_eq!(deck_for_path("/top/note.md", "Default"), "top");
    }

    #[test]
    fn template_parses_as_empty_note() {
        let settings = Settings::default();
        let types = note_types();
        let schema = types.get(&NoteTypeId(300)).unwrap();
        let template = NoteRecord::template(NoteTypeId(300), schema, "Templates", &settings);

        assert_eq!(template.path, "Templates/Vocab.md");
        let content = template.serialize(&settings).unwrap();
        assert!(content.contains("{{date}} {{time}}"));

        let parsed = NoteRecord::parse(&template.path, &content, &types, &settings).unwrap();
        assert_eq!(parsed.id, NoteId::UNSET);
        assert_eq!(parsed.fields.len(), 3);
        assert_eq!(parsed.fields[0].1, "Vocab");
    }

    #[test]
    fn template_names_are_sanitized() {
        assert_eq!(template_path("Templates/", "A/B: c"), "Templates/A-B- c.md");
    }

    #[test]
    fn identity_is_read_from_broken_notes() {
        assert_eq!(
            claimed_id("---\nmid: 100\nnid: 555\ntags: []\n---\none\n# Two\n# Three"),
            Some(NoteId(555))
        );
        assert_eq!(
            claimed_id("---\nmid: 100\nnid: 555\ntags: [a, b\n---\nbody"),
            Some(NoteId(555))
        );
        assert_eq!(claimed_id("---\nmid: 100\nnid: 0\ntags: []\n---\nbody"), None);
        assert_eq!(claimed_id("# no front matter\nnid: 555"), None);
    }
}
