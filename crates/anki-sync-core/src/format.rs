//! Converts note fields into the text sent to Anki.
//!
//! Each field goes through the same steps in order: wiki links become
//! `obsidian://` backlinks (media embeds become images), highlights become
//! cloze deletions, and finally markdown is rendered to HTML. The last two
//! steps are controlled by [`Settings`].

use crate::note::NoteRecord;
use crate::settings::Settings;

use pulldown_cmark::{Options, Parser, html};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use wiki_links::{WikiLink, replace_wiki_links};

/// Extensions uploaded to Anki's media folder when embedded.
const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "svg", "webp", "avif", "mp3", "wav", "ogg", "m4a",
    "flac", "mp4", "webm", "ogv",
];

static HIGHLIGHT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"==([^=\n]+?)==").unwrap());
static BLOCK_MATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\$([\s\S]+?)\$\$").unwrap());
static INLINE_MATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$([^$\n]+?)\$").unwrap());

/// Field text ready for `addNote` / `updateNoteFields`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormattedNote {
    pub fields: BTreeMap<String, String>,
    /// File names of embedded media, in order of first appearance
    pub media: Vec<String>,
}

pub struct Formatter {
    vault_name: String,
    settings: Settings,
}

impl Formatter {
    pub fn new(vault_name: impl Into<String>, settings: Settings) -> Self {
        Self {
            vault_name: vault_name.into(),
            settings,
        }
    }

    pub fn format(&self, note: &NoteRecord) -> FormattedNote {
        let is_cloze = self.settings.is_cloze_type(&note.type_name);
        let mut formatted = FormattedNote::default();

        for (index, (name, text)) in note.fields.iter().enumerate() {
            let is_title = index == 0 && !is_cloze;
            let source = if is_title && self.settings.linkify {
                format!("[[{}]]", text)
            } else {
                text.clone()
            };

            let mut field = self.convert_wiki_links(&source, &mut formatted.media);
            if self.settings.highlight_as_cloze {
                field = highlights_to_cloze(&field);
            }
            if self.settings.render {
                field = render_html(&field, is_title);
            }
            formatted.fields.insert(name.clone(), field);
        }

        formatted
    }

    /// `obsidian://` URL that opens `file` in this vault.
    pub fn backlink(&self, file: &str) -> String {
        format!(
            "obsidian://open?vault={}&file={}",
            urlencoding::encode(&self.vault_name),
            urlencoding::encode(file)
        )
    }

    /// Rewrite wiki links, collecting embedded media file names into `media`.
    pub fn convert_wiki_links(&self, text: &str, media: &mut Vec<String>) -> String {
        replace_wiki_links(text, |link: &WikiLink| {
            if link.is_embed && is_media(link) {
                let file_name = link.file_name().to_string();
                let rendered = if file_name.contains(' ') {
                    format!("![](<{}>)", file_name)
                } else {
                    format!("![]({})", file_name)
                };
                if !media.contains(&file_name) {
                    media.push(file_name);
                }
                rendered
            } else {
                format!("[{}]({})", link.display_name(), self.backlink(&link.target))
            }
        })
    }
}

fn is_media(link: &WikiLink) -> bool {
    link.extension()
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

/// `==x==` spans become `{{c1::x}}`, `{{c2::...}}`, ... in document order.
pub fn highlights_to_cloze(text: &str) -> String {
    let mut counter = 0;
    HIGHLIGHT
        .replace_all(text, |caps: &Captures| {
            counter += 1;
            format!("{{{{c{}::{}}}}}", counter, &caps[1])
        })
        .into_owned()
}

/// Protect math delimiters from the markdown renderer, which eats one level
/// of backslash escaping.
fn escape_math(text: &str) -> String {
    let text = BLOCK_MATH.replace_all(text, r"\\[${1}\\]");
    INLINE_MATH.replace_all(&text, r"\\(${1}\\)").into_owned()
}

fn render_html(text: &str, inline: bool) -> String {
    let source = escape_math(text);
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut output = String::new();
    html::push_html(&mut output, Parser::new_ext(&source, options));

    if inline {
        let trimmed = output.trim_end();
        if let Some(inner) = trimmed
            .strip_prefix("<p>")
            .and_then(|rest| rest.strip_suffix("</p>"))
            .filter(|inner| !inner.contains("<p>"))
        {
            return inner.to_string();
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{NoteId, NoteTypeId};
    use serde_yaml::Mapping;

    fn note(type_name: &str, fields: &[(&str, &str)]) -> NoteRecord {
        NoteRecord {
            id: NoteId::UNSET,
            note_type: NoteTypeId(1),
            type_name: type_name.to_string(),
            path: "n.md".to_string(),
            deck: "Obsidian".to_string(),
            tags: Vec::new(),
            fields: fields
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect(),
            extras: Mapping::new(),
        }
    }

    #[test]
    fn title_and_links_become_backlinks() {
        let formatter = Formatter::new("卡片盒", Settings::default());
        let result = formatter.format(&note("Basic", &[("正面", "笔记"), ("背面", "[[另一条笔记]]")]));

        assert_eq!(
            result.fields["正面"],
            "[笔记](obsidian://open?vault=%E5%8D%A1%E7%89%87%E7%9B%92&file=%E7%AC%94%E8%AE%B0)"
        );
        assert_eq!(
            result.fields["背面"],
            "[另一条笔记](obsidian://open?vault=%E5%8D%A1%E7%89%87%E7%9B%92&file=%E5%8F%A6%E4%B8%80%E6%9D%A1%E7%AC%94%E8%AE%B0)"
        );
    }

    #[test]
    fn linkify_off_keeps_plain_title() {
        let settings = Settings {
            linkify: false,
            ..Settings::default()
        };
        let formatter = Formatter::new("v", settings);
        let result = formatter.format(&note("Basic", &[("Front", "title"), ("Back", "x")]));
        assert_eq!(result.fields["Front"], "title");
    }

    #[test]
    fn aliases_are_displayed() {
        let formatter = Formatter::new("v", Settings::default());
        let mut media = Vec::new();
        let text = formatter.convert_wiki_links("see [[dir/Other|that one]]", &mut media);
        assert_eq!(text, "see [that one](obsidian://open?vault=v&file=dir%2FOther)");
        assert!(media.is_empty());
    }

    #[test]
    fn media_embeds_are_collected() {
        let formatter = Formatter::new("v", Settings::default());
        let mut media = Vec::new();
        let text = formatter.convert_wiki_links(
            "![[img/cat.png]] ![[my dog.JPG]] ![[cat.png]] ![[Other note]]",
            &mut media,
        );
        assert_eq!(
            text,
            "![](cat.png) ![](<my dog.JPG>) ![](cat.png) [Other note](obsidian://open?vault=v&file=Other%20note)"
        );
        assert_eq!(media, vec!["cat.png", "my dog.JPG"]);
    }

    #[test]
    fn cloze_numbering_per_field() {
        assert_eq!(
            highlights_to_cloze("==x== and ==y=="),
            "{{c1::x}} and {{c2::y}}"
        );

        let settings = Settings {
            highlight_as_cloze: true,
            ..Settings::default()
        };
        let formatter = Formatter::new("v", settings);
        let result = formatter.format(&note("Cloze", &[("Text", "==a== ==b=="), ("Extra", "==c==")]));
        assert_eq!(result.fields["Text"], "{{c1::a}} {{c2::b}}");
        assert_eq!(result.fields["Extra"], "{{c1::c}}");
    }

    #[test]
    fn cloze_type_title_is_not_linkified() {
        let formatter = Formatter::new("v", Settings::default());
        let result = formatter.format(&note("Cloze", &[("Text", "plain"), ("Extra", "")]));
        assert_eq!(result.fields["Text"], "plain");
    }

    #[test]
    fn render_produces_html() {
        let settings = Settings {
            render: true,
            linkify: false,
            ..Settings::default()
        };
        let formatter = Formatter::new("v", settings);
        let result = formatter.format(&note("Basic", &[("Front", "*title*"), ("Back", "**bold**")]));
        assert_eq!(result.fields["Front"], "<em>title</em>");
        assert_eq!(result.fields["Back"], "<p><strong>bold</strong></p>\n");
    }

    #[test]
    fn math_survives_rendering() {
        let html = render_html("$$x^2$$ and $y$", false);
        assert_eq!(html, "<p>\\[x^2\\] and \\(y\\)</p>\n");
    }
}
