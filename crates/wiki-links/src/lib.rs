//! Span-aware parser for Obsidian-style wiki links
//!
//! Supports:
//! - Basic links: `[[Note]]`
//! - Aliases: `[[Note|Display Text]]`
//! - Headers: `[[Note#Header]]`
//! - Block references: `[[Note#^block-id]]`
//! - Embeds: `![[image.png]]`
//! - Paths: `[[folder/Note]]`
//!
//! Every link carries the byte range it occupies in the source text so that
//! callers can rewrite links in place with [`replace_wiki_links`].

use std::ops::Range;

/// A wiki link found in markdown text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiLink {
    /// Link target without fragment or alias, as written: "folder/Note.md"
    pub target: String,
    /// Header reference if present: "Header Section"
    pub header: Option<String>,
    /// Block ID if present: "block-123"
    pub block_id: Option<String>,
    /// Display alias if present: "my custom text"
    pub alias: Option<String>,
    /// Whether this is an embed (`![[...]]`)
    pub is_embed: bool,
    /// Byte range of the whole link in the source, including `!`, `[[` and `]]`
    pub span: Range<usize>,
}

impl WikiLink {
    /// The last path component of the target: "Note.md"
    pub fn file_name(&self) -> &str {
        match self.target.rfind('/') {
            Some(pos) => &self.target[pos + 1..],
            None => &self.target,
        }
    }

    /// The file name without its extension: "Note"
    pub fn name(&self) -> &str {
        let file_name = self.file_name();
        match file_name.rfind('.') {
            Some(pos) if pos > 0 => &file_name[..pos],
            _ => file_name,
        }
    }

    /// Lowercased extension without the dot, if the target has one
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name();
        match file_name.rfind('.') {
            Some(pos) if pos > 0 && pos + 1 < file_name.len() => {
                Some(file_name[pos + 1..].to_ascii_lowercase())
            }
            _ => None,
        }
    }

    /// Returns alias if present, otherwise the target as written
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.target)
    }
}

/// Parse all wiki links from markdown content, in document order.
pub fn parse_wiki_links(content: &str) -> Vec<WikiLink> {
    let mut links = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = content[cursor..].find("[[") {
        let open = cursor + offset;
        let inner_start = open + 2;

        let Some(close_offset) = content[inner_start..].find("]]") else {
            break;
        };
        let inner_end = inner_start + close_offset;
        let inner = &content[inner_start..inner_end];

        // Links never span lines and never nest
        if inner.is_empty() || inner.contains('\n') || inner.contains("[[") {
            cursor = inner_start;
            continue;
        }

        let is_embed = open > 0 && content.as_bytes()[open - 1] == b'!';
        let start = if is_embed { open - 1 } else { open };
        let end = inner_end + 2;

        links.push(parse_link_content(inner, is_embed, start..end));
        cursor = end;
    }

    links
}

/// Rewrite every wiki link in `content` with the string returned by `render`.
///
/// Text outside links is copied through unchanged.
pub fn replace_wiki_links<F>(content: &str, mut render: F) -> String
where
    F: FnMut(&WikiLink) -> String,
{
    let links = parse_wiki_links(content);
    if links.is_empty() {
        return content.to_string();
    }

    let mut result = String::with_capacity(content.len());
    let mut last = 0;
    for link in &links {
        result.push_str(&content[last..link.span.start]);
        result.push_str(&render(link));
        last = link.span.end;
    }
    result.push_str(&content[last..]);
    result
}

/// Parse the content inside [[ ]] into a WikiLink
fn parse_link_content(content: &str, is_embed: bool, span: Range<usize>) -> WikiLink {
    let (target_part, alias) = match content.split_once('|') {
        Some((target, alias)) => (target, Some(alias.trim().to_string())),
        None => (content, None),
    };

    let (target, header, block_id) = parse_fragment(target_part);

    WikiLink {
        target: target.trim().to_string(),
        header,
        block_id,
        alias,
        is_embed,
        span,
    }
}

/// Split a target into (path, header, block_id)
fn parse_fragment(target: &str) -> (&str, Option<String>, Option<String>) {
    if let Some((path, block_id)) = target.split_once("#^") {
        return (path, None, Some(block_id.to_string()));
    }
    if let Some((path, header)) = target.split_once('#') {
        return (path, Some(header.to_string()), None);
    }
    (target, None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_wiki_links() {
        let content = "- [[CLAUDE]] - test\n- [[CLAUDE.local]] - another";
        let links = parse_wiki_links(content);

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "CLAUDE");
        assert_eq!(links[0].extension(), None);
        assert!(!links[0].is_embed);
        assert_eq!(links[1].name(), "CLAUDE");
        assert_eq!(links[1].extension(), Some("local".to_string()));
    }

    #[test]
    fn parse_links_with_aliases() {
        let links = parse_wiki_links("[[Note Name|Display Text]]");

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Note Name");
        assert_eq!(links[0].alias, Some("Display Text".to_string()));
        assert_eq!(links[0].display_name(), "Display Text");
    }

    #[test]
    fn parse_links_with_headers_and_blocks() {
        let links = parse_wiki_links("[[Note#Header Section]] [[Other#^block-123]]");

        assert_eq!(links[0].target, "Note");
        assert_eq!(links[0].header, Some("Header Section".to_string()));
        assert_eq!(links[1].target, "Other");
        assert_eq!(links[1].block_id, Some("block-123".to_string()));
    }

    #[test]
    fn parse_embed_links() {
        let content = "see ![[assets/Image.PNG]]";
        let links = parse_wiki_links(content);

        assert_eq!(links.len(), 1);
        assert!(links[0].is_embed);
        assert_eq!(links[0].file_name(), "Image.PNG");
        assert_eq!(links[0].extension(), Some("png".to_string()));
        assert_eq!(&content[links[0].span.clone()], "![[assets/Image.PNG]]");
    }

    #[test]
    fn spans_cover_whole_link() {
        let content = "See [[Note1]] and [[Note2|two]] for details";
        let links = parse_wiki_links(content);

        assert_eq!(&content[links[0].span.clone()], "[[Note1]]");
        assert_eq!(&content[links[1].span.clone()], "[[Note2|two]]");
    }

    #[test]
    fn unicode_targets_keep_byte_spans() {
        let content = "前 [[笔记]] 后";
        let links = parse_wiki_links(content);

        assert_eq!(links[0].target, "笔记");
        assert_eq!(&content[links[0].span.clone()], "[[笔记]]");
    }

    #[test]
    fn ignores_unclosed_and_multiline_brackets() {
        assert!(parse_wiki_links("[[never closed").is_empty());
        assert!(parse_wiki_links("[[split\nacross]]").is_empty());
        assert!(parse_wiki_links("[[]]").is_empty());
    }

    #[test]
    fn replace_rewrites_links_in_place() {
        let rendered = replace_wiki_links("a [[x]] b [[y|why]] c", |link| {
            format!("<{}>", link.display_name())
        });
        assert_eq!(rendered, "a <x> b <why> c");
    }

    #[test]
    fn replace_without_links_is_identity() {
        let text = "Just some text with no links";
        assert_eq!(replace_wiki_links(text, |_| unreachable!()), text);
    }
}
