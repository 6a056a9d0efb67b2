//! YAML front matter splitting and composition.
//!
//! A note starts with a line containing only `---`, followed by a YAML
//! mapping, closed by the next line containing only `---`:
//! ```markdown
//! ---
//! mid: 1607392319495
//! nid: 0
//! tags: [biology]
//! ---
//! First field
//! # Back
//! Second field
//! ```

use serde_yaml::{Mapping, Value};

/// Split raw note content into (front matter YAML, body) without parsing
/// the YAML.
///
/// Returns `None` when the content has no complete front matter block.
pub fn split(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut pos = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..pos];
            let body = &rest[pos + line.len()..];
            return Some((yaml, body));
        }
        pos += line.len();
    }
    None
}

/// Parse front matter YAML into an ordered mapping.
///
/// Returns `None` for invalid YAML or YAML that is not a mapping.
pub fn parse_mapping(yaml: &str) -> Option<Mapping> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => Some(mapping),
        _ => None,
    }
}

/// Build a complete note from a front matter mapping and a body.
pub fn compose(frontmatter: &Mapping, body: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{}---\n{}", yaml, body))
}
