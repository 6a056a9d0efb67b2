//! Content fingerprints for change detection.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of note content, compared against the last synced value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash an ordered list of (field name, text) pairs.
    ///
    /// Both names and order participate, so renaming or reordering fields of
    /// a note type is treated as a content change.
    pub fn from_fields(fields: &[(String, String)]) -> Self {
        let mut hasher = Sha256::new();
        for (name, text) in fields {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect()
    }

    #[test]
    fn test_content_hash_deterministic() {
        let pairs = fields(&[("Front", "hello"), ("Back", "world")]);
        assert_eq!(ContentHash::from_fields(&pairs), ContentHash::from_fields(&pairs));
        assert_eq!(ContentHash::from_fields(&pairs).as_str().len(), 64);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = ContentHash::from_fields(&fields(&[("Front", "ab"), ("Back", "c")]));
        let b = ContentHash::from_fields(&fields(&[("Front", "a"), ("Back", "bc")]));
        assert_ne!(a, b);
    }

    #[test]
    fn field_order_matters() {
        let a = ContentHash::from_fields(&fields(&[("Front", "x"), ("Back", "y")]));
        let b = ContentHash::from_fields(&fields(&[("Back", "y"), ("Front", "x")]));
        assert_ne!(a, b);
    }
}
