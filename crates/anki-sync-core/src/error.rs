use crate::anki::AnkiError;
use crate::fs::FsError;
use crate::store::StoreError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("template folder `{folder}` is misconfigured: {reason}")]
    TemplatesMisconfigured { folder: String, reason: &'static str },

    #[error("AnkiConnect is unreachable: {0}")]
    Unreachable(String),

    #[error("{0}")]
    Anki(AnkiError),

    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("state file error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the error must abort the pass rather than fail a single note.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SyncError::Anki(_))
    }
}

impl From<AnkiError> for SyncError {
    fn from(err: AnkiError) -> Self {
        match err {
            AnkiError::Transport(message) => SyncError::Unreachable(message),
            other => SyncError::Anki(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_fatal() {
        assert!(SyncError::from(AnkiError::Transport("refused".into())).is_fatal());
        assert!(!SyncError::from(AnkiError::Remote("duplicate".into())).is_fatal());
        assert!(SyncError::from(FsError::NotFound("x".into())).is_fatal());
    }
}
