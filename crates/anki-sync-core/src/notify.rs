//! User-facing notices emitted by a pass.

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The pass was aborted before anything was persisted
    PassFailed(String),
    /// A single note could not be fully synchronized
    NoteFailed { path: String, message: String },
    /// Summary of a completed pass
    PassCompleted {
        created: usize,
        updated: usize,
        failed: usize,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PassFailed(message) => write!(f, "Synchronization failed: {}", message),
            Notice::NoteFailed { path, message } => write!(f, "{}: {}", path, message),
            Notice::PassCompleted {
                created,
                updated,
                failed,
            } => {
                write!(f, "Synchronized: {} created, {} updated", created, updated)?;
                if *failed > 0 {
                    write!(f, ", {} failed", failed)?;
                }
                Ok(())
            }
        }
    }
}

/// Delivers notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Keeps every notice; used by tests.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_mentions_failures_only_when_present() {
        let clean = Notice::PassCompleted {
            created: 1,
            updated: 2,
            failed: 0,
        };
        assert_eq!(clean.to_string(), "Synchronized: 1 created, 2 updated");

        let partial = Notice::PassCompleted {
            created: 0,
            updated: 0,
            failed: 3,
        };
        assert_eq!(partial.to_string(), "Synchronized: 0 created, 0 updated, 3 failed");
    }
}
