//! Delivers pass notices through tracing.

use anki_sync_core::{Notice, Notifier};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::PassFailed(_) => error!("{}", notice),
            Notice::NoteFailed { .. } => warn!("{}", notice),
            Notice::PassCompleted { failed, .. } if *failed > 0 => warn!("{}", notice),
            Notice::PassCompleted { .. } => info!("{}", notice),
        }
    }
}
