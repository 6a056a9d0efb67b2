//! Pass scheduling for `watch` mode.
//!
//! Passes are triggered by a timer and by note changes. A pass always runs to
//! completion; triggers that arrive meanwhile collapse into a single
//! follow-up pass. Shutdown is observed between passes and persists the
//! state once more.

use crate::watcher::FileEvent;
use anki_sync_core::{AnkiTransport, FileSystem, Notifier, SyncError, Synchronizer};

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

pub struct Scheduler<F, T, N> {
    sync: Synchronizer<F, T, N>,
    interval: Option<Duration>,
}

impl<F, T, N> Scheduler<F, T, N>
where
    F: FileSystem,
    T: AnkiTransport,
    N: Notifier,
{
    /// `interval` of `None` disables timed passes.
    pub fn new(sync: Synchronizer<F, T, N>, interval: Option<Duration>) -> Self {
        Self { sync, interval }
    }

    pub fn synchronizer(&self) -> &Synchronizer<F, T, N> {
        &self.sync
    }

    /// Run until `shutdown` resolves; returns the number of passes started.
    ///
    /// The first pass starts immediately.
    pub async fn run(
        &mut self,
        mut events: Option<&mut mpsc::UnboundedReceiver<FileEvent>>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<usize, SyncError> {
        let period = self.interval.unwrap_or(Duration::from_secs(3600));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut passes = 0;
        let mut pending = true;
        loop {
            if pending {
                passes += 1;
                self.pass().await;
                pending = drain(events.as_deref_mut()) > 0;
                if pending {
                    debug!("Changes arrived during the pass, running again");
                }
                continue;
            }

            tokio::select! {
                _ = ticker.tick(), if self.interval.is_some() => {
                    debug!("Timed pass");
                    pending = true;
                }
                Some(event) = next_event(events.as_deref_mut()) => {
                    debug!("Pass triggered by {}", event.path);
                    pending = true;
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.sync.persist().await?;
        Ok(passes)
    }

    async fn pass(&mut self) {
        if let Err(e) = self.sync.run_pass().await {
            error!("Synchronization failed: {}", e);
        }
    }
}

async fn next_event(events: Option<&mut mpsc::UnboundedReceiver<FileEvent>>) -> Option<FileEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Discard queued events, returning how many there were.
fn drain(events: Option<&mut mpsc::UnboundedReceiver<FileEvent>>) -> usize {
    let Some(rx) = events else {
        return 0;
    };
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}
