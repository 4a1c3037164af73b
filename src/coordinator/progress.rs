//! Progress delivery.
//!
//! Each run has one producer ([`ProgressEmitter`]) and one ordered, finite
//! [`ProgressStream`] handed to the caller. The latest update is also
//! mirrored into a `watch` channel so any number of observers (a status
//! screen, a notification) can read snapshots without touching the run.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};

use super::types::{SyncProgress, SyncReport};

/// Ordered progress updates for one run, ending after the terminal update.
///
/// Dropping the stream does not affect the run.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<SyncProgress>,
    done: bool,
}

impl ProgressStream {
    pub(super) fn new(rx: mpsc::UnboundedReceiver<SyncProgress>) -> Self {
        Self { rx, done: false }
    }

    /// Next update, or `None` once the terminal update has been yielded.
    pub async fn next_progress(&mut self) -> Option<SyncProgress> {
        if self.done {
            return None;
        }
        let progress = self.rx.recv().await?;
        if progress.is_terminal() {
            self.done = true;
        }
        Some(progress)
    }

    /// Drain every remaining update.
    pub async fn collect_all(mut self) -> Vec<SyncProgress> {
        let mut updates = Vec::new();
        while let Some(progress) = self.next_progress().await {
            updates.push(progress);
        }
        updates
    }

    /// Wait for the run to finish and return its report.
    pub async fn finish(mut self) -> Option<SyncReport> {
        let mut report = None;
        while let Some(progress) = self.next_progress().await {
            if progress.is_terminal() {
                report = progress.report;
            }
        }
        report
    }
}

impl Stream for ProgressStream {
    type Item = SyncProgress;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(progress)) => {
                if progress.is_terminal() {
                    self.done = true;
                }
                Poll::Ready(Some(progress))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Single producer side of a run's progress.
///
/// Clamps `completed_items` so it never goes backwards and drops anything
/// sent after the terminal update.
pub(super) struct ProgressEmitter {
    tx: mpsc::UnboundedSender<SyncProgress>,
    latest: Arc<watch::Sender<Option<SyncProgress>>>,
    last_completed: usize,
    terminated: bool,
}

impl ProgressEmitter {
    pub(super) fn new(
        tx: mpsc::UnboundedSender<SyncProgress>,
        latest: Arc<watch::Sender<Option<SyncProgress>>>,
    ) -> Self {
        Self {
            tx,
            latest,
            last_completed: 0,
            terminated: false,
        }
    }

    pub(super) fn emit(&mut self, mut progress: SyncProgress) {
        if self.terminated {
            return;
        }
        progress.completed_items = progress.completed_items.max(self.last_completed);
        self.last_completed = progress.completed_items;
        self.terminated = progress.is_terminal();

        self.latest.send_replace(Some(progress.clone()));
        // Receiver may be gone; the run carries on regardless
        let _ = self.tx.send(progress);
    }
}
