// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller surface: starting runs, run control and budget queries.
//!
//! - `start_full_sync()` / `start_incremental_sync()` - launch a run
//! - `pause()` / `resume()` / `cancel()` - steer the active run
//! - `current_storage_usage()` / `storage_usage_by_category()` - budget queries
//! - `current_progress()` / `subscribe()` - observe without a stream
//! - `record_access()` - feed eviction recency and usage

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch, TryAcquireError};
use tracing::{debug, info};

use crate::budget::BudgetSnapshot;
use crate::config::ConcurrentStartPolicy;
use crate::content_item::{Priority, StoredItem};

use super::progress::{ProgressEmitter, ProgressStream};
use super::run::{cancelled, RunRequest};
use super::types::{SyncError, SyncProgress, SyncRun};
use super::{RunSignal, SyncOrchestrator};

impl SyncOrchestrator {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: Runs
    // ═══════════════════════════════════════════════════════════════════════════

    /// Start a full sync against the event's manifest.
    ///
    /// `force_refresh` re-fetches items even if the stored copy matches.
    /// `priority_hint` is a floor: lower-priority items are deferred.
    ///
    /// Must be called from within a Tokio runtime. With the `Reject` policy a
    /// second start while a run is active fails with
    /// [`SyncError::AlreadyRunning`]; with `Queue` it waits for the slot.
    pub fn start_full_sync(
        &self,
        event_id: &str,
        force_refresh: bool,
        priority_hint: Option<Priority>,
    ) -> Result<ProgressStream, SyncError> {
        self.launch(
            event_id,
            RunRequest::Full {
                force_refresh,
                priority_hint,
            },
        )
    }

    /// Start an incremental sync from the server delta since `last_sync`.
    ///
    /// With `None` the stored last-sync timestamp is used; if the event was
    /// never synced the run falls back to a full sync.
    pub fn start_incremental_sync(
        &self,
        event_id: &str,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<ProgressStream, SyncError> {
        self.launch(event_id, RunRequest::Incremental { since: last_sync })
    }

    fn launch(&self, event_id: &str, request: RunRequest) -> Result<ProgressStream, SyncError> {
        let permit = match self.inner.config.concurrent_start {
            ConcurrentStartPolicy::Reject => match self.inner.run_slot.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                    return Err(SyncError::AlreadyRunning {
                        event_id: event_id.to_string(),
                    });
                }
            },
            ConcurrentStartPolicy::Queue => None,
        };

        let (control_tx, mut control) = watch::channel(RunSignal::Running);
        match self.inner.controls.entry(event_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(SyncError::AlreadyRunning {
                    event_id: event_id.to_string(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(control_tx);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut emitter = ProgressEmitter::new(tx, self.inner.latest.clone());
        let inner = self.inner.clone();
        let event_id = event_id.to_string();
        debug!(event_id = %event_id, queued = permit.is_none(), "Launching sync run");

        tokio::spawn(async move {
            // A queued run cancelled before its turn skips the wait and ends
            // without touching the budget
            let permit = match permit {
                Some(permit) => Some(permit),
                None => tokio::select! {
                    permit = inner.run_slot.clone().acquire_owned() => permit.ok(),
                    () = cancelled(&mut control) => None,
                },
            };

            let report = inner.execute(&event_id, request, &mut control, &mut emitter).await;

            // Free the slot before the terminal update so a caller reacting
            // to it can start the next run immediately
            inner.controls.remove(&event_id);
            drop(permit);
            emitter.emit(inner.terminal_progress(report));
        });

        Ok(ProgressStream::new(rx))
    }

    /// Hold the run at the next item boundary. The in-flight fetch completes.
    pub fn pause(&self, event_id: &str) -> Result<(), SyncError> {
        self.signal(event_id, |s| {
            if *s == RunSignal::Running {
                *s = RunSignal::Paused;
                true
            } else {
                false
            }
        })
    }

    pub fn resume(&self, event_id: &str) -> Result<(), SyncError> {
        self.signal(event_id, |s| {
            if *s == RunSignal::Paused {
                *s = RunSignal::Running;
                true
            } else {
                false
            }
        })
    }

    /// Cancel the run. The in-flight fetch is abandoned and its reservation
    /// released; the run ends `Cancelled`.
    pub fn cancel(&self, event_id: &str) -> Result<(), SyncError> {
        self.signal(event_id, |s| {
            if *s == RunSignal::Cancelled {
                false
            } else {
                *s = RunSignal::Cancelled;
                true
            }
        })
    }

    fn signal(&self, event_id: &str, modify: impl FnOnce(&mut RunSignal) -> bool) -> Result<(), SyncError> {
        let control = self.inner.controls.get(event_id).ok_or_else(|| SyncError::NoActiveRun {
            event_id: event_id.to_string(),
        })?;
        let control = control.value();
        if control.send_if_modified(modify) {
            let signal = *control.borrow();
            info!(event_id, signal = ?signal, "Run control updated");
        }
        Ok(())
    }

    /// Whether a run for the event is active or queued.
    #[must_use]
    pub fn is_running(&self, event_id: &str) -> bool {
        self.inner.controls.contains_key(event_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Observation
    // ═══════════════════════════════════════════════════════════════════════════

    /// Latest progress of the most recent run, if any.
    pub fn current_progress(&self) -> Option<SyncProgress> {
        self.inner.latest.borrow().clone()
    }

    /// Read-only snapshots of every run's progress.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncProgress>> {
        self.inner.latest.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Budget
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bytes stored on the device (every event) plus reserved.
    pub fn current_storage_usage(&self) -> u64 {
        self.inner.tracker.used_bytes()
    }

    pub fn storage_usage_by_category(&self) -> HashMap<String, u64> {
        self.inner.tracker.usage_by_category()
    }

    pub fn storage_limit(&self) -> u64 {
        self.inner.tracker.limits().ceiling_bytes
    }

    pub fn budget_snapshot(&self) -> BudgetSnapshot {
        self.inner.tracker.snapshot()
    }

    /// Rebuild the budget from everything stored on the device, with
    /// `event_id` as the event whose updates will be credited, without syncing.
    ///
    /// Runs do this themselves; call it to get accurate usage figures
    /// before the first run. Takes the run slot, so it fails with
    /// [`SyncError::AlreadyRunning`] while a run is active.
    #[tracing::instrument(skip(self))]
    pub async fn load_event(&self, event_id: &str) -> Result<(), SyncError> {
        let _slot = self.inner.run_slot.try_acquire().map_err(|_| SyncError::AlreadyRunning {
            event_id: event_id.to_string(),
        })?;
        let items = self.inner.store.list_all_items().await?;
        self.inner.tracker.hydrate_device(event_id, &items);
        crate::metrics::set_storage_used_bytes(self.inner.tracker.used_bytes());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // API: Store passthrough
    // ═══════════════════════════════════════════════════════════════════════════

    /// Note that the user opened an item, raising its retention score.
    #[tracing::instrument(skip(self))]
    pub async fn record_access(&self, event_id: &str, item_id: &str) -> Result<StoredItem, SyncError> {
        Ok(self.inner.store.touch_item(event_id, item_id, Utc::now()).await?)
    }

    /// Most recent finished run for the event.
    pub async fn last_run(&self, event_id: &str) -> Result<Option<SyncRun>, SyncError> {
        Ok(self.inner.store.last_run(event_id).await?)
    }

    pub async fn last_sync_timestamp(&self, event_id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.inner.store.last_sync(event_id).await?)
    }
}
