// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! The [`SyncOrchestrator`] ties the components together for each run:
//! - [`StorageBudgetTracker`] for admission control
//! - [`ManifestDiffer`] for the ordered plan
//! - [`EvictionPolicy`] when an item does not fit
//! - the injected [`LocalStore`], [`ManifestSource`] and [`ContentFetcher`]
//!
//! # Run
//!
//! ```text
//! Idle → Syncing → hydrate budget → manifest/delta → diff → per item:
//!        reserve → (evict → reserve) → fetch → commit | release
//!      → stale deletions → last-sync timestamp → Completed
//! ```
//!
//! At most one run is active at a time. Runs execute on a spawned task;
//! callers observe them through the returned [`ProgressStream`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use festival_sync::{SyncConfig, SyncOrchestrator, InMemoryStore};
//! # use festival_sync::{ManifestSource, ContentFetcher};
//!
//! # async fn example(source: Arc<dyn ManifestSource>, fetcher: Arc<dyn ContentFetcher>) {
//! let store = Arc::new(InMemoryStore::new());
//! let orchestrator = SyncOrchestrator::new(SyncConfig::default(), store, source, fetcher).unwrap();
//!
//! let stream = orchestrator.start_full_sync("burn-2026", false, None).unwrap();
//! let report = stream.finish().await.unwrap();
//! println!("{} items synced, {} skipped", report.completed_item_ids.len(), report.skipped_item_ids.len());
//! # }
//! ```

mod types;
mod progress;
mod run;
mod api;

pub use types::{
    ItemFailure, ItemOutcome, RunKind, SyncError, SyncProgress, SyncReport, SyncRun, SyncStatus,
};
pub use progress::ProgressStream;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{watch, Semaphore};

use crate::budget::StorageBudgetTracker;
use crate::config::SyncConfig;
use crate::diff::ManifestDiffer;
use crate::eviction::EvictionPolicy;
use crate::remote::{ContentFetcher, ManifestSource};
use crate::storage::traits::LocalStore;

/// Control signal for an active (or queued) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunSignal {
    Running,
    Paused,
    Cancelled,
}

pub(crate) struct Inner {
    pub(crate) config: SyncConfig,

    /// Sole owner of the used-bytes counters
    pub(crate) tracker: StorageBudgetTracker,

    pub(crate) differ: ManifestDiffer,
    pub(crate) eviction: EvictionPolicy,

    pub(crate) store: Arc<dyn LocalStore>,
    pub(crate) source: Arc<dyn ManifestSource>,
    pub(crate) fetcher: Arc<dyn ContentFetcher>,

    /// One permit: at most one run executes at a time
    pub(crate) run_slot: Arc<Semaphore>,

    /// Pause/resume/cancel handles keyed by event id
    pub(crate) controls: DashMap<String, watch::Sender<RunSignal>>,

    /// Latest progress of whichever run last emitted
    pub(crate) latest: Arc<watch::Sender<Option<SyncProgress>>>,
}

/// Priority-ordered content sync under a storage budget.
///
/// Cheap to clone; clones share the same budget, store and run slot.
#[derive(Clone)]
pub struct SyncOrchestrator {
    pub(crate) inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Create an orchestrator. Fails if the configuration is invalid.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn LocalStore>,
        source: Arc<dyn ManifestSource>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let limits = config.budget_limits();
        let (latest, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(Inner {
                tracker: StorageBudgetTracker::new(limits.clone()),
                differ: ManifestDiffer::new(limits),
                eviction: EvictionPolicy::new(config.eviction_weights()),
                config,
                store,
                source,
                fetcher,
                run_slot: Arc::new(Semaphore::new(1)),
                controls: DashMap::new(),
                latest: Arc::new(latest),
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }
}
