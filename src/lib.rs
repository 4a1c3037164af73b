//! # Festival Sync
//!
//! Priority-ordered offline content sync under a fixed storage budget.
//!
//! Decides what to download for an event, in what order, what to evict when
//! space runs out, and how to report progress and failure to the caller.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SyncOrchestrator                        │
//! │  • start_full_sync / start_incremental_sync                │
//! │  • pause / resume / cancel, one run at a time              │
//! │  • ProgressStream: ordered, finite, monotonic              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (manifest or delta → plan)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ManifestDiffer                         │
//! │  • to_fetch: priority desc, size asc, stable               │
//! │  • unchanged / to_delete / unfetchable                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (per item, in plan order)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  StorageBudgetTracker                       │
//! │  • reserve → commit | release, record_removal              │
//! │  • global ceiling + per-category sub-ceilings              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (InsufficientSpace)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     EvictionPolicy                          │
//! │  • priority + recency + usage - size penalty               │
//! │  • CRITICAL only as a flagged last resort                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use festival_sync::{InMemoryStore, SyncConfig, SyncOrchestrator, SyncStatus};
//! # use festival_sync::{ContentFetcher, ManifestSource};
//!
//! # async fn example(source: Arc<dyn ManifestSource>, fetcher: Arc<dyn ContentFetcher>) {
//! let config = SyncConfig {
//!     ceiling_bytes: 2_000_000_000,
//!     ..Default::default()
//! };
//! let store = Arc::new(InMemoryStore::new());
//! let orchestrator = SyncOrchestrator::new(config, store, source, fetcher).unwrap();
//!
//! let report = orchestrator
//!     .start_full_sync("burn-2026", false, None)
//!     .unwrap()
//!     .finish()
//!     .await
//!     .unwrap();
//!
//! assert_eq!(report.status, SyncStatus::Completed);
//! println!("skipped for space: {:?}", report.skipped_item_ids);
//! # }
//! ```
//!
//! ## Features
//!
//! - **Budget admission**: reservations keep `used_bytes` exact and never over the ceiling
//! - **Priority scheduling**: CRITICAL → HIGH → NORMAL → LOW, smaller first within a priority
//! - **Eviction**: scored, CRITICAL protected, applied only if it covers the shortfall
//! - **Non-blocking skips**: an item that does not fit never stops the rest
//! - **Incremental sync**: server deltas, empty delta completes immediately
//! - **Retry**: manifest and item retries with exponential backoff, per-item timeout
//! - **Metrics**: `metrics` crate counters, gauges and histograms
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`SyncOrchestrator`] and its run state machine
//! - [`budget`]: Storage budget tracking and pressure levels
//! - [`eviction`]: Retention scoring and victim selection
//! - [`diff`]: Manifest diffing into a [`SyncPlan`]
//! - [`storage`]: Local store interface and in-memory implementation
//! - [`remote`]: Manifest source and content fetcher interfaces
//! - [`resilience`]: Retry logic

pub mod config;
pub mod content_item;
pub mod budget;
pub mod eviction;
pub mod diff;
pub mod storage;
pub mod remote;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

pub use config::{ConcurrentStartPolicy, SyncConfig};
pub use content_item::{Change, Manifest, ManifestItem, Priority, StoredItem};
pub use budget::{
    BudgetLimits, BudgetPressure, BudgetSnapshot, CategoryShortfall, InsufficientSpace, Reservation,
    StorageBudgetTracker,
};
pub use eviction::{EvictionPlan, EvictionPolicy, EvictionWeights, VictimSelection};
pub use diff::{ManifestDiffer, SyncPlan, Unfetchable, UnfetchableReason};
pub use storage::memory::InMemoryStore;
pub use storage::traits::{LocalStore, StorageError};
pub use remote::{
    CoalescingManifestSource, ContentFetcher, FetchError, FetchedContent, ManifestSource, SourceError,
};
pub use resilience::retry::RetryConfig;
pub use coordinator::{
    ItemFailure, ItemOutcome, ProgressStream, RunKind, SyncError, SyncOrchestrator, SyncProgress, SyncReport,
    SyncRun, SyncStatus,
};
pub use metrics::LatencyTimer;
