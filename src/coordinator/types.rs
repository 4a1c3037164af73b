//! Public types for the sync orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content_item::Priority;
use crate::diff::Unfetchable;
use crate::remote::SourceError;
use crate::storage::traits::StorageError;

/// Run lifecycle state.
///
/// ```text
/// Idle → Syncing ⇄ Paused
///          │
///          └→ Completed | Failed | Cancelled
/// ```
///
/// Terminal states are final for a run; the next run starts from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Created (or queued), not yet started
    Idle,
    /// Planning or fetching
    Syncing,
    /// Held at an item boundary until resumed
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Paused => write!(f, "Paused"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// What kind of run was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunKind {
    Full {
        force_refresh: bool,
        /// Items below this priority are deferred to a later run
        priority_hint: Option<Priority>,
    },
    Incremental {
        since: DateTime<Utc>,
    },
}

/// One sync execution. Mutated while the run is live, immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub event_id: String,
    pub kind: RunKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub total_items: usize,
    pub completed_items: usize,
    pub bytes_used: u64,
    pub last_error: Option<String>,
}

impl SyncRun {
    pub fn new(event_id: impl Into<String>, kind: RunKind) -> Self {
        Self {
            event_id: event_id.into(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            status: SyncStatus::Idle,
            total_items: 0,
            completed_items: 0,
            bytes_used: 0,
            last_error: None,
        }
    }
}

/// Per-item result within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Completed,
    /// Fetch failed; eligible items are retried on the next run
    Failed { error: String, retry_eligible: bool },
    /// Did not fit even after eviction
    SkippedInsufficientStorage { shortfall_bytes: u64 },
    /// Can never fit the budget
    Unfetchable { reason: String },
    /// Held back by the priority hint
    Deferred,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::SkippedInsufficientStorage { .. } => "skipped",
            Self::Unfetchable { .. } => "unfetchable",
            Self::Deferred => "deferred",
        }
    }
}

/// A fetch that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item_id: String,
    pub error: String,
    pub retry_eligible: bool,
}

/// Final summary of a run, attached to the terminal progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub event_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_items: usize,
    /// Item ids with their outcomes, in processing order
    pub outcomes: Vec<(String, ItemOutcome)>,
    pub completed_item_ids: Vec<String>,
    pub failed: Vec<ItemFailure>,
    pub skipped_item_ids: Vec<String>,
    pub unfetchable: Vec<Unfetchable>,
    pub deferred_item_ids: Vec<String>,
    /// Stale items removed because the server no longer lists them
    pub deleted_item_ids: Vec<String>,
    /// Items of this event evicted to make room
    pub evicted_item_ids: Vec<String>,
    /// Items of other events evicted to make room, as `(event_id, item_id)`
    pub evicted_from_other_events: Vec<(String, String)>,
    /// CRITICAL items evicted as a last resort (subset of `evicted_item_ids`)
    pub critical_evictions: Vec<String>,
    pub bytes_used: u64,
    pub last_error: Option<String>,
}

impl SyncReport {
    pub fn failed_item_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.item_id.as_str()).collect()
    }

    /// Completed with some items skipped or failed
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status == SyncStatus::Completed
            && (!self.failed.is_empty() || !self.skipped_item_ids.is_empty())
    }

    pub fn outcome(&self, item_id: &str) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|(id, _)| id == item_id).map(|(_, o)| o)
    }
}

/// Progress update emitted by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub event_id: String,
    /// Unknown until the plan is computed
    pub total_items: Option<usize>,
    pub completed_items: usize,
    pub current_item_description: Option<String>,
    pub status: SyncStatus,
    pub storage_used_bytes: u64,
    pub storage_limit_bytes: u64,
    /// Present on the terminal update only
    pub report: Option<SyncReport>,
}

impl SyncProgress {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Run-level errors.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("manifest unavailable: {0}")]
    ManifestUnavailable(#[source] SourceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("a sync run is already active (requested for event '{event_id}')")]
    AlreadyRunning { event_id: String },
    #[error("no active sync run for event '{event_id}'")]
    NoActiveRun { event_id: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
