// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Content item data structures.
//!
//! A [`ManifestItem`] is the remote, immutable description of a content package
//! (safety info, map tiles, schedules...). A [`StoredItem`] is the local record
//! created once the package has been fetched.
//!
//! # Example
//!
//! ```
//! use festival_sync::{ManifestItem, Priority};
//!
//! let item = ManifestItem::new("safety", "safety", 100_000_000, Priority::Critical)
//!     .with_checksum("sha256:ab12")
//!     .with_version(3);
//!
//! assert_eq!(item.id, "safety");
//! assert!(item.priority > Priority::High);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content priority. Ordered so that `Critical > High > Normal > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Normal => write!(f, "NORMAL"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One entry of the remote manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub id: String,
    /// Content category; maps to zero or one sub-ceiling (e.g. `maps`)
    pub category: String,
    pub size_bytes: u64,
    pub priority: Priority,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Human readable label, used for progress reporting
    #[serde(default)]
    pub title: Option<String>,
}

impl ManifestItem {
    pub fn new(id: impl Into<String>, category: impl Into<String>, size_bytes: u64, priority: Priority) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            size_bytes,
            priority,
            checksum: String::new(),
            version: 1,
            last_modified: None,
            title: None,
        }
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Label shown in progress updates.
    pub fn description(&self) -> String {
        match &self.title {
            Some(title) => format!("{} ({})", title, self.category),
            None => format!("{} ({})", self.id, self.category),
        }
    }
}

/// Authoritative list of content available for an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub event_id: String,
    pub items: Vec<ManifestItem>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Manifest {
    pub fn new(event_id: impl Into<String>, items: Vec<ManifestItem>) -> Self {
        Self {
            event_id: event_id.into(),
            items,
            generated_at: None,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.size_bytes).sum()
    }
}

/// One server-side delta operation for incremental sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// Item created or updated since the last sync
    Upsert(ManifestItem),
    /// Item removed from the event
    Delete { id: String },
}

/// Local record of fetched content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub category: String,
    pub size_bytes: u64,
    pub priority: Priority,
    pub checksum: String,
    pub version: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
    pub stored_at: DateTime<Utc>,
}

impl StoredItem {
    /// Build the local record for a freshly fetched item.
    pub fn from_manifest(item: &ManifestItem, stored_at: DateTime<Utc>) -> Self {
        Self {
            id: item.id.clone(),
            category: item.category.clone(),
            size_bytes: item.size_bytes,
            priority: item.priority,
            checksum: item.checksum.clone(),
            version: item.version,
            last_used_at: None,
            use_count: 0,
            stored_at,
        }
    }

    /// True when the local copy matches the remote item's content.
    pub fn matches(&self, remote: &ManifestItem) -> bool {
        self.checksum == remote.checksum && self.version == remote.version
    }

    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
        self.use_count = self.use_count.saturating_add(1);
    }
}
