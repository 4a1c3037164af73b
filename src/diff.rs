// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Manifest diffing.
//!
//! [`ManifestDiffer`] compares the remote manifest (or a server delta) with
//! the local store and produces a [`SyncPlan`]:
//!
//! - `to_fetch`: new or changed items, CRITICAL first, then smallest first
//! - `unchanged`: items whose checksum and version already match
//! - `to_delete`: local items the server no longer lists
//! - `unfetchable`: items that can never fit, with the reason
//! - `to_evict_candidates`: stored items that stay, listed only when the
//!   fetch set cannot fit in the budget as-is
//!
//! # Example
//!
//! ```
//! use festival_sync::{BudgetLimits, ManifestDiffer, ManifestItem, Priority};
//!
//! let differ = ManifestDiffer::new(BudgetLimits::new(1_000));
//! let remote = vec![
//!     ManifestItem::new("chat", "community", 300, Priority::Low),
//!     ManifestItem::new("safety", "safety", 100, Priority::Critical),
//! ];
//!
//! let plan = differ.diff(&remote, &[], false);
//! let order: Vec<_> = plan.to_fetch.iter().map(|i| i.id.as_str()).collect();
//! assert_eq!(order, vec!["safety", "chat"]);
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::budget::BudgetLimits;
use crate::content_item::{Change, ManifestItem, Priority, StoredItem};

/// Why an item was left out of the fetch set for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnfetchableReason {
    /// Larger than the global ceiling
    ExceedsCeiling { size_bytes: u64, ceiling_bytes: u64 },
    /// Larger than its category's ceiling
    ExceedsSubCeiling { category: String, size_bytes: u64, ceiling_bytes: u64 },
    /// Declared size is zero
    InvalidSize,
}

impl std::fmt::Display for UnfetchableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExceedsCeiling { size_bytes, ceiling_bytes } => {
                write!(f, "{} bytes exceeds the {} byte storage ceiling", size_bytes, ceiling_bytes)
            }
            Self::ExceedsSubCeiling { category, size_bytes, ceiling_bytes } => write!(
                f,
                "{} bytes exceeds the {} byte '{}' ceiling",
                size_bytes, ceiling_bytes, category
            ),
            Self::InvalidSize => write!(f, "declared size is zero"),
        }
    }
}

/// An item excluded from `to_fetch`, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unfetchable {
    pub item: ManifestItem,
    pub reason: UnfetchableReason,
}

/// Ordered admission plan for one run. Recomputed every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_fetch: Vec<ManifestItem>,
    pub to_evict_candidates: Vec<StoredItem>,
    pub unchanged: Vec<ManifestItem>,
    pub to_delete: Vec<StoredItem>,
    pub unfetchable: Vec<Unfetchable>,
    /// Items held back by a priority floor for a later run
    pub deferred: Vec<ManifestItem>,
}

impl SyncPlan {
    /// True when there is nothing to fetch and nothing to delete
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_fetch.is_empty() && self.to_delete.is_empty()
    }

    pub fn fetch_bytes(&self) -> u64 {
        self.to_fetch.iter().map(|i| i.size_bytes).sum()
    }

    /// Move `to_fetch` items below `floor` into `deferred`.
    pub fn apply_priority_floor(&mut self, floor: Priority) {
        let (keep, defer): (Vec<_>, Vec<_>) = std::mem::take(&mut self.to_fetch)
            .into_iter()
            .partition(|i| i.priority >= floor);
        self.to_fetch = keep;
        self.deferred.extend(defer);
    }
}

/// Produces [`SyncPlan`]s against a fixed set of budget limits.
#[derive(Debug, Clone)]
pub struct ManifestDiffer {
    limits: BudgetLimits,
}

impl ManifestDiffer {
    pub fn new(limits: BudgetLimits) -> Self {
        Self { limits }
    }

    /// Full diff of the remote manifest against local state.
    pub fn diff(&self, remote: &[ManifestItem], local: &[StoredItem], force_refresh: bool) -> SyncPlan {
        let local_by_id: HashMap<&str, &StoredItem> = local.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut plan = SyncPlan::default();
        let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());

        for item in remote {
            if !seen.insert(item.id.as_str()) {
                warn!(item_id = %item.id, "Duplicate manifest entry ignored");
                continue;
            }
            match local_by_id.get(item.id.as_str()) {
                Some(stored) if !force_refresh && stored.matches(item) => plan.unchanged.push(item.clone()),
                _ => self.admit(&mut plan, item),
            }
        }

        plan.to_delete = local
            .iter()
            .filter(|s| !seen.contains(s.id.as_str()))
            .cloned()
            .collect();

        self.finish(&mut plan, local);
        debug!(
            fetch = plan.to_fetch.len(),
            unchanged = plan.unchanged.len(),
            delete = plan.to_delete.len(),
            unfetchable = plan.unfetchable.len(),
            "Manifest diff complete"
        );
        plan
    }

    /// Plan from a server delta. Items the delta does not mention are left alone.
    pub fn diff_changes(&self, changes: &[Change], local: &[StoredItem]) -> SyncPlan {
        let local_by_id: HashMap<&str, &StoredItem> = local.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut plan = SyncPlan::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for change in changes {
            match change {
                Change::Upsert(item) => {
                    if !seen.insert(item.id.as_str()) {
                        warn!(item_id = %item.id, "Duplicate delta entry ignored");
                        continue;
                    }
                    match local_by_id.get(item.id.as_str()) {
                        Some(stored) if stored.matches(item) => plan.unchanged.push(item.clone()),
                        _ => self.admit(&mut plan, item),
                    }
                }
                Change::Delete { id } => {
                    if !seen.insert(id.as_str()) {
                        continue;
                    }
                    if let Some(stored) = local_by_id.get(id.as_str()) {
                        plan.to_delete.push((*stored).clone());
                    }
                }
            }
        }

        self.finish(&mut plan, local);
        plan
    }

    /// Check an item against the ceilings.
    pub fn check_fits(&self, item: &ManifestItem) -> Result<(), UnfetchableReason> {
        if item.size_bytes == 0 {
            return Err(UnfetchableReason::InvalidSize);
        }
        if item.size_bytes > self.limits.ceiling_bytes {
            return Err(UnfetchableReason::ExceedsCeiling {
                size_bytes: item.size_bytes,
                ceiling_bytes: self.limits.ceiling_bytes,
            });
        }
        if let Some(limit) = self.limits.sub_ceiling(&item.category) {
            if item.size_bytes > limit {
                return Err(UnfetchableReason::ExceedsSubCeiling {
                    category: item.category.clone(),
                    size_bytes: item.size_bytes,
                    ceiling_bytes: limit,
                });
            }
        }
        Ok(())
    }

    fn admit(&self, plan: &mut SyncPlan, item: &ManifestItem) {
        match self.check_fits(item) {
            Ok(()) => plan.to_fetch.push(item.clone()),
            Err(reason) => {
                warn!(item_id = %item.id, %reason, "Item can never fit the storage budget");
                plan.unfetchable.push(Unfetchable {
                    item: item.clone(),
                    reason,
                });
            }
        }
    }

    fn finish(&self, plan: &mut SyncPlan, local: &[StoredItem]) {
        // Stable: equal keys keep manifest order
        plan.to_fetch.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.size_bytes.cmp(&b.size_bytes))
        });
        plan.to_evict_candidates = self.evict_candidates(plan, local);
    }

    /// Stored items that remain after the plan, if the projected total overflows.
    fn evict_candidates(&self, plan: &SyncPlan, local: &[StoredItem]) -> Vec<StoredItem> {
        let leaving: HashSet<&str> = plan
            .to_delete
            .iter()
            .map(|s| s.id.as_str())
            .chain(plan.to_fetch.iter().map(|i| i.id.as_str()))
            .collect();
        let remaining: Vec<&StoredItem> = local.iter().filter(|s| !leaving.contains(s.id.as_str())).collect();

        let mut projected: HashMap<&str, u64> = HashMap::new();
        for stored in &remaining {
            *projected.entry(stored.category.as_str()).or_insert(0) += stored.size_bytes;
        }
        for item in &plan.to_fetch {
            *projected.entry(item.category.as_str()).or_insert(0) += item.size_bytes;
        }

        let total: u64 = projected.values().sum();
        if total > self.limits.ceiling_bytes {
            return remaining.into_iter().cloned().collect();
        }

        let overflowing: HashSet<&str> = projected
            .iter()
            .filter(|(category, bytes)| {
                self.limits
                    .sub_ceiling(category)
                    .is_some_and(|limit| **bytes > limit)
            })
            .map(|(category, _)| *category)
            .collect();

        remaining
            .into_iter()
            .filter(|s| overflowing.contains(s.category.as_str()))
            .cloned()
            .collect()
    }
}
