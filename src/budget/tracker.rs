// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage budget tracker.
//!
//! Admission control for content fetches: a fetch first [`reserve`]s its
//! size, then either [`commit`]s (fetch succeeded) or [`release`]s (fetch
//! failed or was cancelled). Evicted or deleted content is reported through
//! [`record_removal`].
//!
//! # Example
//!
//! ```
//! use festival_sync::{BudgetLimits, ManifestItem, Priority, StorageBudgetTracker};
//!
//! let tracker = StorageBudgetTracker::new(
//!     BudgetLimits::new(1_000).with_sub_ceiling("maps", 400),
//! );
//!
//! let tiles = ManifestItem::new("tiles", "maps", 300, Priority::High);
//! let reservation = tracker.reserve(&tiles).unwrap();
//! assert_eq!(tracker.used_bytes(), 300);
//! tracker.commit(reservation);
//!
//! // A second 300-byte map package breaks the maps sub-ceiling
//! let more_tiles = ManifestItem::new("tiles-2", "maps", 300, Priority::High);
//! let err = tracker.reserve(&more_tiles).unwrap_err();
//! assert_eq!(err.category_shortfall.unwrap().bytes, 200);
//! assert_eq!(tracker.used_bytes(), 300); // unchanged on failure
//! ```
//!
//! [`reserve`]: StorageBudgetTracker::reserve
//! [`commit`]: StorageBudgetTracker::commit
//! [`release`]: StorageBudgetTracker::release
//! [`record_removal`]: StorageBudgetTracker::record_removal

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use super::pressure::BudgetPressure;
use crate::content_item::{ManifestItem, StoredItem};

/// Global ceiling plus optional per-category ceilings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetLimits {
    pub ceiling_bytes: u64,
    pub sub_ceilings: HashMap<String, u64>,
}

impl BudgetLimits {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes,
            sub_ceilings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_sub_ceiling(mut self, category: impl Into<String>, bytes: u64) -> Self {
        self.sub_ceilings.insert(category.into(), bytes);
        self
    }

    #[must_use]
    pub fn with_sub_ceilings(mut self, sub_ceilings: HashMap<String, u64>) -> Self {
        self.sub_ceilings.extend(sub_ceilings);
        self
    }

    pub fn sub_ceiling(&self, category: &str) -> Option<u64> {
        self.sub_ceilings.get(category).copied()
    }
}

/// Bytes missing in one category's sub-budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryShortfall {
    pub category: String,
    pub bytes: u64,
}

/// Returned by [`StorageBudgetTracker::reserve`] when an item does not fit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("insufficient space for '{item_id}' ({requested} bytes): global shortfall {global_shortfall} bytes{}",
    category_suffix(.category_shortfall))]
pub struct InsufficientSpace {
    pub item_id: String,
    pub requested: u64,
    /// Bytes over the global ceiling (0 if the global budget fits)
    pub global_shortfall: u64,
    /// Bytes over the item's category ceiling, if any
    pub category_shortfall: Option<CategoryShortfall>,
}

impl InsufficientSpace {
    /// Largest of the global and category shortfalls.
    pub fn shortfall_bytes(&self) -> u64 {
        let category = self.category_shortfall.as_ref().map_or(0, |c| c.bytes);
        self.global_shortfall.max(category)
    }
}

fn category_suffix(shortfall: &Option<CategoryShortfall>) -> String {
    match shortfall {
        Some(c) => format!(", '{}' shortfall {} bytes", c.category, c.bytes),
        None => String::new(),
    }
}

/// A provisional claim on budget, pending the fetch outcome.
///
/// Must be handed back to exactly one of [`StorageBudgetTracker::commit`] or
/// [`StorageBudgetTracker::release`]. Not `Clone`, so it cannot be settled twice.
#[derive(Debug)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    token: u64,
    item_id: String,
    category: String,
    size_bytes: u64,
}

impl Reservation {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// Point-in-time view of the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSnapshot {
    pub used_bytes: u64,
    pub ceiling_bytes: u64,
    pub by_category: HashMap<String, u64>,
    pub outstanding_reservations: usize,
    pub pressure: BudgetPressure,
}

#[derive(Debug, Clone)]
struct Slot {
    category: String,
    size_bytes: u64,
}

#[derive(Debug)]
struct Pending {
    item_id: String,
    slot: Slot,
    /// Stored version this reservation replaces; restored on release
    superseded: Option<Slot>,
}

#[derive(Debug, Default)]
struct BudgetState {
    used: u64,
    by_category: HashMap<String, u64>,
    /// Stored items of the event being synced, keyed by item id
    stored: HashMap<String, Slot>,
    /// Stored items of other events on the device, keyed by (event id, item id)
    resident: HashMap<(String, String), Slot>,
    pending: HashMap<u64, Pending>,
    next_token: u64,
}

impl BudgetState {
    fn add(&mut self, slot: &Slot) {
        self.used = self.used.saturating_add(slot.size_bytes);
        *self.by_category.entry(slot.category.clone()).or_insert(0) += slot.size_bytes;
    }

    fn sub(&mut self, slot: &Slot) {
        self.used = self.used.saturating_sub(slot.size_bytes);
        if let Some(used) = self.by_category.get_mut(&slot.category) {
            *used = used.saturating_sub(slot.size_bytes);
            if *used == 0 {
                self.by_category.remove(&slot.category);
            }
        }
    }

    fn category_used(&self, category: &str) -> u64 {
        self.by_category.get(category).copied().unwrap_or(0)
    }

    fn recount(&mut self) {
        self.used = 0;
        self.by_category.clear();
        let slots: Vec<Slot> = self
            .stored
            .values()
            .chain(self.resident.values())
            .chain(self.pending.values().map(|p| &p.slot))
            .cloned()
            .collect();
        for slot in &slots {
            self.add(slot);
        }
    }
}

fn slot_of(item: &StoredItem) -> Slot {
    Slot {
        category: item.category.clone(),
        size_bytes: item.size_bytes,
    }
}

/// Tracks bytes used against a global ceiling and per-category ceilings.
///
/// # Thread Safety
///
/// All operations take a single internal lock, so a concurrent
/// [`used_bytes`](Self::used_bytes) never observes a half-applied update.
/// `used_bytes` always equals the sum of stored plus reserved sizes.
pub struct StorageBudgetTracker {
    limits: BudgetLimits,
    state: Mutex<BudgetState>,
}

impl StorageBudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(BudgetState::default()),
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.state.lock().used
    }

    #[must_use]
    pub fn category_used_bytes(&self, category: &str) -> u64 {
        self.state.lock().category_used(category)
    }

    /// Headroom for the global budget, or for a category.
    ///
    /// For a category with a sub-ceiling this is the smaller of the category
    /// headroom and the global headroom.
    #[must_use]
    pub fn available_bytes(&self, category: Option<&str>) -> u64 {
        let state = self.state.lock();
        let global = self.limits.ceiling_bytes.saturating_sub(state.used);
        match category.and_then(|c| self.limits.sub_ceiling(c).map(|limit| (c, limit))) {
            Some((category, limit)) => limit.saturating_sub(state.category_used(category)).min(global),
            None => global,
        }
    }

    /// Bytes used per category (stored plus reserved).
    #[must_use]
    pub fn usage_by_category(&self) -> HashMap<String, u64> {
        self.state.lock().by_category.clone()
    }

    #[must_use]
    pub fn outstanding_reservations(&self) -> usize {
        self.state.lock().pending.len()
    }

    #[must_use]
    pub fn is_stored(&self, item_id: &str) -> bool {
        self.state.lock().stored.contains_key(item_id)
    }

    #[must_use]
    pub fn pressure(&self) -> BudgetPressure {
        BudgetPressure::from_usage(self.used_bytes(), self.limits.ceiling_bytes)
    }

    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self.state.lock();
        BudgetSnapshot {
            used_bytes: state.used,
            ceiling_bytes: self.limits.ceiling_bytes,
            by_category: state.by_category.clone(),
            outstanding_reservations: state.pending.len(),
            pressure: BudgetPressure::from_usage(state.used, self.limits.ceiling_bytes),
        }
    }

    /// Claim budget for `item`.
    ///
    /// If a version of the item is already stored, its bytes are credited for
    /// as long as the reservation is pending. On failure nothing is mutated and
    /// the shortfall is reported.
    pub fn reserve(&self, item: &ManifestItem) -> Result<Reservation, InsufficientSpace> {
        let mut state = self.state.lock();

        let existing = state.stored.get(&item.id).cloned();
        let global_credit = existing.as_ref().map_or(0, |s| s.size_bytes);
        let projected = state.used.saturating_sub(global_credit).saturating_add(item.size_bytes);
        let global_shortfall = projected.saturating_sub(self.limits.ceiling_bytes);

        let category_shortfall = self.limits.sub_ceiling(&item.category).and_then(|limit| {
            let credit = existing
                .as_ref()
                .filter(|s| s.category == item.category)
                .map_or(0, |s| s.size_bytes);
            let projected = state
                .category_used(&item.category)
                .saturating_sub(credit)
                .saturating_add(item.size_bytes);
            let bytes = projected.saturating_sub(limit);
            (bytes > 0).then(|| CategoryShortfall {
                category: item.category.clone(),
                bytes,
            })
        });

        if global_shortfall > 0 || category_shortfall.is_some() {
            return Err(InsufficientSpace {
                item_id: item.id.clone(),
                requested: item.size_bytes,
                global_shortfall,
                category_shortfall,
            });
        }

        let superseded = state.stored.remove(&item.id);
        if let Some(ref old) = superseded {
            state.sub(old);
        }
        let slot = Slot {
            category: item.category.clone(),
            size_bytes: item.size_bytes,
        };
        state.add(&slot);

        let token = state.next_token;
        state.next_token += 1;
        state.pending.insert(
            token,
            Pending {
                item_id: item.id.clone(),
                slot,
                superseded,
            },
        );
        debug!(item_id = %item.id, bytes = item.size_bytes, used = state.used, "Budget reserved");

        Ok(Reservation {
            token,
            item_id: item.id.clone(),
            category: item.category.clone(),
            size_bytes: item.size_bytes,
        })
    }

    /// Finalize a reservation after a successful fetch.
    ///
    /// Counters were already applied by `reserve`; the item becomes stored.
    pub fn commit(&self, reservation: Reservation) {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.remove(&reservation.token) else {
            warn!(item_id = %reservation.item_id, "Commit for unknown reservation ignored");
            return;
        };
        if let Some(previous) = state.stored.insert(pending.item_id, pending.slot) {
            state.sub(&previous);
        }
    }

    /// Roll back a reservation after a failed or cancelled fetch.
    pub fn release(&self, reservation: Reservation) {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.remove(&reservation.token) else {
            warn!(item_id = %reservation.item_id, "Release for unknown reservation ignored");
            return;
        };
        state.sub(&pending.slot);
        if let Some(old) = pending.superseded {
            if !state.stored.contains_key(&pending.item_id) {
                state.add(&old);
                state.stored.insert(pending.item_id, old);
            }
        }
        debug!(item_id = %reservation.item_id, used = state.used, "Budget released");
    }

    /// Account for an evicted or deleted item. Returns the bytes freed.
    ///
    /// Uses the tracked size, so removing an untracked item is a no-op.
    pub fn record_removal(&self, item: &StoredItem) -> u64 {
        let mut state = self.state.lock();
        match state.stored.remove(&item.id) {
            Some(slot) => {
                state.sub(&slot);
                slot.size_bytes
            }
            None => 0,
        }
    }

    /// Rebuild the stored set from one event's items.
    ///
    /// Pending reservations are kept; counters are recomputed from scratch.
    /// Content of other events is forgotten; see
    /// [`hydrate_device`](Self::hydrate_device).
    pub fn hydrate(&self, items: &[StoredItem]) {
        let mut state = self.state.lock();
        let pending_ids: Vec<String> = state.pending.values().map(|p| p.item_id.clone()).collect();

        state.stored = items
            .iter()
            .filter(|i| !pending_ids.contains(&i.id))
            .map(|i| (i.id.clone(), slot_of(i)))
            .collect();
        state.resident.clear();
        state.recount();
        debug!(items = state.stored.len(), used = state.used, "Budget hydrated from local store");
    }

    /// Rebuild from every item on the device, with `event_id` as the event
    /// being synced.
    ///
    /// Items of other events count against the ceilings but are never
    /// credited by [`reserve`](Self::reserve).
    pub fn hydrate_device(&self, event_id: &str, items: &[(String, StoredItem)]) {
        let mut state = self.state.lock();
        let pending_ids: Vec<String> = state.pending.values().map(|p| p.item_id.clone()).collect();

        let mut stored = HashMap::new();
        let mut resident = HashMap::new();
        for (owner, item) in items {
            if owner == event_id {
                if !pending_ids.contains(&item.id) {
                    stored.insert(item.id.clone(), slot_of(item));
                }
            } else {
                resident.insert((owner.clone(), item.id.clone()), slot_of(item));
            }
        }
        state.stored = stored;
        state.resident = resident;
        state.recount();
        debug!(
            event_id,
            items = state.stored.len(),
            other_events_items = state.resident.len(),
            used = state.used,
            "Budget hydrated from device store"
        );
    }

    /// Account for an evicted item of another event. Returns the bytes freed.
    pub fn record_resident_removal(&self, event_id: &str, item_id: &str) -> u64 {
        let mut state = self.state.lock();
        match state.resident.remove(&(event_id.to_string(), item_id.to_string())) {
            Some(slot) => {
                state.sub(&slot);
                slot.size_bytes
            }
            None => 0,
        }
    }

    /// Bytes over the global ceiling and over each category ceiling.
    #[must_use]
    pub fn overage(&self) -> (u64, Vec<CategoryShortfall>) {
        let state = self.state.lock();
        let global = state.used.saturating_sub(self.limits.ceiling_bytes);
        let mut categories: Vec<CategoryShortfall> = self
            .limits
            .sub_ceilings
            .iter()
            .filter_map(|(category, limit)| {
                let bytes = state.category_used(category).saturating_sub(*limit);
                (bytes > 0).then(|| CategoryShortfall {
                    category: category.clone(),
                    bytes,
                })
            })
            .collect();
        categories.sort_by(|a, b| a.category.cmp(&b.category));
        (global, categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_item::Priority;
    use chrono::Utc;
    use std::sync::Arc;

    fn item(id: &str, category: &str, size: u64) -> ManifestItem {
        ManifestItem::new(id, category, size, Priority::Normal)
    }

    fn stored(id: &str, category: &str, size: u64) -> StoredItem {
        StoredItem::from_manifest(&item(id, category, size), Utc::now())
    }

    fn tracker() -> StorageBudgetTracker {
        StorageBudgetTracker::new(BudgetLimits::new(1_000).with_sub_ceiling("maps", 500))
    }

    #[test]
    fn test_reserve_and_commit() {
        let tracker = tracker();
        let r = tracker.reserve(&item("a", "info", 400)).unwrap();
        assert_eq!(tracker.used_bytes(), 400);
        assert_eq!(tracker.outstanding_reservations(), 1);

        tracker.commit(r);
        assert_eq!(tracker.used_bytes(), 400);
        assert_eq!(tracker.outstanding_reservations(), 0);
        assert!(tracker.is_stored("a"));
    }

    #[test]
    fn test_release_rolls_back() {
        let tracker = tracker();
        let r = tracker.reserve(&item("a", "maps", 300)).unwrap();
        assert_eq!(tracker.category_used_bytes("maps"), 300);

        tracker.release(r);
        assert_eq!(tracker.used_bytes(), 0);
        assert_eq!(tracker.category_used_bytes("maps"), 0);
        assert!(!tracker.is_stored("a"));
    }

    #[test]
    fn test_reserve_reports_global_shortfall_without_mutating() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("a", "info", 800)).unwrap());

        let err = tracker.reserve(&item("b", "info", 300)).unwrap_err();
        assert_eq!(err.global_shortfall, 100);
        assert!(err.category_shortfall.is_none());
        assert_eq!(tracker.used_bytes(), 800);
        assert_eq!(tracker.outstanding_reservations(), 0);
    }

    #[test]
    fn test_reserve_reports_category_shortfall() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("m1", "maps", 400)).unwrap());

        let err = tracker.reserve(&item("m2", "maps", 200)).unwrap_err();
        assert_eq!(err.global_shortfall, 0);
        assert_eq!(
            err.category_shortfall,
            Some(CategoryShortfall { category: "maps".into(), bytes: 100 })
        );
    }

    #[test]
    fn test_available_bytes_global_and_category() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("m1", "maps", 200)).unwrap());
        tracker.commit(tracker.reserve(&item("i1", "info", 600)).unwrap());

        assert_eq!(tracker.available_bytes(None), 200);
        // maps headroom is 300 but only 200 remains globally
        assert_eq!(tracker.available_bytes(Some("maps")), 200);
        // no sub-ceiling for info: global headroom
        assert_eq!(tracker.available_bytes(Some("info")), 200);
    }

    #[test]
    fn test_record_removal_frees_tracked_size() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("a", "maps", 300)).unwrap());

        assert_eq!(tracker.record_removal(&stored("a", "maps", 300)), 300);
        assert_eq!(tracker.used_bytes(), 0);
        assert!(tracker.usage_by_category().is_empty());

        // Removing again never goes negative
        assert_eq!(tracker.record_removal(&stored("a", "maps", 300)), 0);
        assert_eq!(tracker.used_bytes(), 0);
    }

    #[test]
    fn test_replacement_credits_existing_version() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("a", "info", 700)).unwrap());

        // New version is 900 bytes: fits only because the old 700 is credited
        let r = tracker.reserve(&item("a", "info", 900)).unwrap();
        assert_eq!(tracker.used_bytes(), 900);
        tracker.commit(r);
        assert_eq!(tracker.used_bytes(), 900);
        assert!(tracker.is_stored("a"));
    }

    #[test]
    fn test_replacement_release_restores_old_version() {
        let tracker = tracker();
        tracker.commit(tracker.reserve(&item("a", "info", 700)).unwrap());

        let r = tracker.reserve(&item("a", "info", 900)).unwrap();
        tracker.release(r);
        assert_eq!(tracker.used_bytes(), 700);
        assert!(tracker.is_stored("a"));
    }

    #[test]
    fn test_hydrate_rebuilds_counters() {
        let tracker = tracker();
        let pending = tracker.reserve(&item("p", "info", 100)).unwrap();

        tracker.hydrate(&[stored("a", "maps", 200), stored("b", "info", 300)]);
        assert_eq!(tracker.used_bytes(), 600);
        assert_eq!(tracker.category_used_bytes("maps"), 200);

        tracker.release(pending);
        assert_eq!(tracker.used_bytes(), 500);
    }

    #[test]
    fn test_hydrate_device_counts_other_events() {
        let tracker = tracker();
        tracker.hydrate_device(
            "burn",
            &[
                ("burn".to_string(), stored("a", "info", 100)),
                ("last-year".to_string(), stored("a", "maps", 400)),
                ("last-year".to_string(), stored("b", "info", 300)),
            ],
        );
        assert_eq!(tracker.used_bytes(), 800);
        assert_eq!(tracker.category_used_bytes("maps"), 400);
        assert!(tracker.is_stored("a"));

        // Same id in another event is not credited to this event's update
        let err = tracker.reserve(&item("a", "maps", 200)).unwrap_err();
        assert_eq!(err.global_shortfall, 0);
        assert_eq!(err.category_shortfall.map(|c| c.bytes), Some(100));
        assert_eq!(tracker.reserve(&item("c", "info", 300)).unwrap_err().global_shortfall, 100);

        assert_eq!(tracker.record_resident_removal("last-year", "a"), 400);
        assert_eq!(tracker.record_resident_removal("last-year", "a"), 0);
        assert_eq!(tracker.used_bytes(), 400);
        assert_eq!(tracker.category_used_bytes("maps"), 0);
        assert!(tracker.is_stored("a"));

        // Single-event hydration drops the other events again
        tracker.hydrate(&[stored("a", "info", 100)]);
        assert_eq!(tracker.used_bytes(), 100);
    }

    #[test]
    fn test_overage_after_hydrating_oversized_store() {
        let tracker = tracker();
        tracker.hydrate(&[stored("a", "maps", 700), stored("b", "info", 600)]);

        let (global, categories) = tracker.overage();
        assert_eq!(global, 300);
        assert_eq!(categories, vec![CategoryShortfall { category: "maps".into(), bytes: 200 }]);
    }

    #[test]
    fn test_pressure_follows_usage() {
        let tracker = tracker();
        assert_eq!(tracker.pressure(), BudgetPressure::Normal);
        tracker.commit(tracker.reserve(&item("a", "info", 960)).unwrap());
        assert_eq!(tracker.pressure(), BudgetPressure::Critical);
        assert_eq!(tracker.snapshot().pressure, BudgetPressure::Critical);
    }

    #[test]
    fn test_insufficient_space_display() {
        let err = InsufficientSpace {
            item_id: "tiles".into(),
            requested: 10,
            global_shortfall: 0,
            category_shortfall: Some(CategoryShortfall { category: "maps".into(), bytes: 4 }),
        };
        let msg = err.to_string();
        assert!(msg.contains("tiles"));
        assert!(msg.contains("'maps' shortfall 4 bytes"));
    }

    #[test]
    fn test_concurrent_reservations_never_overcommit() {
        let tracker = Arc::new(StorageBudgetTracker::new(BudgetLimits::new(1_000)));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    tracker.reserve(&item(&format!("item-{}", i), "info", 100)).ok()
                })
            })
            .collect();

        let granted: Vec<Reservation> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(granted.len(), 10);
        assert_eq!(tracker.used_bytes(), 1_000);

        for r in granted {
            tracker.release(r);
        }
        assert_eq!(tracker.used_bytes(), 0);
    }
}
