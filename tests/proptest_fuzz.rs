//! Property-based tests for budget accounting and manifest diffing.
//!
//! Uses proptest to generate random operation sequences and manifests and
//! checks the invariants that must hold for every input.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use proptest::prelude::*;

use festival_sync::{
    BudgetLimits, EvictionPolicy, EvictionWeights, ManifestDiffer, ManifestItem, Priority, Reservation,
    StorageBudgetTracker, StoredItem,
};

const CEILING: u64 = 1_000;
const MAPS_CEILING: u64 = 400;

// =============================================================================
// Strategies for generating test data
// =============================================================================

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

fn category_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just("maps".to_string()), Just("schedule".to_string()), Just("media".to_string())]
}

fn manifest_item_strategy() -> impl Strategy<Value = ManifestItem> {
    ("[a-e]{1,2}", category_strategy(), 0u64..1_200, priority_strategy(), 1u64..3)
        .prop_map(|(id, category, size, priority, version)| {
            ManifestItem::new(id, category, size, priority).with_version(version)
        })
}

#[derive(Debug, Clone)]
enum Op {
    Reserve(ManifestItem),
    CommitOldest,
    ReleaseNewest,
    Remove(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => manifest_item_strategy().prop_map(Op::Reserve),
        2 => Just(Op::CommitOldest),
        2 => Just(Op::ReleaseNewest),
        1 => (0usize..8).prop_map(Op::Remove),
    ]
}

fn limits() -> BudgetLimits {
    BudgetLimits::new(CEILING).with_sub_ceiling("maps", MAPS_CEILING)
}

// =============================================================================
// Budget invariant
// =============================================================================

proptest! {
    /// used_bytes always equals stored + reserved and never exceeds a ceiling
    #[test]
    fn prop_budget_used_matches_stored_plus_reserved(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let tracker = StorageBudgetTracker::new(limits());
        let mut pending: Vec<(Reservation, ManifestItem)> = Vec::new();
        // Model: id → (category, size) of what the tracker should count
        let mut stored: HashMap<String, (String, u64)> = HashMap::new();

        for op in ops {
            match op {
                Op::Reserve(item) => {
                    // One pending reservation per id keeps the model simple
                    if pending.iter().any(|(_, p)| p.id == item.id) {
                        continue;
                    }
                    if let Ok(reservation) = tracker.reserve(&item) {
                        pending.push((reservation, item));
                    }
                }
                Op::CommitOldest => {
                    if !pending.is_empty() {
                        let (reservation, item) = pending.remove(0);
                        tracker.commit(reservation);
                        stored.insert(item.id.clone(), (item.category.clone(), item.size_bytes));
                    }
                }
                Op::ReleaseNewest => {
                    if let Some((reservation, _)) = pending.pop() {
                        tracker.release(reservation);
                    }
                }
                Op::Remove(index) => {
                    let mut ids: Vec<String> = stored.keys().cloned().collect();
                    ids.sort();
                    if ids.is_empty() || pending.iter().any(|(_, p)| p.id == ids[index % ids.len()]) {
                        continue;
                    }
                    let id = ids[index % ids.len()].clone();
                    let (category, size) = stored.remove(&id).unwrap();
                    let record = StoredItem::from_manifest(
                        &ManifestItem::new(id, category, size, Priority::Low),
                        Utc::now(),
                    );
                    prop_assert_eq!(tracker.record_removal(&record), size);
                }
            }

            // Pending replacements credit the stored version they replace
            let pending_ids: HashSet<&str> = pending.iter().map(|(_, p)| p.id.as_str()).collect();
            let stored_bytes: u64 = stored
                .iter()
                .filter(|(id, _)| !pending_ids.contains(id.as_str()))
                .map(|(_, (_, size))| *size)
                .sum();
            let reserved_bytes: u64 = pending.iter().map(|(_, p)| p.size_bytes).sum();

            prop_assert_eq!(tracker.used_bytes(), stored_bytes + reserved_bytes);
            prop_assert!(tracker.used_bytes() <= CEILING);
            prop_assert!(tracker.category_used_bytes("maps") <= MAPS_CEILING);
            prop_assert_eq!(tracker.outstanding_reservations(), pending.len());
        }

        for (reservation, _) in pending.drain(..) {
            tracker.release(reservation);
        }
        let stored_bytes: u64 = stored.values().map(|(_, size)| *size).sum();
        prop_assert_eq!(tracker.used_bytes(), stored_bytes);
    }
}

// =============================================================================
// Diff ordering and idempotence
// =============================================================================

proptest! {
    /// to_fetch is sorted priority desc, size asc
    #[test]
    fn prop_diff_orders_by_priority_then_size(items in prop::collection::vec(manifest_item_strategy(), 0..30)) {
        let differ = ManifestDiffer::new(limits());
        let plan = differ.diff(&items, &[], false);

        for pair in plan.to_fetch.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(a.priority > b.priority || (a.priority == b.priority && a.size_bytes <= b.size_bytes));
        }
        for item in &plan.to_fetch {
            prop_assert!(differ.check_fits(item).is_ok());
        }
    }

    /// Every distinct manifest id lands in exactly one bucket
    #[test]
    fn prop_diff_partitions_manifest(items in prop::collection::vec(manifest_item_strategy(), 0..30)) {
        let differ = ManifestDiffer::new(limits());
        let plan = differ.diff(&items, &[], false);

        let distinct: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
        let bucketed = plan.to_fetch.len() + plan.unchanged.len() + plan.unfetchable.len();
        prop_assert_eq!(bucketed, distinct.len());
    }

    /// Storing everything fetchable, then diffing again, yields nothing to do
    #[test]
    fn prop_diff_idempotent_after_sync(items in prop::collection::vec(manifest_item_strategy(), 0..30)) {
        let differ = ManifestDiffer::new(limits());
        let first = differ.diff(&items, &[], false);
        let local: Vec<StoredItem> = first
            .to_fetch
            .iter()
            .map(|i| StoredItem::from_manifest(i, Utc::now()))
            .collect();

        let second = differ.diff(&items, &local, false);
        let third = differ.diff(&items, &local, false);

        prop_assert!(second.to_fetch.is_empty());
        prop_assert!(second.to_delete.is_empty());
        prop_assert_eq!(second, third);
    }
}

// =============================================================================
// Eviction selection
// =============================================================================

fn stored_strategy() -> impl Strategy<Value = StoredItem> {
    ("[a-z]{1,6}", 1u64..500, priority_strategy(), 0u64..20).prop_map(|(id, size, priority, uses)| {
        let mut item = StoredItem::from_manifest(&ManifestItem::new(id, "media", size, priority), Utc::now());
        item.use_count = uses;
        item
    })
}

proptest! {
    /// CRITICAL victims appear only when every other candidate is taken
    #[test]
    fn prop_eviction_critical_only_as_last_resort(
        candidates in prop::collection::vec(stored_strategy(), 0..20),
        target in 1u64..3_000,
    ) {
        let policy = EvictionPolicy::new(EvictionWeights::default());
        let plan = policy.select_victims(&candidates, target, &HashSet::new(), Utc::now());

        let has_critical = plan.victims.iter().any(|v| v.priority == Priority::Critical);
        prop_assert_eq!(has_critical, plan.critical_last_resort);
        if has_critical {
            let non_critical = candidates.iter().filter(|c| c.priority != Priority::Critical).count();
            let taken = plan.victims.iter().filter(|v| v.priority != Priority::Critical).count();
            prop_assert_eq!(non_critical, taken);
        }
        prop_assert_eq!(plan.bytes_freed, plan.victims.iter().map(|v| v.size_bytes).sum::<u64>());
    }

    /// Protected ids are never chosen
    #[test]
    fn prop_eviction_respects_protected(
        candidates in prop::collection::vec(stored_strategy(), 1..20),
        target in 1u64..3_000,
    ) {
        let protected: HashSet<String> = candidates.iter().step_by(2).map(|c| c.id.clone()).collect();
        let policy = EvictionPolicy::new(EvictionWeights::default());
        let plan = policy.select_victims(&candidates, target, &protected, Utc::now());

        prop_assert!(plan.victims.iter().all(|v| !protected.contains(&v.id)));
        prop_assert!(!plan.critical_last_resort);
    }
}
