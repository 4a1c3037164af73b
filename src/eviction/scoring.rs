// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::content_item::{Priority, StoredItem};

/// Gap between adjacent priority weights. Must exceed the spread of the
/// non-priority terms (`recency_weight + usage_weight + size_penalty_weight`).
const PRIORITY_STEP: f64 = 100.0;

/// Weights for the non-priority terms of the retention score.
#[derive(Debug, Clone, PartialEq)]
pub struct EvictionWeights {
    /// Max bonus for an item used just now
    pub recency_weight: f64,
    /// Max bonus for an item used `usage_saturation` times or more
    pub usage_weight: f64,
    /// Penalty approaching this value as size grows past the baseline
    pub size_penalty_weight: f64,
    /// Half-life for recency decay (seconds)
    pub recency_half_life_secs: f64,
    /// Use count at which the usage bonus saturates
    pub usage_saturation: u64,
    /// Size at which half the size penalty applies
    pub size_baseline_bytes: u64,
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            recency_weight: 3.0,
            usage_weight: 3.0,
            size_penalty_weight: 2.0,
            recency_half_life_secs: 6.0 * 3600.0, // 6 hours
            usage_saturation: 100,
            size_baseline_bytes: 50_000_000, // 50 MB
        }
    }
}

/// Victims chosen for one eviction request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionPlan {
    /// Items to remove, in eviction order
    pub victims: Vec<StoredItem>,
    /// Sum of victim sizes
    pub bytes_freed: u64,
    /// Bytes the caller asked for
    pub target_bytes: u64,
    /// True when CRITICAL content had to be selected as a last resort
    pub critical_last_resort: bool,
}

impl EvictionWeights {
    /// Reject weights that would let recency, usage or size outrank priority.
    pub fn check(&self) -> Result<(), String> {
        let terms = [
            ("recency_weight", self.recency_weight),
            ("usage_weight", self.usage_weight),
            ("size_penalty_weight", self.size_penalty_weight),
        ];
        for (name, value) in terms {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a finite, non-negative number (got {})", name, value));
            }
        }
        let spread: f64 = terms.iter().map(|(_, v)| v).sum();
        if spread >= PRIORITY_STEP {
            return Err(format!(
                "recency_weight + usage_weight + size_penalty_weight ({}) must stay below the priority step ({})",
                spread, PRIORITY_STEP
            ));
        }
        if !self.recency_half_life_secs.is_finite() || self.recency_half_life_secs <= 0.0 {
            return Err(format!(
                "recency_half_life_secs must be a positive number (got {})",
                self.recency_half_life_secs
            ));
        }
        Ok(())
    }
}

impl EvictionPlan {
    /// Whether the victims free at least the requested bytes
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.bytes_freed >= self.target_bytes
    }

    pub fn victim_ids(&self) -> Vec<&str> {
        self.victims.iter().map(|v| v.id.as_str()).collect()
    }

    /// IDs of CRITICAL items in the plan
    pub fn critical_victims(&self) -> Vec<&str> {
        self.victims
            .iter()
            .filter(|v| v.priority == Priority::Critical)
            .map(|v| v.id.as_str())
            .collect()
    }
}

/// Retention scoring over stored items.
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicy {
    pub weights: EvictionWeights,
}

impl EvictionPolicy {
    pub fn new(weights: EvictionWeights) -> Self {
        Self { weights }
    }

    pub fn priority_weight(priority: Priority) -> f64 {
        priority as u8 as f64 * PRIORITY_STEP
    }

    /// Bonus in `[0, recency_weight]`, halving every half-life since last use.
    /// Items never used get no bonus.
    pub fn recency_bonus(&self, item: &StoredItem, now: DateTime<Utc>) -> f64 {
        let Some(last_used) = item.last_used_at else {
            return 0.0;
        };
        let idle_secs = (now - last_used).num_milliseconds().max(0) as f64 / 1000.0;
        let half_life = self.weights.recency_half_life_secs.max(1.0);
        self.weights.recency_weight * 0.5_f64.powf(idle_secs / half_life)
    }

    /// Bonus in `[0, usage_weight]`, log-scaled up to the saturation count
    pub fn usage_bonus(&self, item: &StoredItem) -> f64 {
        if item.use_count == 0 {
            return 0.0;
        }
        let saturation = self.weights.usage_saturation.max(1);
        let count = item.use_count.min(saturation) as f64;
        self.weights.usage_weight * (1.0 + count).ln() / (1.0 + saturation as f64).ln()
    }

    /// Penalty in `[0, size_penalty_weight)`, half at the baseline size
    pub fn size_penalty(&self, item: &StoredItem) -> f64 {
        let size = item.size_bytes as f64;
        let baseline = self.weights.size_baseline_bytes.max(1) as f64;
        self.weights.size_penalty_weight * size / (size + baseline)
    }

    /// Retention score: higher means keep longer.
    pub fn score(&self, item: &StoredItem, now: DateTime<Utc>) -> f64 {
        Self::priority_weight(item.priority) + self.recency_bonus(item, now) + self.usage_bonus(item)
            - self.size_penalty(item)
    }

    /// Choose victims that free at least `target_bytes`.
    ///
    /// Candidates in `protected_ids` are never chosen. Non-critical items are
    /// taken greedily from the lowest score up (ties: largest first). CRITICAL
    /// items are only added once non-critical candidates run out and nothing
    /// is protected; the plan is then flagged with `critical_last_resort`.
    ///
    /// The returned plan may free less than requested; check
    /// [`EvictionPlan::is_satisfied`].
    pub fn select_victims(
        &self,
        candidates: &[StoredItem],
        target_bytes: u64,
        protected_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> EvictionPlan {
        let eligible: Vec<&StoredItem> = candidates
            .iter()
            .filter(|c| !protected_ids.contains(&c.id))
            .collect();
        let selection = self.rank_victims(&eligible, target_bytes, protected_ids.is_empty(), now);

        EvictionPlan {
            victims: selection.indices.iter().map(|&i| eligible[i].clone()).collect(),
            bytes_freed: selection.bytes_freed,
            target_bytes,
            critical_last_resort: selection.critical_last_resort,
        }
    }

    /// Same selection as [`select_victims`](Self::select_victims) over
    /// already-filtered candidates, returning positions in `candidates`.
    ///
    /// For callers whose candidates are not unique by id, such as items of
    /// several events. `allow_critical` enables the CRITICAL last resort.
    pub fn rank_victims(
        &self,
        candidates: &[&StoredItem],
        target_bytes: u64,
        allow_critical: bool,
        now: DateTime<Utc>,
    ) -> VictimSelection {
        let mut selection = VictimSelection::default();
        if target_bytes == 0 {
            return selection;
        }

        let (critical, regular): (Vec<usize>, Vec<usize>) =
            (0..candidates.len()).partition(|&i| candidates[i].priority == Priority::Critical);

        self.take_lowest(&mut selection, candidates, regular, target_bytes, now);

        if selection.bytes_freed < target_bytes && allow_critical && !critical.is_empty() {
            let before = selection.indices.len();
            self.take_lowest(&mut selection, candidates, critical, target_bytes, now);
            if selection.indices.len() > before {
                selection.critical_last_resort = true;
                let ids: Vec<&str> = selection.indices[before..]
                    .iter()
                    .map(|&i| candidates[i].id.as_str())
                    .collect();
                warn!(target_bytes, critical = ?ids, "Eviction falling back to CRITICAL content");
            }
        }

        selection
    }

    fn take_lowest(
        &self,
        selection: &mut VictimSelection,
        candidates: &[&StoredItem],
        pool: Vec<usize>,
        target_bytes: u64,
        now: DateTime<Utc>,
    ) {
        let mut scored: Vec<(f64, usize)> = pool
            .into_iter()
            .map(|i| (self.score(candidates[i], now), i))
            .collect();

        scored.sort_by(|a, b| {
            let (x, y) = (candidates[a.1], candidates[b.1]);
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| y.size_bytes.cmp(&x.size_bytes))
                .then_with(|| x.id.cmp(&y.id))
        });

        for (_, i) in scored {
            if selection.bytes_freed >= target_bytes {
                break;
            }
            selection.bytes_freed = selection.bytes_freed.saturating_add(candidates[i].size_bytes);
            selection.indices.push(i);
        }
    }
}

/// Result of [`EvictionPolicy::rank_victims`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VictimSelection {
    /// Positions of the victims in the candidate slice, in eviction order
    pub indices: Vec<usize>,
    pub bytes_freed: u64,
    pub critical_last_resort: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const MB: u64 = 1_000_000;

    fn make_item(
        id: &str,
        priority: Priority,
        size_bytes: u64,
        idle: Option<Duration>,
        use_count: u64,
        now: DateTime<Utc>,
    ) -> StoredItem {
        StoredItem {
            id: id.to_string(),
            category: "info".to_string(),
            size_bytes,
            priority,
            checksum: String::new(),
            version: 1,
            last_used_at: idle.map(|d| now - d),
            use_count,
            stored_at: now - Duration::days(3),
        }
    }

    fn no_protection() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_evicts_old_low_priority_before_recent_high() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let a = make_item("A", Priority::Low, 100 * MB, Some(Duration::days(2)), 1, now);
        let b = make_item("B", Priority::High, 50 * MB, Some(Duration::minutes(5)), 10, now);

        let plan = policy.select_victims(&[a, b], 80 * MB, &no_protection(), now);

        assert_eq!(plan.victim_ids(), vec!["A"]);
        assert!(plan.bytes_freed >= 80 * MB);
        assert!(plan.is_satisfied());
        assert!(!plan.critical_last_resort);
    }

    #[test]
    fn test_priority_dominates_other_terms() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        // Hot, tiny LOW item vs cold, huge NORMAL item
        let hot_low = make_item("hot", Priority::Low, 1, Some(Duration::seconds(1)), 10_000, now);
        let cold_normal = make_item("cold", Priority::Normal, 900 * MB, None, 0, now);

        assert!(policy.score(&hot_low, now) < policy.score(&cold_normal, now));
    }

    #[test]
    fn test_recency_and_usage_raise_score() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let idle = make_item("idle", Priority::Normal, MB, Some(Duration::days(5)), 0, now);
        let fresh = make_item("fresh", Priority::Normal, MB, Some(Duration::minutes(1)), 0, now);
        let popular = make_item("popular", Priority::Normal, MB, Some(Duration::days(5)), 50, now);

        assert!(policy.score(&fresh, now) > policy.score(&idle, now));
        assert!(policy.score(&popular, now) > policy.score(&idle, now));
    }

    #[test]
    fn test_never_used_gets_no_recency_bonus() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let item = make_item("x", Priority::Low, MB, None, 0, now);
        assert_eq!(policy.recency_bonus(&item, now), 0.0);
        assert_eq!(policy.usage_bonus(&item), 0.0);
    }

    #[test]
    fn test_ties_broken_by_largest_size() {
        let now = Utc::now();
        let policy = EvictionPolicy::new(EvictionWeights {
            size_penalty_weight: 0.0,
            ..Default::default()
        });
        let small = make_item("small", Priority::Low, 10 * MB, None, 0, now);
        let large = make_item("large", Priority::Low, 60 * MB, None, 0, now);

        let plan = policy.select_victims(&[small, large], 50 * MB, &no_protection(), now);
        assert_eq!(plan.victim_ids(), vec!["large"]);
    }

    #[test]
    fn test_greedy_until_target_reached() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let items: Vec<_> = (0..5)
            .map(|i| make_item(&format!("i{}", i), Priority::Low, 30 * MB, Some(Duration::hours(i)), 0, now))
            .collect();

        let plan = policy.select_victims(&items, 70 * MB, &no_protection(), now);
        assert_eq!(plan.victims.len(), 3);
        assert_eq!(plan.bytes_freed, 90 * MB);
    }

    #[test]
    fn test_protected_items_excluded() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let a = make_item("A", Priority::Low, 100 * MB, None, 0, now);
        let b = make_item("B", Priority::Normal, 100 * MB, None, 0, now);
        let protected: HashSet<String> = ["A".to_string()].into();

        let plan = policy.select_victims(&[a, b], 50 * MB, &protected, now);
        assert_eq!(plan.victim_ids(), vec!["B"]);
    }

    #[test]
    fn test_critical_untouched_while_other_candidates_exist() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let critical = make_item("safety", Priority::Critical, 500 * MB, None, 0, now);
        let low = make_item("chat", Priority::Low, 10 * MB, Some(Duration::minutes(1)), 100, now);

        let plan = policy.select_victims(&[critical, low], 10 * MB, &no_protection(), now);
        assert_eq!(plan.victim_ids(), vec!["chat"]);
        assert!(!plan.critical_last_resort);
    }

    #[test]
    fn test_critical_last_resort_is_flagged() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let critical = make_item("safety", Priority::Critical, 500 * MB, None, 0, now);
        let low = make_item("chat", Priority::Low, 10 * MB, None, 0, now);

        let plan = policy.select_victims(&[critical, low], 100 * MB, &no_protection(), now);
        assert_eq!(plan.victim_ids(), vec!["chat", "safety"]);
        assert!(plan.critical_last_resort);
        assert_eq!(plan.critical_victims(), vec!["safety"]);
    }

    #[test]
    fn test_critical_never_selected_when_something_is_protected() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let critical = make_item("safety", Priority::Critical, 500 * MB, None, 0, now);
        let protected: HashSet<String> = ["in-flight".to_string()].into();

        let plan = policy.select_victims(&[critical], 100 * MB, &protected, now);
        assert!(plan.victims.is_empty());
        assert!(!plan.is_satisfied());
        assert!(!plan.critical_last_resort);
    }

    #[test]
    fn test_rank_victims_keeps_same_id_candidates_apart() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        // One id stored under two events: the older, lower-priority copy goes
        let this_year = make_item("map", Priority::High, 40 * MB, Some(Duration::hours(1)), 3, now);
        let last_year = make_item("map", Priority::Low, 40 * MB, None, 0, now);
        let candidates = [&this_year, &last_year];

        let selection = policy.rank_victims(&candidates, 10 * MB, false, now);
        assert_eq!(selection.indices, vec![1]);
        assert_eq!(selection.bytes_freed, 40 * MB);
        assert!(!selection.critical_last_resort);
    }

    #[test]
    fn test_rank_victims_critical_needs_permission() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let critical = make_item("safety", Priority::Critical, 50 * MB, None, 0, now);

        assert!(policy.rank_victims(&[&critical], 10 * MB, false, now).indices.is_empty());
        let selection = policy.rank_victims(&[&critical], 10 * MB, true, now);
        assert_eq!(selection.indices, vec![0]);
        assert!(selection.critical_last_resort);
    }

    #[test]
    fn test_weight_check_guards_priority_dominance() {
        assert!(EvictionWeights::default().check().is_ok());

        let loud = EvictionWeights { recency_weight: 500.0, ..Default::default() };
        assert!(loud.check().unwrap_err().contains("priority step"));

        let at_step = EvictionWeights {
            recency_weight: 50.0,
            usage_weight: 48.0,
            size_penalty_weight: 2.0,
            ..Default::default()
        };
        assert!(at_step.check().is_err());

        let negative = EvictionWeights { usage_weight: -1.0, ..Default::default() };
        assert!(negative.check().unwrap_err().contains("usage_weight"));

        let nan = EvictionWeights { size_penalty_weight: f64::NAN, ..Default::default() };
        assert!(nan.check().is_err());
    }

    #[test]
    fn test_zero_target_selects_nothing() {
        let now = Utc::now();
        let policy = EvictionPolicy::default();
        let a = make_item("A", Priority::Low, MB, None, 0, now);
        let plan = policy.select_victims(&[a], 0, &no_protection(), now);
        assert!(plan.victims.is_empty());
        assert!(plan.is_satisfied());
    }
}
