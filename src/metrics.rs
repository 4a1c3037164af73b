// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for festival-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host app is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `festival_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for sizes
//!
//! # Labels
//! - `status`: completed, failed, cancelled
//! - `outcome`: completed, failed, skipped, unfetchable, deferred
//! - `reason`: eviction cause (admission, reconcile)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a finished run
pub fn record_run(status: &str) {
    counter!(
        "festival_sync_runs_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record run wall-clock duration
pub fn record_run_duration(duration: Duration) {
    histogram!("festival_sync_run_seconds").record(duration.as_secs_f64());
}

/// Record one item's outcome
pub fn record_item_outcome(outcome: &str) {
    counter!(
        "festival_sync_items_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record item fetch latency (all attempts)
pub fn record_fetch_latency(duration: Duration) {
    histogram!("festival_sync_fetch_seconds").record(duration.as_secs_f64());
}

/// Record bytes admitted into the store
pub fn record_fetched_bytes(bytes: u64) {
    counter!("festival_sync_fetched_bytes_total").increment(bytes);
}

/// Record eviction event
pub fn record_eviction(count: usize, bytes: u64, reason: &str) {
    counter!(
        "festival_sync_evictions_total",
        "reason" => reason.to_string()
    )
    .increment(count as u64);
    counter!(
        "festival_sync_evicted_bytes_total",
        "reason" => reason.to_string()
    )
    .increment(bytes);
}

/// Record CRITICAL content evicted as a last resort
pub fn record_critical_eviction(count: usize) {
    counter!("festival_sync_critical_evictions_total").increment(count as u64);
}

/// Record a manifest or delta retrieval failure
pub fn record_manifest_error(kind: &str) {
    counter!(
        "festival_sync_manifest_errors_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set bytes used against the global ceiling
pub fn set_storage_used_bytes(bytes: u64) {
    gauge!("festival_sync_storage_used_bytes").set(bytes as f64);
}

/// Set bytes used by one category
pub fn set_category_bytes(category: &str, bytes: u64) {
    gauge!(
        "festival_sync_category_used_bytes",
        "category" => category.to_string()
    )
    .set(bytes as f64);
}

/// Set budget pressure level (0 = Normal ... 4 = Full)
pub fn set_budget_pressure(level: u8) {
    gauge!("festival_sync_budget_pressure").set(level as f64);
}

/// Track the current run state
pub fn set_run_state(state: &str) {
    let states = ["idle", "syncing", "paused", "completed", "failed", "cancelled"];
    for s in states {
        gauge!(
            "festival_sync_run_state",
            "state" => s.to_string()
        )
        .set(if s == state { 1.0 } else { 0.0 });
    }
}

/// A timing guard that records fetch latency on drop
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_fetch_latency(self.start.elapsed());
    }
}
