// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Festival sync walkthrough.
//!
//! Demonstrates:
//! 1. A 2 GB device budget with a 500 MB maps sub-ceiling
//! 2. A full sync where the low-priority chat archive does not fit
//! 3. Eviction making room for a new HIGH item
//! 4. An incremental sync from the server delta
//! 5. Displaying metrics (OTEL-compatible)
//!
//! Runs entirely in memory: the manifest server and the downloader are
//! simulated, nothing touches the network or disk.
//!
//! # Run
//!
//! ```bash
//! cargo run --example festival_demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use festival_sync::{
    Change, CoalescingManifestSource, ContentFetcher, FetchError, FetchedContent, InMemoryStore, Manifest,
    ManifestItem, ManifestSource, Priority, SourceError, SyncConfig, SyncOrchestrator,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use parking_lot::Mutex;

const EVENT: &str = "burn-2026";
const MB: u64 = 1_000_000;

/// Manifest server stand-in.
#[derive(Default)]
struct DemoServer {
    items: Mutex<Vec<ManifestItem>>,
    changes: Mutex<Vec<Change>>,
}

#[async_trait]
impl ManifestSource for DemoServer {
    async fn get_manifest(&self, event_id: &str, _force_refresh: bool) -> Result<Manifest, SourceError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Manifest::new(event_id, self.items.lock().clone()))
    }

    async fn get_incremental_changes(
        &self,
        _event_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Change>, SourceError> {
        Ok(std::mem::take(&mut *self.changes.lock()))
    }
}

/// Downloader stand-in: "transfers" at roughly 1 GB/s.
struct DemoFetcher;

#[async_trait]
impl ContentFetcher for DemoFetcher {
    async fn fetch(&self, _event_id: &str, item: &ManifestItem) -> Result<FetchedContent, FetchError> {
        tokio::time::sleep(Duration::from_millis(item.size_bytes / MB)).await;
        Ok(FetchedContent {
            bytes_written: item.size_bytes,
            checksum: item.checksum.clone(),
        })
    }
}

fn entry(id: &str, category: &str, mb: u64, priority: Priority, title: &str) -> ManifestItem {
    ManifestItem::new(id, category, mb * MB, priority)
        .with_checksum(format!("sha256:{id}"))
        .with_title(title)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           festival-sync: Offline Content Walkthrough          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure the orchestrator
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Configuring orchestrator...");

    let config = SyncConfig {
        manifest_cache_ttl_secs: 60,
        ..Default::default()
    };
    println!("   └─ Ceiling: {} MB", config.ceiling_bytes / MB);
    for (category, bytes) in &config.sub_ceilings {
        println!("   └─ Sub-ceiling {}: {} MB", category, bytes / MB);
    }

    let server = Arc::new(DemoServer::default());
    *server.items.lock() = vec![
        entry("safety", "safety", 100, Priority::Critical, "Safety & medical guide"),
        entry("maps", "maps", 200, Priority::High, "Playa map tiles"),
        entry("schedule", "schedule", 5, Priority::High, "Event schedule"),
        entry("art", "media", 150, Priority::Normal, "Art tour photos"),
        entry("chat", "chat", 1_800, Priority::Low, "Chat archive"),
        entry("drone", "maps", 700, Priority::Normal, "Drone flyover tiles"),
    ];

    let source = Arc::new(CoalescingManifestSource::new(
        ServerHandle(server.clone()),
        config.manifest_cache_ttl(),
    ));
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = SyncOrchestrator::new(config, store, source, Arc::new(DemoFetcher))?;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Full sync with live progress
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚀 Starting full sync for {EVENT}...");

    let mut stream = orchestrator.start_full_sync(EVENT, false, None)?;
    let mut report = None;
    while let Some(progress) = stream.next_progress().await {
        println!(
            "   └─ [{}] {}/{} {} ({} MB used)",
            progress.status.as_str(),
            progress.completed_items,
            progress.total_items.map_or("?".to_string(), |t| t.to_string()),
            progress.current_item_description.as_deref().unwrap_or(""),
            progress.storage_used_bytes / MB,
        );
        if progress.report.is_some() {
            report = progress.report;
        }
    }

    if let Some(report) = &report {
        println!("\n📋 Run report ({}):", report.status.as_str());
        for (id, outcome) in &report.outcomes {
            println!("   └─ {id}: {outcome:?}");
        }
        println!("   ⚠️  Partial: {}", report.is_partial());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Budget usage
    // ─────────────────────────────────────────────────────────────────────────
    print_budget(&orchestrator);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. New HIGH item forces eviction of stale NORMAL content
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📰 Organisers publish a 1.6 GB HIGH priority livestream cache...");
    orchestrator.record_access(EVENT, "safety").await?;
    orchestrator.record_access(EVENT, "maps").await?;

    *server.changes.lock() = vec![Change::Upsert(entry(
        "stream",
        "media",
        1_600,
        Priority::High,
        "Livestream cache",
    ))];

    let report = orchestrator
        .start_incremental_sync(EVENT, None)?
        .finish()
        .await
        .ok_or("incremental run produced no report")?;
    println!("   └─ Status: {}", report.status.as_str());
    println!("   └─ Completed: {:?}", report.completed_item_ids);
    println!("   └─ Evicted: {:?}", report.evicted_item_ids);
    println!("   └─ Skipped: {:?}", report.skipped_item_ids);
    if !report.critical_evictions.is_empty() {
        println!("   └─ ⚠️  CRITICAL evicted: {:?}", report.critical_evictions);
    }
    print_budget(&orchestrator);

    if let Some(last) = orchestrator.last_sync_timestamp(EVENT).await? {
        println!("\n🕒 Last successful sync: {last}");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Dump raw metrics (OTEL-compatible)
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics (OTEL export format):");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Walkthrough complete!                      ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Lets the demo keep a handle on the server while the coalescer owns one.
struct ServerHandle(Arc<DemoServer>);

#[async_trait]
impl ManifestSource for ServerHandle {
    async fn get_manifest(&self, event_id: &str, force_refresh: bool) -> Result<Manifest, SourceError> {
        self.0.get_manifest(event_id, force_refresh).await
    }

    async fn get_incremental_changes(
        &self,
        event_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Change>, SourceError> {
        self.0.get_incremental_changes(event_id, since).await
    }
}

fn print_budget(orchestrator: &SyncOrchestrator) {
    let snapshot = orchestrator.budget_snapshot();
    println!("\n📊 Storage Budget:");
    println!(
        "   ┌─ Used: {} / {} MB ({:?})",
        snapshot.used_bytes / MB,
        snapshot.ceiling_bytes / MB,
        snapshot.pressure
    );
    let mut categories: Vec<_> = snapshot.by_category.into_iter().collect();
    categories.sort();
    for (category, bytes) in categories {
        println!("   │  └─ {category}: {} MB", bytes / MB);
    }
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    gauges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    histograms.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges (current value)");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms (distributions)");
        for (name, labels, count, avg) in &histograms {
            println!("   │  └─ {}{} count={} avg={:.4}", name, labels, count, avg);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
