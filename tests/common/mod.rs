//! Scripted collaborators shared by the integration tests.
//!
//! - [`ScriptedSource`]: manifest / delta with injectable failures
//! - [`ScriptedFetcher`]: records call order, fails, hangs or lies about checksums
//! - [`FailingStore`]: wraps [`InMemoryStore`] and fails chosen operations

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use festival_sync::{
    Change, ConcurrentStartPolicy, ContentFetcher, FetchError, FetchedContent, InMemoryStore, LocalStore,
    Manifest, ManifestItem, ManifestSource, Priority, SourceError, StorageError, StoredItem, SyncConfig,
    SyncOrchestrator, SyncRun,
};

pub const EVENT: &str = "burn-2026";

pub const MB: u64 = 1_000_000;

/// Fast retries, no sub-ceilings.
pub fn test_config(ceiling_bytes: u64) -> SyncConfig {
    SyncConfig {
        ceiling_bytes,
        sub_ceilings: HashMap::new(),
        manifest_retry_initial_ms: 1,
        manifest_retry_max_ms: 5,
        item_retry_initial_ms: 1,
        ..Default::default()
    }
}

pub fn queued(mut config: SyncConfig) -> SyncConfig {
    config.concurrent_start = ConcurrentStartPolicy::Queue;
    config
}

pub fn item(id: &str, category: &str, size: u64, priority: Priority) -> ManifestItem {
    ManifestItem::new(id, category, size, priority)
}

/// Local copy of `item` as if fetched at `at`.
pub fn stored(item: &ManifestItem, at: DateTime<Utc>) -> StoredItem {
    StoredItem::from_manifest(item, at)
}

// =============================================================================
// Manifest source
// =============================================================================

pub struct ScriptedSource {
    items: Mutex<Vec<ManifestItem>>,
    changes: Mutex<Vec<Change>>,
    /// Remaining calls that fail with a network error
    failures: AtomicUsize,
    parse_error: AtomicBool,
    pub manifest_calls: AtomicUsize,
    pub delta_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(items: Vec<ManifestItem>) -> Self {
        Self {
            items: Mutex::new(items),
            changes: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            parse_error: AtomicBool::new(false),
            manifest_calls: AtomicUsize::new(0),
            delta_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_items(&self, items: Vec<ManifestItem>) {
        *self.items.lock() = items;
    }

    pub fn set_changes(&self, changes: Vec<Change>) {
        *self.changes.lock() = changes;
    }

    pub fn fail_next(&self, calls: usize) {
        self.failures.store(calls, Ordering::SeqCst);
    }

    pub fn fail_parse(&self) {
        self.parse_error.store(true, Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<(), SourceError> {
        if self.parse_error.load(Ordering::SeqCst) {
            return Err(SourceError::Parse("unexpected token".into()));
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Network("no signal on the playa".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ManifestSource for ScriptedSource {
    async fn get_manifest(&self, event_id: &str, _force_refresh: bool) -> Result<Manifest, SourceError> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(Manifest::new(event_id, self.items.lock().clone()))
    }

    async fn get_incremental_changes(
        &self,
        _event_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Change>, SourceError> {
        self.delta_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        Ok(self.changes.lock().clone())
    }
}

// =============================================================================
// Content fetcher
// =============================================================================

#[derive(Default)]
pub struct ScriptedFetcher {
    /// Every fetch attempt, in call order
    calls: Mutex<Vec<String>>,
    discarded: Mutex<Vec<String>>,
    /// Remaining failures per item id
    failures: Mutex<HashMap<String, usize>>,
    /// Items whose fetch never completes
    hangs: Mutex<HashSet<String>>,
    /// Checksum to report instead of the manifest's
    checksums: Mutex<HashMap<String, String>>,
    /// Notified when a hanging fetch begins
    pub hang_started: Notify,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, id: &str, times: usize) -> &Self {
        self.failures.lock().insert(id.to_string(), times);
        self
    }

    pub fn hang(&self, id: &str) -> &Self {
        self.hangs.lock().insert(id.to_string());
        self
    }

    pub fn report_checksum(&self, id: &str, checksum: &str) -> &Self {
        self.checksums.lock().insert(id.to_string(), checksum.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, id: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == id).count()
    }

    pub fn discarded(&self) -> Vec<String> {
        self.discarded.lock().clone()
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, _event_id: &str, item: &ManifestItem) -> Result<FetchedContent, FetchError> {
        self.calls.lock().push(item.id.clone());

        let hangs = self.hangs.lock().contains(&item.id);
        if hangs {
            self.hang_started.notify_one();
            std::future::pending::<()>().await;
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&item.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Transport(format!("connection reset fetching {}", item.id)));
                }
            }
        }

        let checksum = self
            .checksums
            .lock()
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| item.checksum.clone());
        Ok(FetchedContent {
            bytes_written: item.size_bytes,
            checksum,
        })
    }

    async fn discard(&self, _event_id: &str, item: &ManifestItem) -> Result<(), FetchError> {
        self.discarded.lock().push(item.id.clone());
        Ok(())
    }
}

// =============================================================================
// Failing store
// =============================================================================

/// Which [`LocalStore`] operations should fail.
#[derive(Default)]
pub struct StoreFaults {
    pub list: AtomicBool,
    pub put: AtomicBool,
    pub delete: AtomicBool,
    pub set_last_sync: AtomicBool,
}

pub struct FailingStore {
    pub inner: InMemoryStore,
    pub faults: StoreFaults,
}

impl FailingStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            faults: StoreFaults::default(),
        }
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Backend(format!("disk I/O error during {}", op)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LocalStore for FailingStore {
    async fn list_items(&self, event_id: &str) -> Result<Vec<StoredItem>, StorageError> {
        Self::check(&self.faults.list, "list")?;
        self.inner.list_items(event_id).await
    }

    async fn list_all_items(&self) -> Result<Vec<(String, StoredItem)>, StorageError> {
        Self::check(&self.faults.list, "list")?;
        self.inner.list_all_items().await
    }

    async fn get_item(&self, event_id: &str, id: &str) -> Result<Option<StoredItem>, StorageError> {
        self.inner.get_item(event_id, id).await
    }

    async fn put_item(&self, event_id: &str, item: &StoredItem) -> Result<(), StorageError> {
        Self::check(&self.faults.put, "put")?;
        self.inner.put_item(event_id, item).await
    }

    async fn delete_item(&self, event_id: &str, id: &str) -> Result<(), StorageError> {
        Self::check(&self.faults.delete, "delete")?;
        self.inner.delete_item(event_id, id).await
    }

    async fn last_sync(&self, event_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.last_sync(event_id).await
    }

    async fn set_last_sync(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        Self::check(&self.faults.set_last_sync, "set_last_sync")?;
        self.inner.set_last_sync(event_id, at).await
    }

    async fn last_run(&self, event_id: &str) -> Result<Option<SyncRun>, StorageError> {
        self.inner.last_run(event_id).await
    }

    async fn save_run(&self, run: &SyncRun) -> Result<(), StorageError> {
        self.inner.save_run(run).await
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub orchestrator: SyncOrchestrator,
    pub store: Arc<InMemoryStore>,
    pub source: Arc<ScriptedSource>,
    pub fetcher: Arc<ScriptedFetcher>,
}

impl Harness {
    pub fn new(config: SyncConfig, store: InMemoryStore, manifest: Vec<ManifestItem>) -> Self {
        let store = Arc::new(store);
        let source = Arc::new(ScriptedSource::new(manifest));
        let fetcher = Arc::new(ScriptedFetcher::new());
        let orchestrator = SyncOrchestrator::new(config, store.clone(), source.clone(), fetcher.clone())
            .expect("valid test config");
        Self {
            orchestrator,
            store,
            source,
            fetcher,
        }
    }
}
