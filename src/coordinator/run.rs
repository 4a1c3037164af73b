// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run execution: budget hydration, planning, the per-item loop, stale
//! deletions and finalization.
//!
//! Budget decisions are serialized by running the item loop on a single
//! task. Only the byte transfer of the current item races against the
//! cancellation signal.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::budget::{BudgetPressure, CategoryShortfall, InsufficientSpace};
use crate::content_item::{Change, Manifest, ManifestItem, Priority, StoredItem};
use crate::diff::{SyncPlan, Unfetchable};
use crate::eviction::EvictionPolicy;
use crate::remote::{FetchError, FetchedContent, SourceError};
use crate::resilience::retry::retry_if;
use crate::storage::traits::StorageError;

use super::progress::ProgressEmitter;
use super::types::{ItemFailure, ItemOutcome, RunKind, SyncError, SyncProgress, SyncReport, SyncRun, SyncStatus};
use super::{Inner, RunSignal};

/// What the caller asked for, before the store is consulted.
#[derive(Debug, Clone)]
pub(super) enum RunRequest {
    Full {
        force_refresh: bool,
        priority_hint: Option<Priority>,
    },
    /// `None` means "since the stored last-sync timestamp"
    Incremental { since: Option<DateTime<Utc>> },
}

/// Mutable bookkeeping for one run.
struct RunLedger {
    run: SyncRun,
    total: Option<usize>,
    outcomes: Vec<(String, ItemOutcome)>,
    completed: Vec<String>,
    failed: Vec<ItemFailure>,
    skipped: Vec<String>,
    unfetchable: Vec<Unfetchable>,
    deferred: Vec<String>,
    deleted: Vec<String>,
    evicted: Vec<String>,
    evicted_elsewhere: Vec<(String, String)>,
    critical_evictions: Vec<String>,
    /// Items fetched by this run; never evicted to make room for later items
    admitted: HashSet<String>,
}

impl RunLedger {
    fn new(run: SyncRun) -> Self {
        Self {
            run,
            total: None,
            outcomes: Vec::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            unfetchable: Vec::new(),
            deferred: Vec::new(),
            deleted: Vec::new(),
            evicted: Vec::new(),
            evicted_elsewhere: Vec::new(),
            critical_evictions: Vec::new(),
            admitted: HashSet::new(),
        }
    }

    fn record(&mut self, item_id: &str, outcome: ItemOutcome) {
        crate::metrics::record_item_outcome(outcome.as_str());
        match &outcome {
            ItemOutcome::Completed => self.completed.push(item_id.to_string()),
            ItemOutcome::Failed { error, retry_eligible } => self.failed.push(ItemFailure {
                item_id: item_id.to_string(),
                error: error.clone(),
                retry_eligible: *retry_eligible,
            }),
            ItemOutcome::SkippedInsufficientStorage { .. } => self.skipped.push(item_id.to_string()),
            ItemOutcome::Deferred => self.deferred.push(item_id.to_string()),
            // Full entry goes to `unfetchable` alongside
            ItemOutcome::Unfetchable { .. } => {}
        }
        self.outcomes.push((item_id.to_string(), outcome));
    }

    fn into_report(self) -> SyncReport {
        SyncReport {
            event_id: self.run.event_id,
            status: self.run.status,
            started_at: self.run.started_at,
            finished_at: self.run.finished_at.unwrap_or_else(Utc::now),
            total_items: self.run.total_items,
            outcomes: self.outcomes,
            completed_item_ids: self.completed,
            failed: self.failed,
            skipped_item_ids: self.skipped,
            unfetchable: self.unfetchable,
            deferred_item_ids: self.deferred,
            deleted_item_ids: self.deleted,
            evicted_item_ids: self.evicted,
            evicted_from_other_events: self.evicted_elsewhere,
            critical_evictions: self.critical_evictions,
            bytes_used: self.run.bytes_used,
            last_error: self.run.last_error,
        }
    }
}

/// Resolves once the run is cancelled. Never resolves if the control is gone.
pub(super) async fn cancelled(control: &mut watch::Receiver<RunSignal>) {
    if control.wait_for(|s| *s == RunSignal::Cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl Inner {
    /// Execute one run to its terminal state and return the report.
    ///
    /// The terminal progress update is left to the caller so it can release
    /// the run slot first.
    #[tracing::instrument(skip_all, fields(event_id = %event_id))]
    pub(super) async fn execute(
        &self,
        event_id: &str,
        request: RunRequest,
        control: &mut watch::Receiver<RunSignal>,
        emitter: &mut ProgressEmitter,
    ) -> SyncReport {
        let started = Instant::now();
        let kind = self.resolve_kind(event_id, request).await;
        let mut ledger = RunLedger::new(SyncRun::new(event_id, kind.clone()));

        // Cancelled while queued behind another run
        if *control.borrow() == RunSignal::Cancelled {
            info!("Run cancelled before start");
            return self.finish(ledger, SyncStatus::Cancelled, None, started).await;
        }

        ledger.run.status = SyncStatus::Syncing;
        crate::metrics::set_run_state(SyncStatus::Syncing.as_str());
        info!(kind = ?kind, "Sync run started");
        emitter.emit(self.progress(&ledger, SyncStatus::Syncing, None));

        match self.run_plan(event_id, &kind, &mut ledger, control, emitter).await {
            Ok(status) => self.finish(ledger, status, None, started).await,
            Err(e) => {
                error!(error = %e, "Sync run failed");
                self.finish(ledger, SyncStatus::Failed, Some(e.to_string()), started).await
            }
        }
    }

    /// Terminal update carrying the report.
    pub(super) fn terminal_progress(&self, report: SyncReport) -> SyncProgress {
        SyncProgress {
            event_id: report.event_id.clone(),
            total_items: Some(report.total_items),
            completed_items: report.completed_item_ids.len(),
            current_item_description: None,
            status: report.status,
            storage_used_bytes: self.tracker.used_bytes(),
            storage_limit_bytes: self.tracker.limits().ceiling_bytes,
            report: Some(report),
        }
    }

    async fn resolve_kind(&self, event_id: &str, request: RunRequest) -> RunKind {
        match request {
            RunRequest::Full { force_refresh, priority_hint } => RunKind::Full { force_refresh, priority_hint },
            RunRequest::Incremental { since: Some(since) } => RunKind::Incremental { since },
            RunRequest::Incremental { since: None } => match self.store.last_sync(event_id).await {
                Ok(Some(since)) => RunKind::Incremental { since },
                Ok(None) => {
                    info!("No previous sync recorded, running a full sync instead");
                    RunKind::Full { force_refresh: false, priority_hint: None }
                }
                Err(e) => {
                    warn!(error = %e, "Could not read last sync timestamp, running a full sync instead");
                    RunKind::Full { force_refresh: false, priority_hint: None }
                }
            },
        }
    }

    async fn run_plan(
        &self,
        event_id: &str,
        kind: &RunKind,
        ledger: &mut RunLedger,
        control: &mut watch::Receiver<RunSignal>,
        emitter: &mut ProgressEmitter,
    ) -> Result<SyncStatus, SyncError> {
        // ========== PHASE 1: Rebuild the budget from the store ==========
        let device = self.store.list_all_items().await?;
        self.tracker.hydrate_device(event_id, &device);
        self.reconcile(event_id, &device, ledger).await?;
        let local = self.store.list_items(event_id).await?;

        // ========== PHASE 2: Plan ==========
        let plan = match kind {
            RunKind::Full { force_refresh, priority_hint } => {
                let manifest = self.load_manifest(event_id, *force_refresh).await?;
                let mut plan = self.differ.diff(&manifest.items, &local, *force_refresh);
                if let Some(floor) = priority_hint {
                    plan.apply_priority_floor(*floor);
                }
                plan
            }
            RunKind::Incremental { since } => {
                let changes = self.load_changes(event_id, *since).await?;
                if changes.is_empty() {
                    info!("Delta is empty, nothing to sync");
                    ledger.total = Some(0);
                    self.record_sync_time(event_id).await;
                    return Ok(SyncStatus::Completed);
                }
                self.differ.diff_changes(&changes, &local)
            }
        };
        self.record_plan(&plan, ledger);
        emitter.emit(self.progress(ledger, SyncStatus::Syncing, None));

        // ========== PHASE 3: Fetch in priority order ==========
        for item in &plan.to_fetch {
            if !self.checkpoint(ledger, control, emitter).await {
                return Ok(SyncStatus::Cancelled);
            }
            emitter.emit(self.progress(ledger, SyncStatus::Syncing, Some(item.description())));

            match self.sync_item(event_id, item, ledger, control).await {
                Some(outcome) => ledger.record(&item.id, outcome),
                None => return Ok(SyncStatus::Cancelled),
            }
            emitter.emit(self.progress(ledger, SyncStatus::Syncing, None));
        }

        if *control.borrow() == RunSignal::Cancelled {
            return Ok(SyncStatus::Cancelled);
        }

        // ========== PHASE 4: Stale deletions + timestamp ==========
        self.delete_stale(event_id, &plan.to_delete, ledger).await;
        self.record_sync_time(event_id).await;

        Ok(SyncStatus::Completed)
    }

    async fn load_manifest(&self, event_id: &str, force_refresh: bool) -> Result<Manifest, SyncError> {
        let source = &self.source;
        retry_if(
            "get_manifest",
            &self.config.manifest_retry(),
            || async move { source.get_manifest(event_id, force_refresh).await },
            is_transient,
        )
        .await
        .map_err(|e| {
            crate::metrics::record_manifest_error(source_error_kind(&e));
            SyncError::ManifestUnavailable(e)
        })
    }

    async fn load_changes(&self, event_id: &str, since: DateTime<Utc>) -> Result<Vec<Change>, SyncError> {
        let source = &self.source;
        retry_if(
            "get_incremental_changes",
            &self.config.manifest_retry(),
            || async move { source.get_incremental_changes(event_id, since).await },
            is_transient,
        )
        .await
        .map_err(|e| {
            crate::metrics::record_manifest_error(source_error_kind(&e));
            SyncError::ManifestUnavailable(e)
        })
    }

    fn record_plan(&self, plan: &SyncPlan, ledger: &mut RunLedger) {
        for entry in &plan.unfetchable {
            ledger.record(&entry.item.id, ItemOutcome::Unfetchable { reason: entry.reason.to_string() });
            ledger.unfetchable.push(entry.clone());
        }
        for item in &plan.deferred {
            ledger.record(&item.id, ItemOutcome::Deferred);
        }
        ledger.total = Some(plan.to_fetch.len());
        ledger.run.total_items = plan.to_fetch.len();
        info!(
            fetch = plan.to_fetch.len(),
            fetch_bytes = plan.fetch_bytes(),
            unchanged = plan.unchanged.len(),
            delete = plan.to_delete.len(),
            unfetchable = plan.unfetchable.len(),
            deferred = plan.deferred.len(),
            "Sync plan ready"
        );
    }

    /// Item boundary: hold while paused. Returns false once cancelled.
    async fn checkpoint(
        &self,
        ledger: &RunLedger,
        control: &mut watch::Receiver<RunSignal>,
        emitter: &mut ProgressEmitter,
    ) -> bool {
        let signal = *control.borrow_and_update();
        match signal {
            RunSignal::Running => true,
            RunSignal::Cancelled => false,
            RunSignal::Paused => {
                info!(completed = ledger.completed.len(), "Run paused");
                crate::metrics::set_run_state(SyncStatus::Paused.as_str());
                emitter.emit(self.progress(ledger, SyncStatus::Paused, None));

                let next = control.wait_for(|s| *s != RunSignal::Paused).await.map(|s| *s);
                if matches!(next, Ok(RunSignal::Running)) {
                    info!("Run resumed");
                    crate::metrics::set_run_state(SyncStatus::Syncing.as_str());
                    emitter.emit(self.progress(ledger, SyncStatus::Syncing, None));
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Admit and fetch one item. `None` means the run was cancelled mid-fetch.
    async fn sync_item(
        &self,
        event_id: &str,
        item: &ManifestItem,
        ledger: &mut RunLedger,
        control: &mut watch::Receiver<RunSignal>,
    ) -> Option<ItemOutcome> {
        let reservation = match self.tracker.reserve(item) {
            Ok(reservation) => reservation,
            Err(shortfall) => {
                debug!(item_id = %item.id, error = %shortfall, "Item does not fit, trying eviction");
                if let Err(e) = self.make_room(event_id, item, &shortfall, ledger).await {
                    warn!(item_id = %item.id, error = %e, "Eviction failed");
                }
                match self.tracker.reserve(item) {
                    Ok(reservation) => reservation,
                    Err(shortfall) => {
                        warn!(
                            item_id = %item.id,
                            priority = %item.priority,
                            shortfall_bytes = shortfall.shortfall_bytes(),
                            "Skipping item: insufficient storage"
                        );
                        return Some(ItemOutcome::SkippedInsufficientStorage {
                            shortfall_bytes: shortfall.shortfall_bytes(),
                        });
                    }
                }
            }
        };

        let result = tokio::select! {
            result = self.fetch_item(event_id, item) => result,
            () = cancelled(control) => Err(FetchError::Cancelled),
        };
        let stopped = *control.borrow() == RunSignal::Cancelled;

        match result {
            Ok(fetched) => {
                let stored = StoredItem::from_manifest(item, Utc::now());
                match self.store.put_item(event_id, &stored).await {
                    Ok(()) => {
                        self.tracker.commit(reservation);
                        ledger.admitted.insert(item.id.clone());
                        crate::metrics::record_fetched_bytes(fetched.bytes_written);
                        debug!(item_id = %item.id, bytes = fetched.bytes_written, "Item stored");
                        Some(ItemOutcome::Completed)
                    }
                    Err(e) => {
                        self.tracker.release(reservation);
                        self.discard(event_id, item).await;
                        warn!(item_id = %item.id, error = %e, "Failed to record fetched item");
                        Some(ItemOutcome::Failed {
                            error: e.to_string(),
                            retry_eligible: true,
                        })
                    }
                }
            }
            Err(FetchError::Cancelled) if stopped => {
                self.tracker.release(reservation);
                self.discard(event_id, item).await;
                info!(item_id = %item.id, "Fetch cancelled");
                None
            }
            Err(e) => {
                self.tracker.release(reservation);
                self.discard(event_id, item).await;
                warn!(item_id = %item.id, error = %e, "Item fetch failed");
                Some(ItemOutcome::Failed {
                    error: e.to_string(),
                    retry_eligible: true,
                })
            }
        }
    }

    /// Fetch with per-attempt timeout, checksum verification and retry.
    async fn fetch_item(&self, event_id: &str, item: &ManifestItem) -> Result<FetchedContent, FetchError> {
        let _timer = crate::metrics::LatencyTimer::new();
        let timeout = self.config.item_fetch_timeout();
        let verify = self.config.verify_checksums;
        let fetcher = &self.fetcher;

        retry_if(
            &format!("fetch {}", item.id),
            &self.config.item_retry(),
            || async move {
                let fetched = match timeout {
                    Some(limit) => tokio::time::timeout(limit, fetcher.fetch(event_id, item))
                        .await
                        .map_err(|_| FetchError::Timeout(limit))??,
                    None => fetcher.fetch(event_id, item).await?,
                };
                if verify && !item.checksum.is_empty() && !fetched.checksum.eq_ignore_ascii_case(&item.checksum) {
                    return Err(FetchError::ChecksumMismatch {
                        expected: item.checksum.clone(),
                        actual: fetched.checksum,
                    });
                }
                Ok(fetched)
            },
            |e| !matches!(e, FetchError::Cancelled),
        )
        .await
    }

    async fn discard(&self, event_id: &str, item: &ManifestItem) {
        if let Err(e) = self.fetcher.discard(event_id, item).await {
            warn!(item_id = %item.id, error = %e, "Failed to discard partial content");
        }
    }

    /// Evict enough to admit `item`. Nothing is deleted unless the whole
    /// shortfall can be covered.
    ///
    /// Candidates come from every event on the device; only this run's own
    /// admissions are protected.
    async fn make_room(
        &self,
        event_id: &str,
        item: &ManifestItem,
        shortfall: &InsufficientSpace,
        ledger: &mut RunLedger,
    ) -> Result<(), StorageError> {
        let candidates: Vec<(String, StoredItem)> = self
            .store
            .list_all_items()
            .await?
            .into_iter()
            .filter(|(owner, s)| !(owner == event_id && s.id == item.id))
            .filter(|(_, s)| !self.config.evict_lower_priority_only || s.priority <= item.priority)
            .collect();

        let (evictions, satisfied) = self.plan_evictions(
            event_id,
            &candidates,
            shortfall.global_shortfall,
            shortfall.category_shortfall.as_slice(),
            &ledger.admitted,
        );
        if !satisfied {
            debug!(
                item_id = %item.id,
                available = evictions.bytes_freed,
                needed = shortfall.shortfall_bytes(),
                "Eviction cannot cover the shortfall"
            );
            return Ok(());
        }

        self.apply_evictions(event_id, &evictions, "admission", ledger).await
    }

    /// Evict until everything stored on the device fits the current limits.
    async fn reconcile(
        &self,
        event_id: &str,
        device: &[(String, StoredItem)],
        ledger: &mut RunLedger,
    ) -> Result<(), StorageError> {
        let (global, categories) = self.tracker.overage();
        if global == 0 && categories.is_empty() {
            return Ok(());
        }
        warn!(global_overage = global, categories = ?categories, "Stored content exceeds the budget");

        let (evictions, satisfied) = self.plan_evictions(event_id, device, global, &categories, &HashSet::new());
        if !satisfied {
            warn!(freed = evictions.bytes_freed, "Cannot bring stored content within budget");
        }
        self.apply_evictions(event_id, &evictions, "reconcile", ledger).await
    }

    /// Category shortfalls first (from that category), then whatever global
    /// shortfall remains (from anything not already chosen).
    ///
    /// `protected` names items of `event_id`; CRITICAL content is only
    /// eligible while it is empty.
    fn plan_evictions(
        &self,
        event_id: &str,
        candidates: &[(String, StoredItem)],
        global_bytes: u64,
        categories: &[CategoryShortfall],
        protected: &HashSet<String>,
    ) -> (Evictions, bool) {
        let now = Utc::now();
        let allow_critical = protected.is_empty();
        let mut chosen = vec![false; candidates.len()];
        let mut evictions = Evictions::default();
        let mut satisfied = true;

        let open = |i: usize, chosen: &[bool]| {
            let (owner, item) = &candidates[i];
            !chosen[i] && !(owner == event_id && protected.contains(&item.id))
        };

        for shortfall in categories {
            let pool: Vec<usize> = (0..candidates.len())
                .filter(|&i| open(i, &chosen) && candidates[i].1.category == shortfall.category)
                .collect();
            let mut freed = 0u64;
            for i in evictions.take(&self.eviction, candidates, &pool, shortfall.bytes, allow_critical, now) {
                freed += candidates[i].1.size_bytes;
                chosen[i] = true;
            }
            satisfied &= freed >= shortfall.bytes;
        }

        let remaining = global_bytes.saturating_sub(evictions.bytes_freed);
        if remaining > 0 {
            let pool: Vec<usize> = (0..candidates.len()).filter(|&i| open(i, &chosen)).collect();
            evictions.take(&self.eviction, candidates, &pool, remaining, allow_critical, now);
        }

        satisfied &= evictions.bytes_freed >= global_bytes;
        (evictions, satisfied)
    }

    async fn apply_evictions(
        &self,
        event_id: &str,
        evictions: &Evictions,
        reason: &str,
        ledger: &mut RunLedger,
    ) -> Result<(), StorageError> {
        let mut freed = 0u64;
        let mut count = 0usize;
        let mut result = Ok(());

        for (owner, victim) in &evictions.victims {
            if let Err(e) = self.store.delete_item(owner, &victim.id).await {
                result = Err(e);
                break;
            }
            count += 1;
            if owner == event_id {
                freed += self.tracker.record_removal(victim);
                ledger.evicted.push(victim.id.clone());
                if victim.priority == Priority::Critical {
                    ledger.critical_evictions.push(victim.id.clone());
                }
            } else {
                freed += self.tracker.record_resident_removal(owner, &victim.id);
                ledger.evicted_elsewhere.push((owner.clone(), victim.id.clone()));
            }
            if victim.priority == Priority::Critical {
                crate::metrics::record_critical_eviction(1);
                warn!(owner = %owner, item_id = %victim.id, reason, "Evicted CRITICAL content as a last resort");
            }
        }

        if count > 0 {
            crate::metrics::record_eviction(count, freed, reason);
            info!(count, freed, reason, "Evicted stored items");
        }
        result
    }

    async fn delete_stale(&self, event_id: &str, stale: &[StoredItem], ledger: &mut RunLedger) {
        for item in stale {
            if ledger.evicted.contains(&item.id) {
                continue;
            }
            match self.store.delete_item(event_id, &item.id).await {
                Ok(()) => {
                    self.tracker.record_removal(item);
                    ledger.deleted.push(item.id.clone());
                }
                Err(e) => warn!(item_id = %item.id, error = %e, "Failed to delete stale item"),
            }
        }
        if !ledger.deleted.is_empty() {
            info!(count = ledger.deleted.len(), "Removed items no longer in the manifest");
        }
    }

    async fn record_sync_time(&self, event_id: &str) {
        if let Err(e) = self.store.set_last_sync(event_id, Utc::now()).await {
            warn!(error = %e, "Failed to persist last sync timestamp");
        }
    }

    fn progress(&self, ledger: &RunLedger, status: SyncStatus, current: Option<String>) -> SyncProgress {
        SyncProgress {
            event_id: ledger.run.event_id.clone(),
            total_items: ledger.total,
            completed_items: ledger.completed.len(),
            current_item_description: current,
            status,
            storage_used_bytes: self.tracker.used_bytes(),
            storage_limit_bytes: self.tracker.limits().ceiling_bytes,
            report: None,
        }
    }

    async fn finish(
        &self,
        mut ledger: RunLedger,
        status: SyncStatus,
        last_error: Option<String>,
        started: Instant,
    ) -> SyncReport {
        let used = self.tracker.used_bytes();
        ledger.run.status = status;
        ledger.run.finished_at = Some(Utc::now());
        ledger.run.completed_items = ledger.completed.len();
        ledger.run.bytes_used = used;
        ledger.run.last_error = last_error;

        if let Err(e) = self.store.save_run(&ledger.run).await {
            warn!(error = %e, "Failed to persist run record");
        }

        crate::metrics::record_run(status.as_str());
        crate::metrics::record_run_duration(started.elapsed());
        crate::metrics::set_run_state(status.as_str());
        crate::metrics::set_storage_used_bytes(used);
        for category in self.tracker.limits().sub_ceilings.keys() {
            crate::metrics::set_category_bytes(category, self.tracker.category_used_bytes(category));
        }
        for (category, bytes) in self.tracker.usage_by_category() {
            crate::metrics::set_category_bytes(&category, bytes);
        }

        let pressure = self.tracker.pressure();
        crate::metrics::set_budget_pressure(pressure as u8);
        if pressure >= BudgetPressure::High {
            warn!(%pressure, used, "Storage budget under pressure: {}", pressure.description());
        }

        info!(
            status = %status,
            completed = ledger.completed.len(),
            failed = ledger.failed.len(),
            skipped = ledger.skipped.len(),
            evicted = ledger.evicted.len(),
            used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync run finished"
        );

        ledger.into_report()
    }
}

/// Victims chosen across events, as `(event_id, item)` pairs.
#[derive(Debug, Default)]
struct Evictions {
    victims: Vec<(String, StoredItem)>,
    bytes_freed: u64,
}

impl Evictions {
    /// Rank `pool` (positions in `candidates`) and add the victims.
    /// Returns the positions taken.
    fn take(
        &mut self,
        policy: &EvictionPolicy,
        candidates: &[(String, StoredItem)],
        pool: &[usize],
        target_bytes: u64,
        allow_critical: bool,
        now: DateTime<Utc>,
    ) -> Vec<usize> {
        let items: Vec<&StoredItem> = pool.iter().map(|&i| &candidates[i].1).collect();
        let selection = policy.rank_victims(&items, target_bytes, allow_critical, now);
        self.bytes_freed = self.bytes_freed.saturating_add(selection.bytes_freed);
        selection
            .indices
            .into_iter()
            .map(|k| {
                let i = pool[k];
                self.victims.push(candidates[i].clone());
                i
            })
            .collect()
    }
}

fn is_transient(error: &SourceError) -> bool {
    matches!(error, SourceError::Network(_))
}

fn source_error_kind(error: &SourceError) -> &'static str {
    match error {
        SourceError::Network(_) => "network",
        SourceError::Parse(_) => "parse",
    }
}
