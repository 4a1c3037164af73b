//! Single in-flight manifest load per event.
//!
//! Several callers asking for the same event's manifest at once (sync run,
//! a UI refresh, a background check) share one network call. The result is
//! reused until it is older than the TTL or a caller forces a refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ManifestSource, SourceError};
use crate::content_item::{Change, Manifest};

type Slot = Arc<Mutex<Option<(Instant, Manifest)>>>;

pub struct CoalescingManifestSource<S> {
    inner: S,
    ttl: Duration,
    slots: DashMap<String, Slot>,
}

impl<S: ManifestSource> CoalescingManifestSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drop the cached manifest for an event.
    pub async fn invalidate(&self, event_id: &str) {
        let slot = self.slots.get(event_id).map(|s| s.value().clone());
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    fn slot(&self, event_id: &str) -> Slot {
        // Clone out so the map shard is not held across an await
        self.slots.entry(event_id.to_string()).or_default().value().clone()
    }
}

#[async_trait]
impl<S: ManifestSource> ManifestSource for CoalescingManifestSource<S> {
    async fn get_manifest(&self, event_id: &str, force_refresh: bool) -> Result<Manifest, SourceError> {
        let slot = self.slot(event_id);
        let mut cached = slot.lock().await;

        if !force_refresh {
            if let Some((loaded_at, manifest)) = cached.as_ref() {
                if loaded_at.elapsed() < self.ttl {
                    debug!(event_id, "Manifest served from coalesced load");
                    return Ok(manifest.clone());
                }
            }
        }

        let manifest = self.inner.get_manifest(event_id, force_refresh).await?;
        *cached = Some((Instant::now(), manifest.clone()));
        Ok(manifest)
    }

    async fn get_incremental_changes(
        &self,
        event_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Change>, SourceError> {
        self.inner.get_incremental_changes(event_id, since).await
    }
}
