use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::traits::{LocalStore, StorageError};
use crate::content_item::StoredItem;
use crate::coordinator::SyncRun;

/// In-memory [`LocalStore`]. Items are listed in id order.
pub struct InMemoryStore {
    items: DashMap<String, BTreeMap<String, StoredItem>>,
    last_sync: DashMap<String, DateTime<Utc>>,
    runs: DashMap<String, SyncRun>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            last_sync: DashMap::new(),
            runs: DashMap::new(),
        }
    }

    /// Pre-populate an event's items
    pub fn with_items(self, event_id: &str, items: impl IntoIterator<Item = StoredItem>) -> Self {
        self.items
            .entry(event_id.to_string())
            .or_default()
            .extend(items.into_iter().map(|i| (i.id.clone(), i)));
        self
    }

    /// Item count for an event
    #[must_use]
    pub fn len(&self, event_id: &str) -> usize {
        self.items.get(event_id).map_or(0, |m| m.len())
    }

    #[must_use]
    pub fn is_empty(&self, event_id: &str) -> bool {
        self.len(event_id) == 0
    }

    /// Sum of stored sizes across every event
    #[must_use]
    pub fn device_bytes(&self) -> u64 {
        self.items
            .iter()
            .map(|m| m.values().map(|i| i.size_bytes).sum::<u64>())
            .sum()
    }

    /// Sum of stored sizes for an event
    #[must_use]
    pub fn total_bytes(&self, event_id: &str) -> u64 {
        self.items
            .get(event_id)
            .map_or(0, |m| m.values().map(|i| i.size_bytes).sum())
    }

    #[must_use]
    pub fn contains(&self, event_id: &str, id: &str) -> bool {
        self.items.get(event_id).is_some_and(|m| m.contains_key(id))
    }

    pub fn clear(&self) {
        self.items.clear();
        self.last_sync.clear();
        self.runs.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for InMemoryStore {
    async fn list_items(&self, event_id: &str) -> Result<Vec<StoredItem>, StorageError> {
        Ok(self
            .items
            .get(event_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_all_items(&self) -> Result<Vec<(String, StoredItem)>, StorageError> {
        let mut all: Vec<(String, StoredItem)> = self
            .items
            .iter()
            .flat_map(|entry| {
                let event_id = entry.key().clone();
                entry
                    .value()
                    .values()
                    .map(|item| (event_id.clone(), item.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(all)
    }

    async fn get_item(&self, event_id: &str, id: &str) -> Result<Option<StoredItem>, StorageError> {
        Ok(self.items.get(event_id).and_then(|m| m.get(id).cloned()))
    }

    async fn put_item(&self, event_id: &str, item: &StoredItem) -> Result<(), StorageError> {
        self.items
            .entry(event_id.to_string())
            .or_default()
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn delete_item(&self, event_id: &str, id: &str) -> Result<(), StorageError> {
        if let Some(mut m) = self.items.get_mut(event_id) {
            m.remove(id);
        }
        Ok(())
    }

    async fn last_sync(&self, event_id: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        Ok(self.last_sync.get(event_id).map(|r| *r.value()))
    }

    async fn set_last_sync(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.last_sync.insert(event_id.to_string(), at);
        Ok(())
    }

    async fn last_run(&self, event_id: &str) -> Result<Option<SyncRun>, StorageError> {
        Ok(self.runs.get(event_id).map(|r| r.value().clone()))
    }

    async fn save_run(&self, run: &SyncRun) -> Result<(), StorageError> {
        self.runs.insert(run.event_id.clone(), run.clone());
        Ok(())
    }

    async fn touch_item(&self, event_id: &str, id: &str, at: DateTime<Utc>) -> Result<StoredItem, StorageError> {
        let mut items = self
            .items
            .get_mut(event_id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let item = items
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        item.record_access(at);
        Ok(item.clone())
    }
}
