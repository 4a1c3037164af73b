use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::content_item::StoredItem;
use crate::coordinator::SyncRun;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// On-device store for fetched content records, keyed by event.
///
/// The store owns every [`StoredItem`]; the orchestrator only reads and
/// writes them through this interface.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All stored items for the event.
    async fn list_items(&self, event_id: &str) -> Result<Vec<StoredItem>, StorageError>;

    /// Every stored item on the device as `(event_id, item)` pairs.
    /// The storage ceiling covers all events, so budget hydration reads this.
    async fn list_all_items(&self) -> Result<Vec<(String, StoredItem)>, StorageError>;

    async fn get_item(&self, event_id: &str, id: &str) -> Result<Option<StoredItem>, StorageError>;

    /// Insert or replace a stored item.
    async fn put_item(&self, event_id: &str, item: &StoredItem) -> Result<(), StorageError>;

    /// Remove an item and its content. Removing a missing item is not an error.
    async fn delete_item(&self, event_id: &str, id: &str) -> Result<(), StorageError>;

    async fn last_sync(&self, event_id: &str) -> Result<Option<DateTime<Utc>>, StorageError>;

    async fn set_last_sync(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), StorageError>;

    async fn last_run(&self, event_id: &str) -> Result<Option<SyncRun>, StorageError>;

    async fn save_run(&self, run: &SyncRun) -> Result<(), StorageError>;

    /// Stored items in one category.
    /// Default implementation filters [`list_items`](Self::list_items).
    async fn list_category(&self, event_id: &str, category: &str) -> Result<Vec<StoredItem>, StorageError> {
        let items = self.list_items(event_id).await?;
        Ok(items.into_iter().filter(|i| i.category == category).collect())
    }

    /// Record a read of the item, feeding eviction recency and usage.
    /// Default implementation is a get-modify-put.
    async fn touch_item(&self, event_id: &str, id: &str, at: DateTime<Utc>) -> Result<StoredItem, StorageError> {
        let mut item = self
            .get_item(event_id, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        item.record_access(at);
        self.put_item(event_id, &item).await?;
        Ok(item)
    }
}
