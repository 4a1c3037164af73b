// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote collaborators: where manifests come from and how bytes arrive.
//!
//! Both are injected into the orchestrator. The transport, manifest wire
//! format and on-disk layout of content are theirs to decide.

pub mod coalesce;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::content_item::{Change, Manifest, ManifestItem};

pub use coalesce::CoalescingManifestSource;

/// Failure to obtain a manifest or delta.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed manifest: {0}")]
    Parse(String),
}

/// Failure to transfer one item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("fetch cancelled")]
    Cancelled,
}

/// What a completed transfer reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub bytes_written: u64,
    /// Digest of the bytes written, in the manifest's checksum notation
    pub checksum: String,
}

/// Source of manifests and deltas (network calls).
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn get_manifest(&self, event_id: &str, force_refresh: bool) -> Result<Manifest, SourceError>;

    async fn get_incremental_changes(
        &self,
        event_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Change>, SourceError>;
}

/// Transfers the bytes of one item to local storage.
///
/// Cancellation is cooperative: the orchestrator drops the `fetch` future,
/// then calls [`discard`](Self::discard) so no partial item survives.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, event_id: &str, item: &ManifestItem) -> Result<FetchedContent, FetchError>;

    /// Remove whatever was written for a failed or cancelled fetch.
    async fn discard(&self, event_id: &str, item: &ManifestItem) -> Result<(), FetchError> {
        let _ = (event_id, item);
        Ok(())
    }
}
