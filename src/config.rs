//! Configuration for the sync orchestrator.
//!
//! # Example
//!
//! ```
//! use festival_sync::SyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.ceiling_bytes, 2_000_000_000); // 2 GB
//! assert_eq!(config.sub_ceilings.get("maps"), Some(&500_000_000));
//!
//! // Tighter budget for a low-end device
//! let config = SyncConfig {
//!     ceiling_bytes: 1_000_000_000,
//!     item_max_attempts: 3,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::budget::BudgetLimits;
use crate::coordinator::SyncError;
use crate::eviction::EvictionWeights;
use crate::resilience::retry::RetryConfig;

/// What to do when a sync is requested while another one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrentStartPolicy {
    /// Refuse the second request with [`SyncError::AlreadyRunning`]
    #[default]
    Reject,
    /// Hold the second request in `Idle` until the active run terminates
    Queue,
}

/// Configuration for the sync orchestrator.
///
/// All fields have sensible defaults for the festival guide: a 2 GB device
/// budget with 500 MB reserved for map tiles.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Global storage ceiling in bytes (default: 2 GB)
    #[serde(default = "default_ceiling_bytes")]
    pub ceiling_bytes: u64,

    /// Per-category ceilings in bytes (default: maps → 500 MB)
    #[serde(default = "default_sub_ceilings")]
    pub sub_ceilings: HashMap<String, u64>,

    /// Behaviour for a second start request while a run is active
    #[serde(default)]
    pub concurrent_start: ConcurrentStartPolicy,

    /// Manifest / delta retrieval retries
    #[serde(default = "default_manifest_max_retries")]
    pub manifest_max_retries: usize,
    #[serde(default = "default_manifest_retry_initial_ms")]
    pub manifest_retry_initial_ms: u64,
    #[serde(default = "default_manifest_retry_max_ms")]
    pub manifest_retry_max_ms: u64,

    /// Per-item fetch attempts within one run (1 = no retry)
    #[serde(default = "default_item_max_attempts")]
    pub item_max_attempts: usize,
    #[serde(default = "default_item_retry_initial_ms")]
    pub item_retry_initial_ms: u64,

    /// Optional per-attempt fetch timeout; a timeout counts as a fetch failure
    #[serde(default)]
    pub item_fetch_timeout_ms: Option<u64>,

    /// Reject fetched content whose checksum differs from the manifest
    #[serde(default = "default_true")]
    pub verify_checksums: bool,

    /// Only evict items with priority <= the incoming item's priority
    #[serde(default = "default_true")]
    pub evict_lower_priority_only: bool,

    /// Eviction scoring
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_usage_weight")]
    pub usage_weight: f64,
    #[serde(default = "default_size_penalty_weight")]
    pub size_penalty_weight: f64,
    #[serde(default = "default_recency_half_life_secs")]
    pub recency_half_life_secs: f64,
    #[serde(default = "default_usage_saturation")]
    pub usage_saturation: u64,
    #[serde(default = "default_size_baseline_bytes")]
    pub size_baseline_bytes: u64,

    /// How long a coalesced manifest may be reused without force_refresh
    #[serde(default = "default_manifest_cache_ttl_secs")]
    pub manifest_cache_ttl_secs: u64,
}

fn default_ceiling_bytes() -> u64 { 2_000_000_000 }
fn default_sub_ceilings() -> HashMap<String, u64> {
    HashMap::from([("maps".to_string(), 500_000_000)])
}
fn default_manifest_max_retries() -> usize { 3 }
fn default_manifest_retry_initial_ms() -> u64 { 200 }
fn default_manifest_retry_max_ms() -> u64 { 2_000 }
fn default_item_max_attempts() -> usize { 2 }
fn default_item_retry_initial_ms() -> u64 { 250 }
fn default_true() -> bool { true }
fn default_recency_weight() -> f64 { 3.0 }
fn default_usage_weight() -> f64 { 3.0 }
fn default_size_penalty_weight() -> f64 { 2.0 }
fn default_recency_half_life_secs() -> f64 { 6.0 * 3600.0 } // 6 hours
fn default_usage_saturation() -> u64 { 100 }
fn default_size_baseline_bytes() -> u64 { 50_000_000 } // 50 MB
fn default_manifest_cache_ttl_secs() -> u64 { 30 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ceiling_bytes: default_ceiling_bytes(),
            sub_ceilings: default_sub_ceilings(),
            concurrent_start: ConcurrentStartPolicy::default(),
            manifest_max_retries: default_manifest_max_retries(),
            manifest_retry_initial_ms: default_manifest_retry_initial_ms(),
            manifest_retry_max_ms: default_manifest_retry_max_ms(),
            item_max_attempts: default_item_max_attempts(),
            item_retry_initial_ms: default_item_retry_initial_ms(),
            item_fetch_timeout_ms: None,
            verify_checksums: default_true(),
            evict_lower_priority_only: default_true(),
            recency_weight: default_recency_weight(),
            usage_weight: default_usage_weight(),
            size_penalty_weight: default_size_penalty_weight(),
            recency_half_life_secs: default_recency_half_life_secs(),
            usage_saturation: default_usage_saturation(),
            size_baseline_bytes: default_size_baseline_bytes(),
            manifest_cache_ttl_secs: default_manifest_cache_ttl_secs(),
        }
    }
}

impl SyncConfig {
    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.ceiling_bytes == 0 {
            return Err(SyncError::InvalidConfig("ceiling_bytes must be > 0".into()));
        }
        for (category, bytes) in &self.sub_ceilings {
            if *bytes == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "sub-ceiling for '{}' must be > 0", category
                )));
            }
            if *bytes > self.ceiling_bytes {
                return Err(SyncError::InvalidConfig(format!(
                    "sub-ceiling for '{}' ({} bytes) exceeds the global ceiling ({} bytes)",
                    category, bytes, self.ceiling_bytes
                )));
            }
        }
        if self.item_max_attempts == 0 {
            return Err(SyncError::InvalidConfig("item_max_attempts must be >= 1".into()));
        }
        self.eviction_weights().check().map_err(SyncError::InvalidConfig)?;
        Ok(())
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits::new(self.ceiling_bytes).with_sub_ceilings(self.sub_ceilings.clone())
    }

    pub fn eviction_weights(&self) -> EvictionWeights {
        EvictionWeights {
            recency_weight: self.recency_weight,
            usage_weight: self.usage_weight,
            size_penalty_weight: self.size_penalty_weight,
            recency_half_life_secs: self.recency_half_life_secs,
            usage_saturation: self.usage_saturation,
            size_baseline_bytes: self.size_baseline_bytes,
        }
    }

    pub fn manifest_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.manifest_max_retries.max(1),
            initial_delay: Duration::from_millis(self.manifest_retry_initial_ms),
            max_delay: Duration::from_millis(self.manifest_retry_max_ms),
            factor: 2.0,
        }
    }

    pub fn item_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.item_max_attempts.max(1),
            initial_delay: Duration::from_millis(self.item_retry_initial_ms),
            max_delay: Duration::from_millis(self.item_retry_initial_ms.saturating_mul(8)),
            factor: 2.0,
        }
    }

    pub fn item_fetch_timeout(&self) -> Option<Duration> {
        self.item_fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn manifest_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.manifest_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_device_budget() {
        let config = SyncConfig::default();
        assert_eq!(config.ceiling_bytes, 2_000_000_000);
        assert_eq!(config.sub_ceilings["maps"], 500_000_000);
        assert_eq!(config.concurrent_start, ConcurrentStartPolicy::Reject);
        assert!(config.verify_checksums);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: SyncConfig = serde_json::from_str(
            r#"{"ceiling_bytes": 1000, "sub_ceilings": {"maps": 400}, "concurrent_start": "queue"}"#,
        )
        .unwrap();
        assert_eq!(config.ceiling_bytes, 1000);
        assert_eq!(config.sub_ceilings["maps"], 400);
        assert_eq!(config.concurrent_start, ConcurrentStartPolicy::Queue);
        assert_eq!(config.item_max_attempts, 2);
        assert!(config.item_fetch_timeout_ms.is_none());
    }

    #[test]
    fn test_validate_rejects_sub_ceiling_above_global() {
        let config = SyncConfig {
            ceiling_bytes: 100,
            sub_ceilings: HashMap::from([("maps".to_string(), 200)]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = SyncConfig { ceiling_bytes: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = SyncConfig { item_max_attempts: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_weights_that_outrank_priority() {
        let config = SyncConfig { recency_weight: 500.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(msg)) if msg.contains("priority step")));

        let config = SyncConfig { usage_weight: -3.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(msg)) if msg.contains("usage_weight")));

        let config = SyncConfig { size_penalty_weight: f64::INFINITY, ..Default::default() };
        assert!(config.validate().is_err());

        let config = SyncConfig { recency_half_life_secs: 0.0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            recency_weight: 40.0,
            usage_weight: 40.0,
            size_penalty_weight: 19.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_configs_are_bounded() {
        let config = SyncConfig::default();
        assert_eq!(config.manifest_retry().max_attempts, 3);
        assert_eq!(config.item_retry().max_attempts, 2);
        assert_eq!(config.item_retry().initial_delay, Duration::from_millis(250));
    }
}
