// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage pressure levels.
//!
//! # Example
//!
//! ```
//! use festival_sync::BudgetPressure;
//!
//! let level = BudgetPressure::from_ratio(0.5);
//! assert_eq!(level, BudgetPressure::Normal);
//! assert!(!level.expect_evictions());
//!
//! let level = BudgetPressure::from_ratio(0.93);
//! assert_eq!(level, BudgetPressure::Critical);
//! assert!(level.expect_evictions());
//! ```

/// Storage pressure level based on `used / ceiling`.
///
/// - **Normal** (< 70%): plenty of headroom
/// - **Elevated** (70-85%): large optional packages may need evictions
/// - **High** (85-95%): most new content will evict something
/// - **Critical** (95-100%): only small items fit without eviction
/// - **Full** (>= 100%): no headroom at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BudgetPressure {
    Normal = 0,
    Elevated = 1,
    High = 2,
    Critical = 3,
    Full = 4,
}

impl BudgetPressure {
    /// Calculate pressure level from a fill ratio (0.0 → 1.0)
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        match ratio {
            r if r < 0.70 => Self::Normal,
            r if r < 0.85 => Self::Elevated,
            r if r < 0.95 => Self::High,
            r if r < 1.0 => Self::Critical,
            _ => Self::Full,
        }
    }

    /// Calculate pressure level from byte counts
    #[must_use]
    pub fn from_usage(used_bytes: u64, ceiling_bytes: u64) -> Self {
        if ceiling_bytes == 0 {
            return Self::Full;
        }
        Self::from_ratio(used_bytes as f64 / ceiling_bytes as f64)
    }

    /// Whether admissions at this level are likely to trigger eviction
    #[must_use]
    pub fn expect_evictions(&self) -> bool {
        matches!(self, Self::High | Self::Critical | Self::Full)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "Normal - plenty of headroom",
            Self::Elevated => "Elevated - large packages may evict",
            Self::High => "High - new content will usually evict",
            Self::Critical => "Critical - nearly full",
            Self::Full => "Full - no headroom",
        }
    }
}

impl std::fmt::Display for BudgetPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
