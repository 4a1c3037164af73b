//! Resilience helpers for flaky festival connectivity.
//!
//! - [`retry`]: exponential backoff for manifest calls and item fetches

pub mod retry;
