// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded retry with exponential backoff.
//!
//! Festival connectivity comes and goes; a few spaced attempts paper over
//! short gaps before a failure is reported. Attempts are always bounded: a
//! sync run must finish so the next one can start.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use festival_sync::RetryConfig;
//!
//! let manifest = RetryConfig::manifest();
//! assert_eq!(manifest.max_attempts, 3);
//! assert_eq!(manifest.delay_after(1), Duration::from_millis(200));
//! assert_eq!(manifest.delay_after(2), Duration::from_millis(400));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt budget and backoff schedule for one kind of remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total calls, including the first. Values below 1 are treated as 1.
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth of the delay between consecutive attempts
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::manifest()
    }
}

impl RetryConfig {
    /// Manifest and delta retrieval: patient, the whole run depends on it.
    #[must_use]
    pub fn manifest() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// One item transfer: a quick second try, then leave it for the next run.
    #[must_use]
    pub fn item() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
        }
    }

    /// Pause before the attempt following attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.max(1.0).powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Run `operation` until it succeeds or the attempts are used up.
pub async fn retry<F, Fut, T, E>(label: &str, config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_if(label, config, operation, |_| true).await
}

/// Like [`retry`], but an error `is_transient` rejects is returned at once.
pub async fn retry_if<F, Fut, T, E, P>(
    label: &str,
    config: &RetryConfig,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts || !is_transient(&err) {
            return Err(err);
        }

        let delay = config.delay_after(attempt);
        warn!(operation = label, attempt, max_attempts, error = %err, ?delay, "Attempt failed, backing off");
        sleep(delay).await;
    }
}
