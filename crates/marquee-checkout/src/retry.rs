//! # Retry Policy
//!
//! Bounded exponential backoff for transient store errors.
//!
//! ```text
//! attempt 1 ── Busy ──► wait ~initial ──► attempt 2 ── Busy ──► wait ~2x ──► ...
//!                                                    │
//!           business rejection or max_attempts ──────┴──► returned as is
//! ```
//!
//! Only operations that are idempotent or guarded by a status check go
//! through here: reserve, release, reap, finalize, cancel, refund.
//! AddItem and AddPayment would duplicate lines or money on a retry after
//! an ambiguous failure and are never wrapped.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::CheckoutResult;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            current_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            // Attempts bound the loop, not wall time.
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Runs `op`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> CheckoutResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CheckoutResult<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;

        backoff::future::retry(self.backoff(), || {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_transient() && attempt < max_attempts => {
                        warn!(operation, attempt, max_attempts, error = %err, "Transient store error, retrying");
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(&RetrySettings::default())
    }
}
