//! # Transient Failure Retries
//!
//! Bounded exponential backoff around storage operations.
//!
//! ```text
//! attempt 1 ──► Busy ──► sleep ~50ms ──► attempt 2 ──► Busy ──► sleep ~100ms
//!     ──► attempt 3 ──► Busy ──► give up, return the last DbError
//! ```
//!
//! Only errors for which [`DbError::is_transient`] is true are retried.
//! Each attempt must be a complete unit of work (a whole transaction), so a
//! retry never observes a half-applied write.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::DbResult;

/// How many times, and how patiently, to retry transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. 1 disables retries.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy::new(1, Duration::ZERO)
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            // Attempt count bounds the loop, not elapsed time
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy is spent.
///
/// ```rust,ignore
/// let order = with_retry(&policy, "place_order", || self.place_once(&checkout)).await?;
/// ```
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                debug!(operation, attempt, ?delay, error = %err, "Transient storage failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!(operation, attempts = attempt, error = %err, "Transient storage failure, giving up");
                }
                return Err(err);
            }
        }
    }
}
