//! Bounded retry for optimistic-concurrency conflicts
//!
//! Trackers run their read-validate-write cycle inside [`retry_on_conflict`].
//! A lost compare-and-swap surfaces as a conflict; the whole cycle (including
//! validation) is run again against freshly loaded state, so a payment that
//! was valid before a concurrent write may be rejected on the next attempt.

use std::future::Future;
use tracing::warn;

/// Errors that can tell a version conflict apart from other failures
pub trait ConflictAware {
    /// Returns true if the error is a lost compare-and-swap
    fn is_conflict(&self) -> bool;
}

impl ConflictAware for crate::ports::PortError {
    fn is_conflict(&self) -> bool {
        crate::ports::PortError::is_conflict(self)
    }
}

/// How many times a conflicting operation is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is always made
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or the
/// policy is exhausted. The last conflict is returned when attempts run out.
pub async fn retry_on_conflict<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, E>
where
    E: ConflictAware + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut n = 1;
    loop {
        match attempt(n).await {
            Err(e) if e.is_conflict() && n < policy.max_attempts => {
                warn!(operation, attempt = n, error = %e, "Version conflict, retrying");
                n += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Version;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> PortError {
        PortError::conflict("Invoice", "INV-1", Version::initial(), Version::initial().next())
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, PortError> = retry_on_conflict(RetryPolicy::new(3), "test", |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 3 { Err(conflict()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PortError> = retry_on_conflict(RetryPolicy::new(2), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(conflict()) }
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PortError> = retry_on_conflict(RetryPolicy::default(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PortError::validation("bad")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_floor() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }
}
