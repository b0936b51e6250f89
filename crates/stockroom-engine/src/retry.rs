//! # Retry
//!
//! Bounded exponential backoff for transient store errors.
//!
//! ```text
//! attempt 1 ── TransientStore ──► sleep ~initial
//! attempt 2 ── TransientStore ──► sleep ~initial × 2
//!    ...
//! attempt max_retries + 1 ── TransientStore ──► Unavailable { attempts, last_error }
//!
//! Any other error returns immediately.
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::WriteSettings;
use crate::error::{InventoryError, InventoryResult};

/// How many times and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &WriteSettings) -> Self {
        RetryPolicy {
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // Bounded by max_retries and the write timeout
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&WriteSettings::default())
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of retries.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> InventoryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = InventoryResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() => {
                if attempt > policy.max_retries {
                    error!(operation, attempts = attempt, error = %err, "Retries exhausted");
                    return Err(InventoryError::Unavailable {
                        attempts: attempt,
                        last_error: err.to_string(),
                    });
                }

                let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
                warn!(operation, attempt, ?delay, error = %err, "Transient store error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(&fast(3), "append", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(InventoryError::TransientStore("database is locked".into()))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_unavailable() {
        let calls = AtomicU32::new(0);

        let result: InventoryResult<()> = retry_transient(&fast(2), "append", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(InventoryError::TransientStore("database is locked".into())) }
        })
        .await;

        match result {
            Err(InventoryError::Unavailable {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("locked"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: InventoryResult<()> = retry_transient(&fast(5), "append", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(InventoryError::InsufficientStock {
                    store_id: "S1".into(),
                    product_id: "P1".into(),
                    available: 60,
                    requested: 100,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(InventoryError::InsufficientStock { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.max_backoff, Duration::from_secs(1));
    }
}
