//! Database Retry Logic
//!
//! Exponential backoff retry for transient SQLite lock errors. The retry
//! window is controlled by the `database_max_lock_wait_ms` setting.

use std::time::{Duration, Instant};
use jk_common::{Error, Result};

/// Retry a database operation with exponential backoff until max_wait_ms elapses.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If "database is locked" error:
///    a. If time elapsed < max_wait_ms: log WARN, backoff, retry
///    b. If time elapsed >= max_wait_ms: log ERROR, return error
/// 4. If other error: return error immediately (no retry)
///
/// **Backoff Strategy:**
/// - Initial delay: 10ms
/// - Max delay: 1000ms
/// - Multiplier: 2.0 (exponential)
///
/// The operation must be safe to repeat: each attempt opens its own
/// transaction, so a failed attempt leaves nothing behind.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(
                operation = operation_name,
                attempt,
                "Retrying database operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Database operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Database operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_lock_contention() {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();

                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                let next_backoff_ms = backoff_ms.min(1000);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms = next_backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis(),
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(next_backoff_ms)).await;

                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Internal("database is locked".to_string())) }
        })
        .await;

        // Internal errors are not lock contention even when the text matches
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_constraint_error_is_not_retried() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Database(sqlx::Error::RowNotFound)) }
        })
        .await;

        assert!(matches!(result, Err(Error::Database(sqlx::Error::RowNotFound))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
