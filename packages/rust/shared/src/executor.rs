//! Bounded-concurrency task execution and retry helpers.
//!
//! [`RateLimitedExecutor`] runs a list of futures with at most `limit` in
//! flight and returns their results in input order. [`retry`] re-runs an
//! operation on transient failures with linear backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{NewsdeskError, Result};

/// Runs tasks with a fixed upper bound on concurrency.
#[derive(Debug, Clone)]
pub struct RateLimitedExecutor {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

impl RateLimitedExecutor {
    /// Create an executor allowing `limit` tasks at once (minimum 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task, never more than `limit` at a time.
    ///
    /// The returned vector has one entry per task, in input order. A task
    /// that panics yields `NewsdeskError::Task` in its slot; other tasks
    /// are unaffected.
    pub async fn run_all<F, T>(&self, tasks: Vec<F>) -> Vec<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let sem = self.semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| NewsdeskError::Task(e.to_string()))?;
                task.await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "task panicked or was cancelled");
                    results.push(Err(NewsdeskError::Task(e.to_string())));
                }
            }
        }
        results
    }
}

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `f`, retrying while it fails with a transient error.
///
/// Non-transient errors are returned immediately. `operation` names the
/// call in log output.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.base_delay * attempt;
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(operation, attempt, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_keep_input_order() {
        let executor = RateLimitedExecutor::new(2);
        let tasks: Vec<_> = (0..6u64)
            .map(|i| async move {
                // Later tasks finish first.
                tokio::time::sleep(Duration::from_millis(30 - i * 5)).await;
                Ok(i)
            })
            .collect();

        let results = executor.run_all(tasks).await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn never_exceeds_limit() {
        let executor = RateLimitedExecutor::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let results = executor.run_all(tasks).await;
        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_others() {
        let executor = RateLimitedExecutor::new(2);
        let tasks: Vec<_> = (0..3)
            .map(|i| async move {
                if i == 1 {
                    Err(NewsdeskError::fetch("boom"))
                } else {
                    Ok(i)
                }
            })
            .collect();

        let results = executor.run_all(tasks).await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        let executor = RateLimitedExecutor::new(0);
        assert_eq!(executor.limit(), 1);
        let results = executor.run_all(vec![async { Ok(1) }]).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = retry(policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(NewsdeskError::Network("reset".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<()> = retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(NewsdeskError::fetch("not an array")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<()> = retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(NewsdeskError::Http {
                    status: 503,
                    url: "https://ex.com".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
