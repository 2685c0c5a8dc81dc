//! Retry with exponential backoff.
//!
//! Errors declare whether they are worth retrying through [`Recoverable`].
//! Recoverable failures (remote git flakiness, subprocess hiccups) are retried;
//! anything else is returned on the first attempt.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::process::CommandError;

/// Classifies an error as transient or permanent.
pub trait Recoverable {
    /// Returns true if retrying the same operation might succeed.
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for CommandError {
    fn is_recoverable(&self) -> bool {
        !self.is_not_found()
    }
}

/// Retry limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_retries: u32,
    /// Base of the exponential wait: attempt `i` waits `backoff_factor^i` seconds.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
        }
    }

    /// Wait after the failed attempt `attempt` (0-indexed).
    ///
    /// Saturates at `Duration::MAX` when `factor^attempt` does not fit.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_factor.powi(exponent).max(0.0)).unwrap_or(Duration::MAX)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
///
/// The wait between attempts is a plain sleep on the calling task; it is not
/// cut short by anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `operation` names the operation in logs.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable error, or the last error once all
    /// attempts are exhausted.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Recoverable + Display,
    {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) if attempt + 1 >= attempts => {
                    error!(
                        operation = %operation,
                        max_retries = attempts,
                        error = %e,
                        "Max retries exceeded"
                    );
                    return Err(e);
                },
                Err(e) => {
                    let wait = self.policy.delay_for(attempt);
                    warn!(
                        operation = %operation,
                        attempt = attempt + 1,
                        max_retries = attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Recoverable for TestError {
        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Transient(_))
        }
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff_factor, 2.0);
    }

    #[test]
    fn test_delay_for() {
        let policy = RetryPolicy::new(5, 2.0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));

        let policy = RetryPolicy::new(5, 1.5);
        assert_eq!(policy.delay_for(2), Duration::from_secs_f64(2.25));
    }

    #[test]
    fn test_delay_for_huge_factor_saturates() {
        let policy = RetryPolicy::new(3, 1e20);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::MAX);
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_k_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryPolicy::new(5, 2.0));

        let counter = Arc::clone(&calls);
        let result = executor
            .run("flaky", || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(TestError::Transient(n))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_exactly_n_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryPolicy::new(3, 2.0));

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = executor
            .run("broken", || {
                let counter = Arc::clone(&counter);
                async move { Err(TestError::Transient(counter.fetch_add(1, Ordering::SeqCst))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result, Err(TestError::Transient(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_recoverable_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::default();

        let counter = Arc::clone(&calls);
        let result: Result<(), _> = executor
            .run("fatal", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_timing() {
        let started = Instant::now();
        let call_times = Arc::new(Mutex::new(Vec::new()));
        let executor = RetryExecutor::new(RetryPolicy::new(4, 2.0));

        let times = Arc::clone(&call_times);
        let _: Result<(), _> = executor
            .run("timed", || {
                times.lock().push(started.elapsed());
                async { Err(TestError::Transient(0)) }
            })
            .await;

        let times = call_times.lock().clone();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();

        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_still_attempts_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryPolicy::new(0, 2.0));

        let counter = Arc::clone(&calls);
        let _: Result<(), _> = executor
            .run("once", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient(0)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_command_error_recoverability() {
        let missing = CommandError::NotFound {
            program: "docker".to_string(),
        };
        let timeout = CommandError::TimedOut {
            program: "git".to_string(),
            timeout: Duration::from_secs(60),
        };

        assert!(!missing.is_recoverable());
        assert!(timeout.is_recoverable());
    }
}
