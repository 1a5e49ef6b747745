//! Bounded exponential-backoff retry for probe attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry settings for transient execution errors.
///
/// Only `Err` results are retried. A probe that completes and reports a
/// failed check returns `Ok` and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    ///
    /// Doubles from `initial_backoff` and is capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exp);
        delay.min(self.max_backoff).max(self.initial_backoff.min(self.max_backoff))
    }

    /// Run `op` until it succeeds or `max_attempts` is reached.
    ///
    /// Attempts never overlap: each retry sleeps for its backoff first. The
    /// last error is returned once attempts are exhausted.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    tracing::error!("Attempt {}/{} failed, giving up: {}", attempt, max_attempts, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(30), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_runs_three_times() {
        let policy = RetryPolicy::default();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let result: Result<(), String> = policy
            .run(|attempt| {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push(Instant::now());
                    Err(format!("driver failed to start (attempt {})", attempt))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "driver failed to start (attempt 3)");

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        for gap in &gaps {
            assert!(*gap >= Duration::from_secs(4) && *gap <= Duration::from_secs(10), "{:?}", gap);
        }
        assert!(gaps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_error() {
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let result: Result<u32, String> = policy
            .run(|attempt| async move {
                if attempt < 2 {
                    Err("connection refused".to_string())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        let attempt = tokio_test::assert_ok!(result);
        assert_eq!(attempt, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_is_not_retried() {
        let calls = Arc::new(Mutex::new(0));
        let result: Result<(), String> = RetryPolicy::default()
            .run(|_| {
                let calls = calls.clone();
                async move {
                    *calls.lock().unwrap() += 1;
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
