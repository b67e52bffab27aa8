//! Retry with exponential backoff
//!
//! Attempt `n` (zero based) that fails sleeps `base_delay * backoff_factor^n`
//! before the next attempt, capped at [`MAX_RETRY_DELAY`]. No sleep follows
//! the final attempt; its error is returned as-is.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upper bound on any single backoff sleep
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), 2.0)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            backoff_factor: if backoff_factor.is_finite() {
                backoff_factor.max(0.0)
            } else {
                1.0
            },
        }
    }

    /// A single attempt, no backoff
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Delay slept after failed attempt `attempt` (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_RETRY_DELAY))
            .unwrap_or(if secs.is_nan() { Duration::ZERO } else { MAX_RETRY_DELAY })
    }

    /// Retry `op` on every error
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(label, op, |_| true).await
    }

    /// Retry `op` while `should_retry` accepts the error
    ///
    /// A rejected error is returned immediately without consuming further attempts.
    pub async fn run_if<T, E, F, Fut, P>(&self, label: &str, mut op: F, should_retry: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let remaining = attempt + 1 < self.max_attempts;
                    let retry = remaining && should_retry(&err);
                    warn!(
                        op = %label,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %err,
                        will_retry = retry,
                        "Attempt failed"
                    );
                    if !retry {
                        return Err(err);
                    }
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Run `op` under `policy`, retrying every failure
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    policy.run(label, op).await
}
