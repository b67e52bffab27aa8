//! Sliding-window rate limiter
//!
//! One instance per process, shared by reference with every orchestrator.
//! `acquire` only ever delays; it never rejects.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Per-key sliding window over recent call timestamps
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_calls` per `window` for every key
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until `key` has capacity in its window, then record the call
    pub async fn acquire(&self, key: &str) {
        loop {
            let wait = {
                let mut calls = self.calls.lock();
                let window = calls.entry(key.to_string()).or_default();
                let now = Instant::now();
                prune(window, now, self.window);

                if window.len() < self.max_calls {
                    window.push_back(now);
                    return;
                }

                // Oldest call leaves the window at oldest + window
                match window.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!(key = %key, wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_calls_under_limit_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire("groq").await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_call_waits_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();
        limiter.acquire("groq").await;
        tokio::time::advance(Duration::from_secs(3)).await;
        limiter.acquire("groq").await;

        limiter.acquire("groq").await;
        // first call leaves the window at t=10
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire("groq").await;
        limiter.acquire("gemini").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_frees_up_after_it_passes() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire("ollama").await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let start = Instant::now();
        limiter.acquire("ollama").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_still_admits_one_call() {
        let limiter = RateLimiter::new(0, Duration::from_secs(30));
        let start = Instant::now();
        limiter.acquire("groq").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        limiter.acquire("groq").await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_window() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(5)));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire("shared").await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        let late = finished
            .iter()
            .filter(|t| t.duration_since(start) >= Duration::from_secs(5))
            .count();
        assert_eq!(late, 2);
    }
}
