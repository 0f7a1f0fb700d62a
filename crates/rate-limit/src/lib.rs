//! Sliding-window request rate limiter shared by every gateway handler.
//!
//! The entire `acquire` call, including any sleep it performs, runs with a
//! single lock held: throughput across the whole process is serialized by
//! design, not an incidental side effect of the implementation.

use std::{collections::VecDeque, time::Duration};

use config::RateLimitConfig;
use tokio::{sync::Mutex, time::Instant};

struct State {
    instants: VecDeque<Instant>,
    last: Option<Instant>,
}

/// A mutex-guarded sliding-window rate limiter.
pub struct RateLimiter {
    state: Mutex<State>,
    max_requests: u32,
    window: Duration,
    min_interval: Duration,
}

impl RateLimiter {
    /// Builds a limiter from the configured thresholds.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(State {
                instants: VecDeque::new(),
                last: None,
            }),
            max_requests: config.max_requests,
            window: config.window(),
            min_interval: config.min_interval(),
        }
    }

    /// Waits, if necessary, until another request is allowed to proceed,
    /// then records it. Holds the internal lock for the full duration of
    /// any wait, so concurrent callers queue up behind each other.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let now = Instant::now();

        while let Some(&oldest) = state.instants.front() {
            if now.duration_since(oldest) >= self.window {
                state.instants.pop_front();
            } else {
                break;
            }
        }

        let mut wait = Duration::ZERO;

        if let Some(last) = state.last {
            let elapsed = now.duration_since(last);

            if elapsed < self.min_interval {
                wait = wait.max(self.min_interval - elapsed);
            }
        }

        if state.instants.len() as u32 >= self.max_requests
            && let Some(&oldest) = state.instants.front()
        {
            let window_clears_at = oldest + self.window;

            if window_clears_at > now {
                wait = wait.max(window_clears_at - now);
            }
        }

        if wait > Duration::ZERO {
            tokio::time::sleep(wait).await;
        }

        let acquired_at = Instant::now();
        state.instants.push_back(acquired_at);
        state.last = Some(acquired_at);
    }
}

#[cfg(test)]
mod tests {
    use config::RateLimitConfig;
    use tokio::time::{self, Duration};

    use super::RateLimiter;

    fn config(max_requests: u32, window_secs: u64, min_interval_secs: u64) -> RateLimitConfig {
        toml::from_str(&format!(
            "max_requests = {max_requests}\nwindow_secs = {window_secs}\nmin_interval_secs = {min_interval_secs}\n"
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_min_interval() {
        let limiter = RateLimiter::new(&config(100, 60, 2));

        limiter.acquire().await;
        let start = time::Instant::now();
        limiter.acquire().await;

        assert!(time::Instant::now().duration_since(start) >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_window_capacity() {
        let limiter = RateLimiter::new(&config(2, 10, 0));

        limiter.acquire().await;
        limiter.acquire().await;

        let start = time::Instant::now();
        limiter.acquire().await;

        assert!(time::Instant::now().duration_since(start) >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_expired_instants() {
        let limiter = RateLimiter::new(&config(1, 5, 0));

        limiter.acquire().await;
        time::advance(Duration::from_secs(6)).await;

        let start = time::Instant::now();
        limiter.acquire().await;

        assert!(time::Instant::now().duration_since(start) < Duration::from_millis(50));
    }
}
