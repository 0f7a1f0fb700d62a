//! Sliding-window rate limiter configuration.

use serde::Deserialize;

fn default_max_requests() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_min_interval_secs() -> u64 {
    2
}

/// Sliding-window rate limiter thresholds, shared by every handler through a
/// single mutex-guarded limiter instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum number of acquires allowed within `window`.
    pub max_requests: u32,
    /// Width, in seconds, of the sliding window.
    pub window_secs: u64,
    /// Minimum spacing, in seconds, enforced between successive acquires.
    pub min_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// The sliding window width as a [`std::time::Duration`].
    pub fn window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.window_secs)
    }

    /// The minimum spacing between acquires as a [`std::time::Duration`].
    pub fn min_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.min_interval_secs)
    }
}
