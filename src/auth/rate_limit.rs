use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use chrono::{DateTime, Utc, Duration};
use tracing::debug;

use crate::config::RateLimitSettings;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_size: Duration,
    /// Tracked key count above which elapsed windows are swept.
    pub sweep_threshold: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window_size: Duration::minutes(15),
            sweep_threshold: 10_000,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            window_size: Duration::minutes(settings.window_minutes),
            sweep_threshold: settings.sweep_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
}

#[derive(Debug)]
struct AttemptWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl AttemptWindow {
    fn open(window_size: Duration) -> Self {
        Self {
            count: 1,
            reset_at: Utc::now() + window_size,
        }
    }

    fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }
}

/// Fixed-window attempt counter keyed by arbitrary strings such as
/// `login:<username>` or `2fa:<user id>`. State lives in this process only.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<String, AttemptWindow>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        let mut windows = self.windows.write().await;
        let now = Utc::now();

        if windows.len() > self.config.sweep_threshold {
            let before = windows.len();
            windows.retain(|_, window| !window.has_elapsed(now));
            debug!(removed = before - windows.len(), "Swept elapsed rate limit windows");
        }

        let max = self.config.max_attempts;
        match windows.get_mut(key) {
            Some(window) if !window.has_elapsed(now) => {
                if window.count >= max {
                    return RateLimitResult { allowed: false, remaining: 0 };
                }
                window.count += 1;
                RateLimitResult { allowed: true, remaining: max - window.count }
            }
            _ => {
                windows.insert(key.to_string(), AttemptWindow::open(self.config.window_size));
                RateLimitResult { allowed: true, remaining: max.saturating_sub(1) }
            }
        }
    }

    /// Number of keys currently tracked, elapsed or not.
    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
