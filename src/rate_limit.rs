//! Fixed-window request throttling keyed by client IP.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

/// Entries are pruned once the map holds this many keys.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Per-process limiter. Counts are kept in this instance only, so a
/// deployment with several replicas allows `limit` requests per replica.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    pub fn check(&self, key: &str) -> RateLimitResult {
        self.check_at(key, Instant::now())
    }

    /// Count one request from `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitResult {
        let mut windows = self.windows.lock();
        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|_, w| now <= w.reset_at);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.limit {
            RateLimitResult::Limited {
                retry_after: window.reset_at.saturating_duration_since(now),
            }
        } else {
            RateLimitResult::Allowed
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_then_reject() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4", t0).is_allowed());
        }
        let result = limiter.check_at("1.2.3.4", t0 + Duration::from_secs(20));
        assert_eq!(
            result,
            RateLimitResult::Limited {
                retry_after: Duration::from_secs(40)
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("b", t0).is_allowed());
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0 + Duration::from_secs(60)).is_allowed());
        assert!(limiter.check_at("a", t0 + Duration::from_secs(61)).is_allowed());
    }

    #[test]
    fn test_saturated_count_stays_limited() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.windows.lock().insert(
            "a".to_string(),
            Window {
                count: u32::MAX,
                reset_at: t0 + Duration::from_secs(60),
            },
        );
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert_eq!(limiter.windows.lock()["a"].count, u32::MAX);
    }

    #[test]
    fn test_stale_entries_pruned() {
        let limiter = RateLimiter::new(5, Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..PRUNE_THRESHOLD {
            limiter.check_at(&format!("10.0.{}.{}", i / 256, i % 256), t0);
        }
        assert_eq!(limiter.tracked_keys(), PRUNE_THRESHOLD);
        limiter.check_at("fresh", t0 + Duration::from_secs(5));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
