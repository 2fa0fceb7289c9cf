//! Sliding-window request limiter keyed by client identifier.
//!
//! Advisory abuse protection only. State is in memory and lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct RateLimiter {
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records the request if `key` has made fewer than
    /// `max_requests` requests inside the window. Rejected calls are not recorded.
    pub fn allow(&self, key: &str, max_requests: usize) -> bool {
        self.allow_at(key, max_requests, Instant::now())
    }

    pub fn allow_at(&self, key: &str, max_requests: usize, now: Instant) -> bool {
        let mut requests = self.lock();
        let timestamps = requests.entry(key.to_string()).or_default();
        timestamps.retain(|t| now.saturating_duration_since(*t) < self.window);

        if timestamps.len() >= max_requests {
            tracing::debug!(client = %key, max_requests, "rate limit exceeded");
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Drops keys with no requests left inside the window.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub fn purge_idle_at(&self, now: Instant) -> usize {
        let mut requests = self.lock();
        let before = requests.len();
        requests.retain(|_, timestamps| {
            timestamps.retain(|t| now.saturating_duration_since(*t) < self.window);
            !timestamps.is_empty()
        });
        before - requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_max() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.allow_at("1.2.3.4", 10, now));
        }
        assert!(!limiter.allow_at("1.2.3.4", 10, now));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        assert!(limiter.allow_at("a", 1, now));
        assert!(!limiter.allow_at("a", 1, now));
        assert!(limiter.allow_at("b", 1, now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        let start = Instant::now();
        assert!(limiter.allow_at("ip", 2, start));
        assert!(limiter.allow_at("ip", 2, start + Duration::from_secs(1800)));
        assert!(!limiter.allow_at("ip", 2, start + Duration::from_secs(3599)));
        // The first request has aged out.
        assert!(limiter.allow_at("ip", 2, start + Duration::from_secs(3600)));
        assert!(!limiter.allow_at("ip", 2, start + Duration::from_secs(3601)));
    }

    #[test]
    fn test_rejected_calls_not_recorded() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.allow_at("ip", 1, start));
        for s in 1..10 {
            assert!(!limiter.allow_at("ip", 1, start + Duration::from_secs(s)));
        }
        // Only the accepted request counts, so the key frees up after one window.
        assert!(limiter.allow_at("ip", 1, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_ceiling_is_per_call() {
        let limiter = RateLimiter::default();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.allow_at("ip", 60, now));
        }
        assert!(!limiter.allow_at("ip", 10, now));
        assert!(limiter.allow_at("ip", 60, now));
    }

    #[test]
    fn test_purge_idle() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        let start = Instant::now();
        limiter.allow_at("old", 5, start);
        limiter.allow_at("fresh", 5, start + Duration::from_secs(50));

        assert_eq!(limiter.purge_idle_at(start + Duration::from_secs(70)), 1);
        assert_eq!(limiter.purge_idle_at(start + Duration::from_secs(70)), 0);
    }
}
