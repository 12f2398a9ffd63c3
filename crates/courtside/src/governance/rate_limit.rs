//! Sliding-window rate limiter
//!
//! State lives in process memory only: it is lost on restart and is not
//! shared between replicas.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Calls between sweeps of keys whose whole window has expired
pub const SWEEP_INTERVAL: u64 = 1024;

pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
            calls: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// Record a request for `key` if it is within the allowance
    ///
    /// Returns false (and records nothing) once `max_requests` requests
    /// already fall inside the window.
    pub fn check_and_record(&self, key: &str) -> bool {
        self.check_and_record_at(key, Instant::now())
    }

    /// Same as [`check_and_record`](Self::check_and_record) with an explicit clock reading
    pub fn check_and_record_at(&self, key: &str, now: Instant) -> bool {
        // Must run before the entry guard below is taken: retain locks every shard.
        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            self.prune_at(now);
        }

        // The entry guard holds the shard lock, so concurrent calls for the
        // same key cannot interleave between eviction and push.
        let mut timestamps = self.windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests as usize {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Drop every key whose newest request is older than the window
    pub fn prune_at(&self, now: Instant) {
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|&newest| now.saturating_duration_since(newest) < self.window)
        });

        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            tracing::debug!(dropped, "Pruned expired rate-limit windows");
        }
    }

    /// Number of keys currently holding window state
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Requests still allowed for `key` in the current window
    pub fn remaining(&self, key: &str) -> u32 {
        self.remaining_at(key, Instant::now())
    }

    pub fn remaining_at(&self, key: &str, now: Instant) -> u32 {
        let Some(timestamps) = self.windows.get(key) else {
            return self.max_requests;
        };

        let active = timestamps
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) < self.window)
            .count();

        self.max_requests
            .saturating_sub(u32::try_from(active).unwrap_or(u32::MAX))
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_allows_up_to_max_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_and_record_at("u1", now));
        assert!(limiter.check_and_record_at("u1", now));
        assert!(limiter.check_and_record_at("u1", now));
        assert!(!limiter.check_and_record_at("u1", now));
        assert_eq!(limiter.remaining_at("u1", now), 0);
    }

    #[test]
    fn test_rejected_requests_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_and_record_at("u1", start));
        for i in 1..5 {
            assert!(!limiter.check_and_record_at("u1", start + Duration::from_secs(i)));
        }
        // Only the first request counts, so the window reopens 10s after it
        assert!(limiter.check_and_record_at("u1", start + Duration::from_secs(10)));
    }

    #[test]
    fn test_oldest_request_ages_out() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_and_record_at("u1", start));
        assert!(limiter.check_and_record_at("u1", start + Duration::from_secs(30)));
        assert!(!limiter.check_and_record_at("u1", start + Duration::from_secs(59)));
        assert!(limiter.check_and_record_at("u1", start + Duration::from_secs(60)));
        assert!(!limiter.check_and_record_at("u1", start + Duration::from_secs(61)));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_and_record_at("alice", now));
        assert!(!limiter.check_and_record_at("alice", now));
        assert!(limiter.check_and_record_at("bob", now));
        assert_eq!(limiter.remaining_at("carol", now), 1);
    }

    #[test]
    fn test_expired_keys_are_swept() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..SWEEP_INTERVAL {
            assert!(limiter.check_and_record_at(&format!("anon-{i}"), start));
        }
        assert_eq!(limiter.tracked_keys(), SWEEP_INTERVAL as usize);

        // The next call crosses the sweep interval after every window expired
        assert!(limiter.check_and_record_at("late", start + Duration::from_secs(3600)));
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_prune_keeps_active_windows() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        limiter.check_and_record_at("stale", start);
        limiter.check_and_record_at("active", start + Duration::from_secs(30));
        limiter.prune_at(start + Duration::from_secs(70));

        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.remaining_at("active", start + Duration::from_secs(70)), 2);
        assert_eq!(limiter.remaining_at("stale", start + Duration::from_secs(70)), 3);
    }

    #[test]
    fn test_defaults() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.max_requests(), 10);
        assert_eq!(limiter.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_concurrent_requests_never_exceed_max() {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(60)));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.check_and_record("shared"))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(allowed, 10);
    }
}
