//! Sliding-window rate limiting, keyed by wallet address.
//!
//! An explicit, injectable component held in managed state; limits and the
//! window come from [`crate::Config`]. Hits outside the window are evicted
//! on every check for that key, so a key's memory use is bounded by the
//! per-window limit.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit for `key`. Returns false if the key has exhausted its
    /// budget for the current window; the hit is then not recorded.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let window_start = now.checked_sub(self.window);
        let mut hits = self.hits.lock().unwrap();
        let entry = hits.entry(key.to_string()).or_default();
        if let Some(window_start) = window_start {
            while entry.front().map_or(false, |&hit| hit <= window_start) {
                entry.pop_front();
            }
        }
        if entry.len() >= self.max_requests {
            return false;
        }
        entry.push_back(now);
        true
    }
}
