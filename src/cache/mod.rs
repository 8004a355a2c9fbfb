//! In-memory key-value cache with per-key TTL.
//!
//! Used for login rate limiting. Session validity never depends on it: a cold
//! or swept cache only resets the counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod rate_limit;

pub use rate_limit::LoginRateLimiter;

#[derive(Clone, Copy)]
struct Entry {
    count: i64,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool { now >= self.expires_at }
}

/// Fixed-window counters keyed by string, each expiring with its window.
#[derive(Clone, Default)]
pub struct KvCache {
    map: Arc<parking_lot::RwLock<HashMap<String, Entry>>>,
}

impl KvCache {
    pub fn new() -> Self { Self::default() }

    /// Increment a fixed-window counter and return the new count.
    ///
    /// The first increment starts the window; later increments keep its
    /// expiry. An expired counter starts over at 1.
    pub fn incr_window(&self, key: &str, window: Duration) -> i64 {
        let now = Instant::now();
        let mut w = self.map.write();
        if let Some(ent) = w.get_mut(key) {
            if !ent.is_expired(now) {
                ent.count += 1;
                return ent.count;
            }
        }
        w.insert(key.to_string(), Entry { count: 1, expires_at: now + window });
        1
    }

    /// Live and not-yet-swept keys.
    pub fn len(&self) -> usize { self.map.read().len() }

    /// Remove expired keys. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, e| !e.is_expired(now));
        before - w.len()
    }
}
