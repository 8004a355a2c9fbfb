use std::time::Duration;

use tracing::warn;

use super::KvCache;

/// Fixed-window limit on login attempts, keyed by canonical phone.
#[derive(Clone)]
pub struct LoginRateLimiter {
    cache: KvCache,
    max_attempts: u32,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(cache: KvCache, max_attempts: u32, window: Duration) -> Self {
        Self { cache, max_attempts, window }
    }

    /// Record one attempt; false once the window's budget is spent.
    /// A limit of zero disables the check.
    pub fn check(&self, phone: &str) -> bool {
        if self.max_attempts == 0 {
            return true;
        }
        let n = self.cache.incr_window(&format!("login:{phone}"), self.window);
        if n > i64::from(self.max_attempts) {
            warn!(target: "auth", attempts = n, "login rate limit exceeded");
            return false;
        }
        true
    }
}
