//! Per-key token bucket rate limiting

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Token-bucket rate limiter keyed by client (or any other hashable key).
///
/// Each key gets `max_requests` tokens that refill in full every `interval`.
#[derive(Debug)]
pub struct RateLimiter<K = crate::ClientId> {
    max_tokens: u32,
    refill_interval: Duration,
    buckets: HashMap<K, Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_tokens: max_requests,
            refill_interval: interval,
            buckets: HashMap::new(),
        }
    }

    /// Consume one token for `key`. Returns `false` when the key is rate limited.
    pub fn check(&mut self, key: &K) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&mut self, key: &K, now: Instant) -> bool {
        let max_tokens = self.max_tokens;
        let bucket = self.buckets.entry(key.clone()).or_insert(Bucket {
            tokens: max_tokens,
            last_refill: now,
        });

        if now.duration_since(bucket.last_refill) >= self.refill_interval {
            bucket.tokens = max_tokens;
            bucket.last_refill = now;
        }

        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    /// Forget a key (e.g. when its connection closes)
    pub fn remove(&mut self, key: &K) {
        self.buckets.remove(key);
    }

    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientId;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        let client = ClientId::new();

        for _ in 0..5 {
            assert!(limiter.check(&client));
        }
        assert!(!limiter.check(&client));
    }

    #[test]
    fn keys_have_independent_buckets() {
        let mut limiter: RateLimiter<&str> = RateLimiter::new(2, Duration::from_secs(1));

        assert!(limiter.check(&"a"));
        assert!(limiter.check(&"a"));
        assert!(!limiter.check(&"a"));

        assert!(limiter.check(&"b"));
        assert!(limiter.check(&"b"));
    }

    #[test]
    fn bucket_refills_after_interval() {
        let mut limiter: RateLimiter<u8> = RateLimiter::new(1, Duration::from_millis(100));
        let start = Instant::now();

        assert!(limiter.check_at(&1, start));
        assert!(!limiter.check_at(&1, start + Duration::from_millis(50)));
        assert!(limiter.check_at(&1, start + Duration::from_millis(150)));
    }

    #[test]
    fn remove_forgets_key() {
        let mut limiter: RateLimiter<u8> = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(&7));
        assert!(!limiter.check(&7));
        limiter.remove(&7);
        assert_eq!(limiter.tracked(), 0);
        assert!(limiter.check(&7));
    }
}
