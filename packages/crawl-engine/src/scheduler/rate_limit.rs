//! Per-domain request rate limiting using the governor crate.

use governor::{Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::Mutex;

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Requests per minute when a target has no rate-limit rule.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

/// One token bucket per domain.
pub struct DomainRateLimiter {
    default_per_minute: NonZeroU32,
    limiters: Mutex<HashMap<String, Arc<DirectRateLimiter>>>,
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_MINUTE)
    }
}

fn per_minute(requests: u32) -> NonZeroU32 {
    NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN)
}

impl DomainRateLimiter {
    pub fn new(default_per_minute: u32) -> Self {
        Self {
            default_per_minute: per_minute(default_per_minute),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the quota for `domain`.
    pub async fn configure(&self, domain: &str, requests_per_minute: u32) {
        let quota = Quota::per_minute(per_minute(requests_per_minute));
        self.limiters
            .lock()
            .await
            .insert(domain.to_string(), Arc::new(RateLimiter::direct(quota)));
    }

    async fn limiter(&self, domain: &str) -> Arc<DirectRateLimiter> {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_minute(self.default_per_minute))))
            .clone()
    }

    /// Wait until a request to `domain` is allowed.
    pub async fn until_ready(&self, domain: &str) {
        let limiter = self.limiter(domain).await;
        limiter.until_ready().await;
    }

    /// Take a permit without waiting, if one is available.
    pub async fn try_acquire(&self, domain: &str) -> bool {
        self.limiter(domain).await.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buckets_are_per_domain() {
        let limiter = DomainRateLimiter::new(2);
        assert!(limiter.try_acquire("a.gov.uk").await);
        assert!(limiter.try_acquire("a.gov.uk").await);
        assert!(!limiter.try_acquire("a.gov.uk").await);
        assert!(limiter.try_acquire("b.gov.uk").await);
    }

    #[tokio::test]
    async fn configured_quota_replaces_default() {
        let limiter = DomainRateLimiter::new(1);
        limiter.configure("a.gov.uk", 3).await;
        for _ in 0..3 {
            assert!(limiter.try_acquire("a.gov.uk").await);
        }
        assert!(!limiter.try_acquire("a.gov.uk").await);
    }

    #[tokio::test]
    async fn until_ready_returns_with_capacity() {
        let limiter = DomainRateLimiter::default();
        limiter.until_ready("a.gov.uk").await;
    }
}
