//! Token-bucket rate limiting for the external retrieve service.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Global token bucket bounding calls to the retrieve service, shared by
/// every clip task regardless of which source video it targets.
#[derive(Clone)]
pub struct RetrieveRateLimiter {
    inner: Arc<DirectLimiter>,
}

impl RetrieveRateLimiter {
    /// `per_minute` is the sustained request ceiling; burst is capped at
    /// the same value since the retrieve service has no documented burst
    /// allowance beyond its steady rate.
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::new(40).unwrap());
        let quota = Quota::per_minute(per_minute);
        Self {
            inner: Arc::new(DirectLimiter::direct(quota)),
        }
    }

    /// Blocks until a token is available.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_does_not_panic_under_quota() {
        let limiter = RetrieveRateLimiter::new(40);
        limiter.acquire().await;
        limiter.acquire().await;
    }
}
