//! Outbound request pacing for the search service quota.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Gate awaited before every outbound search request.
#[async_trait]
pub trait Pace: Send + Sync {
    async fn wait(&self);
}

/// Token bucket with a burst of one: consecutive permits are at least
/// `interval` apart, the first one is immediate.
pub struct Pacer {
    limiter: DefaultDirectRateLimiter,
    interval: Duration,
}

/// Quota for a single permit per `interval`. A zero interval is clamped to 1ms.
fn spacing_quota(interval: Duration) -> Quota {
    let interval = interval.max(Duration::from_millis(1));
    Quota::with_period(interval)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN)
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: RateLimiter::direct(spacing_quota(interval)),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take a permit without waiting. `false` means the caller is too early.
    #[cfg(test)]
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[async_trait]
impl Pace for Pacer {
    async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_permit_within_interval_is_refused() {
        let pacer = Pacer::new(Duration::from_secs(60));
        assert!(pacer.try_acquire());
        assert!(!pacer.try_acquire());
    }

    #[test]
    fn zero_interval_is_clamped() {
        let pacer = Pacer::new(Duration::ZERO);
        assert_eq!(pacer.interval(), Duration::ZERO);
        assert!(pacer.try_acquire());
    }

    #[tokio::test]
    async fn wait_spaces_permits() {
        let interval = Duration::from_millis(50);
        let pacer = Pacer::new(interval);
        let start = std::time::Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        // First permit is free, the next two each wait roughly one interval.
        assert!(start.elapsed() >= interval * 2 - Duration::from_millis(10));
    }
}
