//! Per-address token-bucket rate limiting.
//!
//! Each client address gets its own bucket, created on first use. Buckets are
//! kept while the address stays active and reclaimed by the reaper once it
//! has been idle longer than the inactivity window. An address that returns
//! after being reclaimed starts over with a full bucket.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Gcra};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::Result;
use crate::reaper::Reaper;
use crate::registry::{Expiry, TtlRegistry};

type Bucket<C> = Gcra<NotKeyed, InMemoryState, C, NoOpMiddleware<Instant>>;

/// Token bucket for a single client address.
///
/// The bucket state is updated with atomic compare-and-swap, so checking it
/// needs no lock on the registry that holds it.
pub struct AddressLimiter<C: Clock = SystemClock> {
    bucket: Bucket<C>,
}

impl<C: Clock> AddressLimiter<C> {
    fn new(quota: Quota, clock: C) -> Self {
        Self {
            bucket: Gcra::direct_with_clock(quota, clock),
        }
    }

    /// Take one token if available.
    ///
    /// Tokens refill continuously with elapsed time, capped at the burst
    /// capacity. Returns `false` without consuming anything when empty.
    pub fn allow(&self) -> bool {
        self.bucket.check().is_ok()
    }
}

impl<C: Clock> fmt::Debug for AddressLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressLimiter").finish_non_exhaustive()
    }
}

/// Rate limiter holding one bucket per client address.
///
/// Addresses are opaque strings supplied by the caller.
pub struct RateLimiter<C: Clock = SystemClock> {
    registry: Arc<TtlRegistry<String, AddressLimiter<C>, C>>,
    quota: Quota,
    config: RateLimitConfig,
    reaper: Option<Reaper>,
}

impl RateLimiter<SystemClock> {
    /// Create a limiter backed by the system clock.
    ///
    /// Starts the reaper when enabled, which requires a tokio runtime.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a limiter reading time from `clock`.
    ///
    /// The same clock drives bucket refill and inactivity expiry.
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self> {
        let quota = config.quota()?;

        let registry = Arc::new(TtlRegistry::with_clock(
            "rate_limiters",
            Expiry::Sliding(config.inactivity_window),
            clock,
        ));

        let reaper = if config.enable_cleanup_task {
            Some(Reaper::spawn(
                "rate_limiters",
                registry.clone(),
                config.cleanup_interval,
            )?)
        } else {
            None
        };

        Ok(Self {
            registry,
            quota,
            config,
            reaper,
        })
    }

    /// Get the limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Idle time after which an address's bucket is reclaimed.
    pub fn inactivity_window(&self) -> Duration {
        self.config.inactivity_window
    }

    /// Return the bucket for `address`, creating a full one on first use.
    ///
    /// Marks the address as active. Concurrent first requests from the same
    /// address share a single bucket.
    pub fn get_limiter(&self, address: &str) -> Arc<AddressLimiter<C>> {
        let quota = self.quota;
        let clock = self.registry.clock().clone();
        self.registry.get_or_create(address.to_string(), || {
            debug!(
                ip = address,
                rate_per_minute = self.config.requests_per_minute,
                burst = self.config.burst,
                "Created new rate limiter for address"
            );
            AddressLimiter::new(quota, clock)
        })
    }

    /// Look up the bucket for `address` and take a token from it.
    pub fn check(&self, address: &str) -> bool {
        self.get_limiter(address).allow()
    }

    /// Number of addresses currently holding a bucket.
    pub fn tracked_addresses(&self) -> usize {
        self.registry.len()
    }

    /// Reclaim idle buckets now, without waiting for the reaper.
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    /// Whether a background reaper is attached.
    pub fn has_reaper(&self) -> bool {
        self.reaper.is_some()
    }

    /// Stop the background reaper, if any.
    pub fn stop(&self) {
        if let Some(reaper) = &self.reaper {
            reaper.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(rpm: u32, burst: u32) -> (RateLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let config = RateLimitConfig::new()
            .with_requests_per_minute(rpm)
            .with_burst(burst)
            .with_cleanup_task(false);
        (RateLimiter::with_clock(config, clock.clone()).unwrap(), clock)
    }

    #[test]
    fn test_burst_then_refill() {
        let (limiter, clock) = limiter(10, 20);
        let bucket = limiter.get_limiter("1.2.3.4");

        for i in 0..20 {
            assert!(bucket.allow(), "request {} should be allowed", i + 1);
        }
        assert!(!bucket.allow(), "21st request should be denied");

        clock.advance(Duration::from_secs(6));
        assert!(bucket.allow(), "one token should have been refilled");
        assert!(!bucket.allow());
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let (limiter, clock) = limiter(60, 3);
        let bucket = limiter.get_limiter("10.0.0.1");
        for _ in 0..3 {
            assert!(bucket.allow());
        }

        // An hour of idleness still only buys back the burst.
        clock.advance(Duration::from_secs(3600));
        let allowed = (0..10).filter(|_| bucket.allow()).count();
        assert_eq!(allowed, 3);
    }

    #[test]
    fn test_addresses_are_independent() {
        let (limiter, _clock) = limiter(10, 1);
        assert!(limiter.check("1.1.1.1"));
        assert!(!limiter.check("1.1.1.1"));
        assert!(limiter.check("2.2.2.2"));
        assert_eq!(limiter.tracked_addresses(), 2);
    }

    #[test]
    fn test_same_address_shares_bucket() {
        let (limiter, _clock) = limiter(10, 5);
        let a = limiter.get_limiter("::1");
        let b = limiter.get_limiter("::1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_activity_prevents_reaping() {
        let (limiter, clock) = limiter(10, 20);
        limiter.check("1.2.3.4");

        // 30 minutes of steady traffic, well past the 10 minute window.
        for _ in 0..6 {
            clock.advance(Duration::from_secs(5 * 60));
            limiter.check("1.2.3.4");
            assert_eq!(limiter.sweep(), 0);
        }
        assert_eq!(limiter.tracked_addresses(), 1);
    }

    #[test]
    fn test_idle_address_reaped() {
        let (limiter, clock) = limiter(10, 20);
        limiter.check("1.2.3.4");
        clock.advance(Duration::from_secs(9 * 60));
        limiter.check("5.6.7.8");
        clock.advance(Duration::from_secs(2 * 60));

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_addresses(), 1);
    }

    #[test]
    fn test_reaped_address_gets_fresh_bucket() {
        let (limiter, clock) = limiter(10, 2);
        let before = limiter.get_limiter("1.2.3.4");
        assert!(before.allow());
        assert!(before.allow());
        assert!(!before.allow());

        clock.advance(Duration::from_secs(11 * 60));
        assert_eq!(limiter.sweep(), 1);

        let after = limiter.get_limiter("1.2.3.4");
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(after.allow());
        assert!(after.allow());
        assert!(!after.allow());
    }

    #[test]
    fn test_invalid_quota_rejected() {
        let config = RateLimitConfig::new()
            .with_burst(0)
            .with_cleanup_task(false);
        assert!(RateLimiter::with_clock(config, ManualClock::new()).is_err());
    }
}
