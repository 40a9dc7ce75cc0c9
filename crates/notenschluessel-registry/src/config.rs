//! Configuration for the session store and the rate limiter.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::Quota;

use crate::error::{Error, Result};

/// Default lifetime of a stored calculation result (24 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between sweeps of either store (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default sustained request rate per client address.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 10;

/// Default burst capacity per client address.
pub const DEFAULT_BURST: u32 = 20;

/// Default idle time after which a client's bucket is reclaimed (10 minutes).
pub const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed lifetime of a session, counted from when it was stored.
    pub ttl: Duration,

    /// Whether to run the background reaper.
    /// If false, expired sessions are only removed when looked up.
    pub enable_cleanup_task: bool,

    /// Interval between reaper sweeps.
    pub cleanup_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            enable_cleanup_task: true,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enable or disable the background reaper.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the reaper interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::InvalidConfig("session ttl must be non-zero".into()));
        }
        if self.enable_cleanup_task && self.cleanup_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "session cleanup interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the per-address rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained requests per minute per address.
    pub requests_per_minute: u32,

    /// Requests an idle address may issue back to back.
    pub burst: u32,

    /// Idle time after which an address's bucket is dropped.
    pub inactivity_window: Duration,

    /// Whether to run the background reaper.
    pub enable_cleanup_task: bool,

    /// Interval between reaper sweeps.
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            burst: DEFAULT_BURST,
            inactivity_window: DEFAULT_INACTIVITY_WINDOW,
            enable_cleanup_task: true,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sustained rate.
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Set the burst capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Set the idle time after which a bucket is reclaimed.
    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }

    /// Enable or disable the background reaper.
    pub fn with_cleanup_task(mut self, enabled: bool) -> Self {
        self.enable_cleanup_task = enabled;
        self
    }

    /// Set the reaper interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Time it takes to earn back a single token.
    pub fn refill_interval(&self) -> Duration {
        match self.requests_per_minute {
            0 => Duration::MAX,
            rpm => Duration::from_secs(60) / rpm,
        }
    }

    /// Build the token-bucket quota: `rpm / 60` tokens per second, capped at `burst`.
    pub(crate) fn quota(&self) -> Result<Quota> {
        let rpm = NonZeroU32::new(self.requests_per_minute)
            .ok_or_else(|| Error::InvalidConfig("requests_per_minute must be non-zero".into()))?;
        let burst = NonZeroU32::new(self.burst)
            .ok_or_else(|| Error::InvalidConfig("burst must be non-zero".into()))?;
        if self.enable_cleanup_task && self.cleanup_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "rate limiter cleanup interval must be non-zero".into(),
            ));
        }
        Ok(Quota::per_minute(rpm).allow_burst(burst))
    }
}
