//! Time sources for expiry checks and token refill.
//!
//! Registries and token buckets read time through the same clock so that a
//! test can move both forward together with a [`ManualClock`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic time source.
///
/// Any cloneable [`governor`] clock reporting [`std::time::Instant`]
/// qualifies. Each token bucket gets its own clone of the registry's clock.
pub trait Clock:
    governor::clock::Clock<Instant = Instant> + Clone + Send + Sync + 'static
{
}

impl<T> Clock for T where
    T: governor::clock::Clock<Instant = Instant> + Clone + Send + Sync + 'static
{
}

/// The process monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn now(&self) -> Instant {
        Instant::now()
    }
}

impl governor::clock::Clock for SystemClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        SystemClock::now(self)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same current time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Current time of this clock.
    pub fn now(&self) -> Instant {
        *self.now.lock()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl governor::clock::Clock for ManualClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        ManualClock::now(self)
    }
}
