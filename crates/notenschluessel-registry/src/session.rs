//! Per-session storage of calculation results.

use std::sync::Arc;
use std::time::Duration;

use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::reaper::Reaper;
use crate::registry::{Expiry, TtlRegistry};

/// Number of random bytes in a session identifier.
const SESSION_ID_BYTES: usize = 16;

/// Length of a hex-encoded session identifier.
pub const SESSION_ID_LEN: usize = SESSION_ID_BYTES * 2;

/// Generate a session identifier: 16 bytes from the OS random source,
/// rendered as 32 lowercase hex characters.
///
/// The identifier also authorizes downloads of the session's results, so it
/// must never come from a predictable source. Failure of the OS source is
/// reported instead of falling back to anything weaker.
pub fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        error!(error = %e, "Failed to generate session ID");
        Error::Entropy(e.to_string())
    })?;
    Ok(hex::encode(bytes))
}

/// Short, non-authorizing form of a session id for log events.
pub(crate) fn id_prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Stores one calculation result per session id.
///
/// Entries expire a fixed time after they were stored; reading them does not
/// extend their life. Storing under an existing id replaces the entry and
/// restarts its lifetime. There is no other way to renew a session.
pub struct SessionStore<V, C: Clock = SystemClock> {
    registry: Arc<TtlRegistry<String, V, C>>,
    config: SessionConfig,
    reaper: Option<Reaper>,
}

impl<V> SessionStore<V, SystemClock>
where
    V: Send + Sync + 'static,
{
    /// Create a store backed by the system clock.
    ///
    /// Starts the reaper when enabled, which requires a tokio runtime.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<V, C> SessionStore<V, C>
where
    V: Send + Sync + 'static,
    C: Clock,
{
    /// Create a store reading time from `clock`.
    pub fn with_clock(config: SessionConfig, clock: C) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(TtlRegistry::with_clock(
            "sessions",
            Expiry::Fixed(config.ttl),
            clock,
        ));

        let reaper = if config.enable_cleanup_task {
            Some(Reaper::spawn(
                "sessions",
                registry.clone(),
                config.cleanup_interval,
            )?)
        } else {
            None
        };

        Ok(Self {
            registry,
            config,
            reaper,
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Lifetime of a stored result.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Store a result under `id`, expiring [`ttl`](Self::ttl) from now.
    pub fn set(&self, id: &str, value: V) {
        self.registry.set(id.to_string(), value);

        let expires_at = chrono::Duration::from_std(self.config.ttl)
            .ok()
            .map(|ttl| (chrono::Utc::now() + ttl).to_rfc3339());
        debug!(
            session = id_prefix(id),
            expires_at = ?expires_at,
            "Session data stored"
        );
    }

    /// Store a result under a freshly generated id and return the id.
    pub fn create(&self, value: V) -> Result<String> {
        let id = generate_session_id()?;
        self.set(&id, value);
        Ok(id)
    }

    /// Look up the result for `id`.
    ///
    /// `None` means there is no live result for this id: it never existed,
    /// was deleted, or has expired.
    pub fn get(&self, id: &str) -> Option<Arc<V>> {
        let value = self.registry.get(id);
        if value.is_some() {
            debug!(session = id_prefix(id), "Session retrieved");
        } else {
            debug!(session = id_prefix(id), "Session not found");
        }
        value
    }

    /// Remove the result for `id`. Removing an absent id is a no-op.
    pub fn delete(&self, id: &str) {
        if self.registry.delete(id) {
            debug!(session = id_prefix(id), "Session deleted");
        }
    }

    /// Number of resident sessions, including expired ones not yet reclaimed.
    ///
    /// For observability only.
    pub fn count(&self) -> usize {
        self.registry.len()
    }

    /// Remove expired sessions now, without waiting for the reaper.
    pub fn sweep(&self) -> usize {
        self.registry.sweep()
    }

    /// Whether a background reaper is attached.
    pub fn has_reaper(&self) -> bool {
        self.reaper.is_some()
    }

    /// Stop the background reaper, if any. Lazy expiry keeps working.
    pub fn stop(&self) {
        if let Some(reaper) = &self.reaper {
            reaper.stop();
        }
    }
}
