//! Application state shared across handlers.

use std::sync::Arc;

use notenschluessel_registry::{RateLimiter, SessionStore};
use notenschluessel_types::GradeReport;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::Result;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Stored calculation results keyed by session id.
    pub sessions: Arc<SessionStore<GradeReport>>,

    /// Per-address limiter for result submissions.
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create the state, starting the session and rate limiter reapers.
    ///
    /// Must be called from within a tokio runtime when either reaper is
    /// enabled.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let sessions = SessionStore::new(config.session.clone())?;
        let rate_limiter = RateLimiter::new(config.rate_limit.clone())?;

        info!(
            session_ttl_secs = config.session.ttl.as_secs(),
            rate_per_minute = config.rate_limit.requests_per_minute,
            burst = config.rate_limit.burst,
            rate_limiting = config.rate_limiting,
            "Initialized session store and rate limiter"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    /// Stop both background reapers.
    pub fn shutdown(&self) {
        self.sessions.stop();
        self.rate_limiter.stop();
    }
}
