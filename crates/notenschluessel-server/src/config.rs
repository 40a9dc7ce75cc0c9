//! Server configuration.

use std::net::SocketAddr;

use notenschluessel_registry::{RateLimitConfig, SessionConfig};

/// Default port to listen on.
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Enable per-address rate limiting of result submissions.
    pub rate_limiting: bool,

    /// Enable request logging.
    pub request_logging: bool,

    /// Production mode: session cookies are marked `Secure`.
    pub production: bool,

    /// Session store settings.
    pub session: SessionConfig,

    /// Rate limiter settings.
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            rate_limiting: true,
            request_logging: true,
            production: false,
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new server config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable rate limiting.
    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.rate_limiting = enabled;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Enable or disable production mode.
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Set the session store configuration.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the rate limiter configuration.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}
