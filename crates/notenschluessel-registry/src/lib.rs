//! Concurrent, time-bounded in-memory registries.
//!
//! This crate provides one generic building block and two instantiations of it:
//! - [`TtlRegistry`]: a thread-safe key to entry map with per-entry expiry,
//!   get-or-create semantics and sweep-based reclamation
//! - [`SessionStore`]: calculation results keyed by an unguessable session id,
//!   expiring a fixed time after they were stored
//! - [`RateLimiter`]: one token bucket per client address, reclaimed after a
//!   period of inactivity
//!
//! Each store owns a [`Reaper`], a background task that periodically sweeps
//! expired entries independent of request traffic.
//!
//! # Example
//!
//! ```rust,ignore
//! use notenschluessel_registry::{RateLimitConfig, RateLimiter, SessionConfig, SessionStore};
//!
//! let sessions = SessionStore::new(SessionConfig::default())?;
//! let id = sessions.create(report)?;
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default())?;
//! if !limiter.check("203.0.113.7") {
//!     // respond with 429
//! }
//! ```

mod clock;
mod config;
mod error;
mod ratelimit;
mod reaper;
mod registry;
mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RateLimitConfig, SessionConfig};
pub use error::{Error, Result};
pub use ratelimit::{AddressLimiter, RateLimiter};
pub use reaper::{Reaper, Sweep};
pub use registry::{Expiry, RegistryEntry, RegistryStats, TtlRegistry};
pub use session::{SESSION_ID_LEN, SessionStore, generate_session_id};
