//! HTTP server for Notenschluessel.
//!
//! Stores computed grading results under short-lived sessions and serves
//! them back for download. Calculation and file export happen elsewhere;
//! this crate only owns the transport around the session store and the
//! per-address rate limiter.
//!
//! # Features
//!
//! - Result submission, retrieval and deletion keyed by session cookie
//! - Per-address rate limiting of submissions
//! - Security response headers
//! - Request logging
//!
//! # Example
//!
//! ```ignore
//! use notenschluessel_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::new().with_bind_address("127.0.0.1:8080".parse()?);
//! let server = Server::new(config)?;
//! server.run().await?;
//! ```

pub mod client_ip;
pub mod config;
pub mod cookie;
pub mod error;
pub mod headers;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use client_ip::client_ip;
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use headers::security_headers_middleware;
pub use ratelimit::{rate_limit_middleware, request_logging_middleware};
pub use routes::{HealthResponse, SubmitResponse};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Notenschluessel HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a new server with the given configuration.
    ///
    /// Starts the session and rate limiter reapers, so this must run inside
    /// a tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Get the shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::health_routes())
            .merge(routes::result_routes(self.state.clone()))
            // Request logging (inner layer, sees the final status)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::request_logging_middleware,
            ))
            .layer(middleware::from_fn(headers::security_headers_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until the process is killed.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` completes, then stop the reapers.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind_address;
        self.run_on(addr, shutdown).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        info!("Starting server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        self.state.shutdown();
        info!(sessions = self.state.sessions.count(), "Server stopped");

        served
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
pub(crate) fn test_report() -> notenschluessel_types::GradeReport {
    use notenschluessel_types::{GradeBound, GradeReport};

    GradeReport {
        max_points: 100,
        min_points: 50.0,
        break_point_percent: 50.0,
        grade_bounds: (1..=5)
            .map(|grade| GradeBound {
                grade,
                lower_bound: f64::from(100 - u32::from(grade) * 20),
                upper_bound: f64::from(120 - u32::from(grade) * 20),
            })
            .collect(),
        students: Vec::new(),
        average_grade: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use notenschluessel_registry::{RateLimitConfig, SessionConfig};
    use tower::ServiceExt;

    fn test_config() -> ServerConfig {
        ServerConfig::new()
            .with_session(SessionConfig::new().with_cleanup_task(false))
            .with_rate_limit(RateLimitConfig::new().with_cleanup_task(false))
    }

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let server = Server::new(test_config()).unwrap();
        let app = server.router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }

    #[tokio::test]
    async fn test_server_starts_reapers_by_default() {
        let server = Server::new(ServerConfig::default()).unwrap();
        assert!(server.state().sessions.has_reaper());
        assert!(server.state().rate_limiter.has_reaper());
        server.state().shutdown();
    }

    #[test]
    fn test_server_config_builder() {
        let config = test_config()
            .with_bind_address("127.0.0.1:9000".parse().unwrap())
            .with_production(true);

        let server = Server::from_state(AppState::new(config).unwrap());
        assert_eq!(server.bind_address().port(), 9000);
        assert!(server.state().config.production);
    }
}
