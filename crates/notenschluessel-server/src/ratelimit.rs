//! Per-address rate limiting and access logging middleware.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::client_ip::client_ip;
use crate::cookie::session_id_from_headers;
use crate::error::ServerError;
use crate::state::AppState;

/// Client address of a request, using the socket peer recorded by
/// `into_make_service_with_connect_info` as the last resort.
fn request_client_ip(request: &Request<Body>) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(request.headers(), peer)
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Rate limiting middleware keyed by client address.
///
/// Each address gets its own token bucket from the shared [`RateLimiter`].
/// Rejected requests are logged as security events and answered with 429.
///
/// [`RateLimiter`]: notenschluessel_registry::RateLimiter
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limiting {
        return next.run(request).await;
    }

    let ip = request_client_ip(&request);

    if state.rate_limiter.check(&ip) {
        return next.run(request).await;
    }

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    tracing::warn!(
        ip = %ip,
        path = %request.uri().path(),
        method = %request.method(),
        user_agent,
        "Rate limit exceeded"
    );

    let refill = state.rate_limiter.config().refill_interval();
    let retry_after_seconds = (refill.as_secs() + u64::from(refill.subsec_nanos() > 0)).max(1);

    ServerError::RateLimitExceeded {
        retry_after_seconds,
    }
    .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Access Log
// ─────────────────────────────────────────────────────────────────────────────

/// Access log for every request.
///
/// Records the resolved client address next to method, path, status and
/// latency, and whether the request carried a session cookie. Server errors
/// log at `error`, rejected requests at `warn`, the rest at `info`.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let ip = request_client_ip(&request);
    let has_session = session_id_from_headers(request.headers()).is_some();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = response.status().as_u16();

    match response.status() {
        s if s.is_server_error() => tracing::error!(
            ip = %ip, %method, path = %path, status, elapsed_ms, has_session,
            "Request failed"
        ),
        s if s.is_client_error() => tracing::warn!(
            ip = %ip, %method, path = %path, status, elapsed_ms, has_session,
            "Request rejected"
        ),
        _ => tracing::info!(
            ip = %ip, %method, path = %path, status, elapsed_ms, has_session,
            "Request served"
        ),
    }

    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
