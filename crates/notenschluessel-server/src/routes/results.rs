//! Stored calculation results.
//!
//! A result is stored once per submission under a fresh session id. The id
//! is handed back both in the body and as an `HttpOnly` cookie so that the
//! browser can fetch the result again for downloads.

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use notenschluessel_types::GradeReport;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cookie::{clear_session_cookie, session_cookie, session_id_from_headers};
use crate::error::{Result, ServerError};
use crate::ratelimit::rate_limit_middleware;
use crate::state::AppState;

/// Response to a stored submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Session id under which the result was stored.
    pub session_id: String,
    /// Seconds until the result expires.
    pub expires_in_seconds: u64,
}

/// Store a calculation result and hand out its session id.
pub async fn submit_result_handler(
    State(state): State<AppState>,
    Json(report): Json<GradeReport>,
) -> Result<Response> {
    report.validate().map_err(ServerError::BadRequest)?;

    let students = report.students.len();
    let session_id = state.sessions.create(report)?;
    let ttl = state.sessions.ttl();

    info!(students, "Stored calculation result");

    let cookie = session_cookie(&session_id, ttl, state.config.production)
        .ok_or_else(|| ServerError::Internal("invalid session cookie".to_string()))?;

    let body = SubmitResponse {
        session_id,
        expires_in_seconds: ttl.as_secs(),
    };

    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

/// Pick the session a request refers to.
///
/// An explicit `id` query parameter (download links) names a specific
/// result and wins over whatever session the cookie carries.
fn requested_session(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    query
        .get("id")
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| session_id_from_headers(headers))
}

/// Fetch the result stored for the requested session.
pub async fn get_result_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<GradeReport>> {
    let session_id = requested_session(&headers, &query)
        .ok_or_else(|| ServerError::NotFound("no such result".to_string()))?;

    let report = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| ServerError::NotFound("no such result".to_string()))?;

    debug!(students = report.students.len(), "Served stored result");

    Ok(Json(GradeReport::clone(&report)))
}

/// Discard the requested stored result and clear the cookie.
pub async fn delete_result_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(session_id) = requested_session(&headers, &query) {
        state.sessions.delete(&session_id);
    }

    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(state.config.production))],
    )
        .into_response()
}

/// Create result routes. Only submissions are rate limited.
pub fn result_routes(state: AppState) -> Router<AppState> {
    Router::new().route(
        "/api/v1/results",
        post(submit_result_handler)
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
            .get(get_result_handler)
            .delete(delete_result_handler),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cookie_for(id: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(id));
        headers
    }

    fn query_id(id: &str) -> HashMap<String, String> {
        HashMap::from([("id".to_string(), id.to_string())])
    }

    #[test]
    fn test_query_id_wins_over_cookie() {
        let headers = cookie_for("session_id=bbbb");
        assert_eq!(
            requested_session(&headers, &query_id("aaaa")).as_deref(),
            Some("aaaa")
        );
    }

    #[test]
    fn test_cookie_used_without_query_id() {
        let headers = cookie_for("session_id=bbbb");
        assert_eq!(
            requested_session(&headers, &HashMap::new()).as_deref(),
            Some("bbbb")
        );
        assert_eq!(
            requested_session(&headers, &query_id("  ")).as_deref(),
            Some("bbbb")
        );
    }

    #[test]
    fn test_no_session_requested() {
        assert!(requested_session(&HeaderMap::new(), &HashMap::new()).is_none());
    }
}
