//! Shared HTTP conventions for the leader and follower nodes: both speak
//! JSON over HTTP/1.1 and both need the same rate-limit/hit-count front
//! door and the same "turn a store error into a status code" shape.

pub mod config;
pub mod follower;
pub mod leader;

use axum::extract::ConnectInfo;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kv::hitcounter::HitCounter;
use kv::ratelimit::RateLimiter;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Extracts the caller's IP for rate-limiting purposes. Falls back to a
/// fixed key when the connection info is unavailable (e.g. in tests that
/// drive the router directly via `oneshot` without a real socket).
pub fn client_key(addr: Option<&ConnectInfo<SocketAddr>>) -> String {
    addr.map(|ConnectInfo(a)| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Applies the shared front door: rate limiting gates the request before
/// any work, including hit counting, begins — a denied request is never
/// counted as a hit.
pub fn admit(
    limiter: &RateLimiter,
    counter: &HitCounter,
    path: &str,
    client: &str,
) -> Result<(), Response> {
    if !limiter.allow(client) {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate limit exceeded" })),
        )
            .into_response());
    }
    counter.increment(path);
    Ok(())
}

/// Wraps a `kv::error::Error` as a 500 JSON response. Store errors that
/// reach the HTTP layer are always precondition violations (e.g. an
/// empty key), never routine conditions — those are handled explicitly
/// by each handler before they ever call into the store.
pub struct StoreError(pub kv::error::Error);

impl From<kv::error::Error> for StoreError {
    fn from(err: kv::error::Error) -> Self {
        StoreError(err)
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub type Shared<T> = Arc<T>;
