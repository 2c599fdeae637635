//! Follower node: serves reads, absorbs replicated writes, refuses
//! direct writes. Makes no outbound calls in steady state and has no
//! knowledge of any other follower.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kv::hitcounter::{CounterMode, HitCounter};
use kv::ratelimit::RateLimiter;
use kv::store::VersionedStore;
use log::{debug, warn};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::client_key;
use super::config::FollowerConfig;

pub struct AppState {
    pub config: FollowerConfig,
    pub store: VersionedStore,
    pub limiter: RateLimiter,
    pub counter: HitCounter,
    pub reads: AtomicU64,
    pub rejections: AtomicU64,
}

impl AppState {
    pub fn new(config: FollowerConfig) -> Self {
        Self {
            config,
            store: VersionedStore::new(),
            limiter: RateLimiter::new(100, Duration::from_secs(1)),
            counter: HitCounter::new(CounterMode::RateLimit),
            reads: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/get/:key", get(get_key))
        .route("/set", post(reject_write))
        .route("/replicate", post(replicate))
        .route("/all", get(all))
        .route("/keys", get(keys))
        .route("/stats", get(stats))
        .route("/compare", get(compare))
        .route("/clear", post(clear))
        .layer(middleware::from_fn_with_state(state.clone(), front_door))
        .with_state(state)
}

async fn front_door(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let client = client_key(connect_info.as_ref());
    match super::admit(&state.limiter, &state.counter, &path, &client) {
        Ok(()) => next.run(req).await,
        Err(resp) => resp,
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "role": "follower",
        "node_id": state.config.node_id,
        "leader_url": state.config.leader_url,
        "store_size": state.store.size(),
        "version": state.store.get_version(),
    }))
}

async fn get_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    state.reads.fetch_add(1, Ordering::Relaxed);
    match state.store.get(&key) {
        Some(entry) => Json(json!({
            "key": key,
            "value": entry.value,
            "version": entry.version,
            "node": state.config.node_id,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Key not found", "key": key })),
        )
            .into_response(),
    }
}

async fn reject_write(State(state): State<Arc<AppState>>) -> Response {
    state.rejections.fetch_add(1, Ordering::Relaxed);
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Writes not allowed on follower",
            "leader_url": state.config.leader_url,
            "node": state.config.node_id,
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct ReplicateRequest {
    key: Option<String>,
    value: Option<serde_json::Value>,
    version: Option<u64>,
}

async fn replicate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReplicateRequest>,
) -> Response {
    let (key, value, version) = match (body.key, body.value, body.version) {
        (Some(k), Some(v), Some(ver)) => (k, v, ver),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "missing field: key, value and version are required" })),
            )
                .into_response()
        }
    };

    match state.store.apply_write(&key, value, version) {
        Ok(installed) => {
            debug!(
                "replicate key={} version={} installed={}",
                key, version, installed
            );
            Json(json!({
                "success": true,
                "key": key,
                "version": version,
                "node": state.config.node_id,
            }))
            .into_response()
        }
        Err(err) => {
            warn!("replicate failed for key={}: {}", key, err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

async fn all(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.store.get_all()))
}

async fn keys(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "keys": state.store.keys() }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "node": state.config.node_id,
        "reads": state.reads.load(Ordering::Relaxed),
        "rejections": state.rejections.load(Ordering::Relaxed),
        "store_size": state.store.size(),
        "version": state.store.get_version(),
    }))
}

/// A convergence digest: store size, global version, and per-key
/// versions, so an operator or test can diff followers against each
/// other without consulting the leader's write log.
async fn compare(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let entries = state.store.get_all();
    let versions: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(k, e)| (k.clone(), json!(e.version)))
        .collect();
    Json(json!({
        "node": state.config.node_id,
        "store_size": state.store.size(),
        "version": state.store.get_version(),
        "key_versions": versions,
    }))
}

async fn clear(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.store.clear();
    state.reads.store(0, Ordering::Relaxed);
    state.rejections.store(0, Ordering::Relaxed);
    Json(json!({ "success": true }))
}
