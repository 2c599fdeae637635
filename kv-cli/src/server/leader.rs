//! Leader node: sole acceptor of writes. Every accepted write is applied
//! locally first, then fanned out to all followers concurrently through
//! a bounded worker pool; the handler returns to the client as soon as
//! the configured quorum of followers has acknowledged, while the
//! remaining replication attempts keep running to completion in the
//! background.

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use kv::hitcounter::{CounterMode, HitCounter};
use kv::ratelimit::RateLimiter;
use kv::store::VersionedStore;
use log::{debug, info, warn};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use super::client_key;
use super::config::LeaderConfig;

#[derive(Debug, Default)]
pub struct Stats {
    pub writes_total: u64,
    pub writes_successful: u64,
    pub writes_failed: u64,
    pub replication_successes: u64,
    pub replication_failures: u64,
}

pub struct AppState {
    pub config: LeaderConfig,
    pub store: VersionedStore,
    pub limiter: RateLimiter,
    pub counter: HitCounter,
    pub stats: Mutex<Stats>,
    pub http_client: reqwest::Client,
    pub replication_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: LeaderConfig) -> Self {
        let replication_semaphore = Arc::new(Semaphore::new(config.replication_workers.max(1)));
        Self {
            limiter: RateLimiter::new(100, Duration::from_secs(1)),
            counter: HitCounter::new(CounterMode::RateLimit),
            stats: Mutex::new(Stats::default()),
            http_client: reqwest::Client::new(),
            replication_semaphore,
            store: VersionedStore::new(),
            config,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/get/:key", get(get_key))
        .route("/set", post(set_key))
        .route("/delete/:key", delete(delete_key))
        .route("/all", get(all))
        .route("/keys", get(keys))
        .route("/stats", get(stats))
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
        "role": "leader",
        "followers": state.config.followers,
        "write_quorum": state.config.write_quorum_clamped(),
        "min_delay": state.config.min_delay.as_secs_f64(),
        "max_delay": state.config.max_delay.as_secs_f64(),
        "store_size": state.store.size(),
        "version": state.store.get_version(),
    }))
}

async fn get_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    match state.store.get(&key) {
        Some(entry) => Json(json!({ "key": key, "value": entry.value, "version": entry.version }))
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Key not found", "key": key })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct SetRequest {
    key: Option<String>,
    value: Option<serde_json::Value>,
}

async fn set_key(State(state): State<Arc<AppState>>, Json(body): Json<SetRequest>) -> Response {
    let (key, value) = match (body.key, body.value) {
        (Some(k), Some(v)) => (k, v),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "missing field: key and value are required" })),
            )
                .into_response()
        }
    };

    {
        let mut stats = state.stats.lock().unwrap();
        stats.writes_total += 1;
    }

    let version = match state.store.set(&key, value.clone()) {
        Ok(v) => v,
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    };

    let quorum = state.config.write_quorum_clamped();
    let replication = replicate_write(state.clone(), key.clone(), value.clone(), version, quorum).await;

    let mut stats = state.stats.lock().unwrap();
    if replication.success {
        stats.writes_successful += 1;
    } else {
        stats.writes_failed += 1;
    }
    drop(stats);

    let status = if replication.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(json!({
            "success": replication.success,
            "key": key,
            "value": value,
            "version": version,
            "replication": {
                "success": replication.success,
                "confirmations": replication.confirmations,
                "quorum_required": quorum,
                "details": replication.details,
            },
        })),
    )
        .into_response()
}

async fn delete_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let existed = state.store.delete(&key);
    Json(json!({ "success": existed, "key": key })).into_response()
}

async fn all(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!(state.store.get_all()))
}

async fn keys(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "keys": state.store.keys() }))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let s = state.stats.lock().unwrap();
    Json(json!({
        "writes_total": s.writes_total,
        "writes_successful": s.writes_successful,
        "writes_failed": s.writes_failed,
        "replication_successes": s.replication_successes,
        "replication_failures": s.replication_failures,
        "store_size": state.store.size(),
        "version": state.store.get_version(),
    }))
}

async fn clear(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.store.clear();
    *state.stats.lock().unwrap() = Stats::default();
    Json(json!({ "success": true }))
}

#[derive(serde::Serialize, Clone)]
struct FollowerResult {
    success: bool,
    follower: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    delay: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct ReplicationOutcome {
    success: bool,
    confirmations: usize,
    details: Vec<FollowerResult>,
}

/// Fans `key`/`value`/`version` out to every configured follower, returns
/// to the caller as soon as `quorum` have acknowledged (or immediately,
/// for `quorum == 0`), and leaves the remaining attempts running as
/// detached tasks that update replication stats when they eventually
/// complete.
async fn replicate_write(
    state: Arc<AppState>,
    key: String,
    value: serde_json::Value,
    version: u64,
    quorum: usize,
) -> ReplicationOutcome {
    let followers = state.config.followers.clone();
    if followers.is_empty() {
        return ReplicationOutcome { success: true, confirmations: 0, details: Vec::new() };
    }

    let (tx, mut rx) = mpsc::channel::<FollowerResult>(followers.len().max(1));

    for follower in followers {
        let state = state.clone();
        let key = key.clone();
        let value = value.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let permit = state.replication_semaphore.clone().acquire_owned().await.unwrap();
            let delay = rand_delay(state.config.min_delay, state.config.max_delay);
            tokio::time::sleep(delay).await;

            let outcome = send_replicate(&state.http_client, &follower, &key, &value, version, state.config.replication_timeout).await;
            drop(permit);

            let result = match outcome {
                Ok(()) => {
                    state.stats.lock().unwrap().replication_successes += 1;
                    FollowerResult {
                        success: true,
                        follower: follower.clone(),
                        delay: Some(delay.as_secs_f64()),
                        error: None,
                    }
                }
                Err(err) => {
                    state.stats.lock().unwrap().replication_failures += 1;
                    warn!("replication to {} failed: {}", follower, err);
                    FollowerResult {
                        success: false,
                        follower: follower.clone(),
                        delay: Some(delay.as_secs_f64()),
                        error: Some(err),
                    }
                }
            };

            // Dropped silently once the handler has already returned and
            // the receiver side is gone — that is the point.
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    if quorum == 0 {
        // Fire-and-forget: the spawned tasks above keep running detached,
        // but the handler does not wait on any of them.
        return ReplicationOutcome { success: true, confirmations: 0, details: Vec::new() };
    }

    let mut confirmations = 0usize;
    let mut details = Vec::new();
    while let Some(result) = rx.recv().await {
        if result.success {
            confirmations += 1;
        }
        details.push(result);
        if confirmations >= quorum {
            debug!("quorum {} reached for key={} version={}", quorum, key, version);
            return ReplicationOutcome { success: true, confirmations, details };
        }
    }

    info!(
        "quorum {} not reached for key={} version={}, got {}",
        quorum, key, version, confirmations
    );
    ReplicationOutcome { success: confirmations >= quorum, confirmations, details }
}

fn rand_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let secs = rng.gen_range(min.as_secs_f64()..max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

async fn send_replicate(
    client: &reqwest::Client,
    follower: &str,
    key: &str,
    value: &serde_json::Value,
    version: u64,
    timeout: Duration,
) -> Result<(), String> {
    let url = format!("{}/replicate", follower.trim_end_matches('/'));
    let resp = client
        .post(&url)
        .json(&json!({ "key": key, "value": value, "version": version }))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("follower responded with status {}", resp.status()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_state(followers: Vec<String>, write_quorum: usize) -> Arc<AppState> {
        Arc::new(AppState::new(LeaderConfig {
            followers,
            write_quorum,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            ..LeaderConfig::default()
        }))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_leader_role() {
        let app = router(test_state(Vec::new(), 0));
        let resp = app
            .oneshot(Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["role"], "leader");
    }

    #[tokio::test]
    async fn set_with_no_followers_succeeds_with_zero_confirmations() {
        let app = router(test_state(Vec::new(), 0));
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/set")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(json!({ "key": "k1", "value": "v1" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["version"], 1);
        assert_eq!(body["replication"]["confirmations"], 0);
    }

    #[tokio::test]
    async fn set_missing_fields_is_400() {
        let app = router(test_state(Vec::new(), 0));
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/set")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(json!({ "key": "k1" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_missing_key_is_404() {
        let app = router(test_state(Vec::new(), 0));
        let resp = app
            .oneshot(Request::builder().uri("/get/missing").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn quorum_with_unreachable_followers_fails_but_keeps_local_write() {
        let app = router(test_state(vec!["http://127.0.0.1:1".to_string()], 1));
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/set")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(json!({ "key": "k1", "value": "v1" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);

        let resp = app
            .oneshot(Request::builder().uri("/get/k1").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["value"], "v1");
    }
}
