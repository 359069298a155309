//! Mock decision service for integration testing.
//!
//! Provides a configurable upstream speaking the batch, individual, and log
//! endpoints, recording everything it receives so tests can assert on the
//! exact wire traffic.
//!
//! Note: Some accessors are provided for future test expansion and may not
//! be used by every suite. They are marked with `#[allow(dead_code)]`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Mock upstream decision service.
///
/// Allows configuring:
/// - Keys that receive a deny verdict (everything else is allowed)
/// - Response status per endpoint (for error-path testing)
/// - A raw batch response body (for decode-failure testing)
#[derive(Debug, Clone)]
pub struct MockUpstream {
    blocked: HashSet<String>,
    batch_status: StatusCode,
    log_status: StatusCode,
    batch_raw_body: Option<String>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            blocked: HashSet::new(),
            batch_status: StatusCode::OK,
            log_status: StatusCode::OK,
            batch_raw_body: None,
        }
    }

    /// Deny this key in batch and individual responses.
    #[must_use]
    pub fn with_blocked_key(mut self, key: &str) -> Self {
        self.blocked.insert(key.to_string());
        self
    }

    /// Answer batch requests with this status instead of 200.
    #[must_use]
    pub fn with_batch_status(mut self, status: StatusCode) -> Self {
        self.batch_status = status;
        self
    }

    /// Answer log shipments with this status instead of 200.
    #[must_use]
    pub fn with_log_status(mut self, status: StatusCode) -> Self {
        self.log_status = status;
        self
    }

    /// Answer batch requests with this literal body (status stays 200).
    #[must_use]
    pub fn with_batch_raw_body(mut self, body: &str) -> Self {
        self.batch_raw_body = Some(body.to_string());
        self
    }

    /// Start the mock server and return its address and handle.
    pub async fn start(self) -> (SocketAddr, MockUpstreamHandle) {
        let state = Arc::new(MockState {
            blocked: self.blocked,
            batch_status: self.batch_status,
            log_status: self.log_status,
            batch_raw_body: self.batch_raw_body,
            batch_requests: RwLock::new(Vec::new()),
            log_batches: RwLock::new(Vec::new()),
            api_keys: RwLock::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/allow/batch", post(handle_batch))
            .route("/api/allow", post(handle_single))
            .route("/api/logs", post(handle_logs))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockUpstreamHandle {
                state,
                _handle: handle,
            },
        )
    }
}

impl Default for MockUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct MockState {
    blocked: HashSet<String>,
    batch_status: StatusCode,
    log_status: StatusCode,
    batch_raw_body: Option<String>,
    batch_requests: RwLock<Vec<Vec<String>>>,
    log_batches: RwLock<Vec<Value>>,
    api_keys: RwLock<Vec<Option<String>>>,
}

/// Handle to the running mock server.
pub struct MockUpstreamHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockUpstreamHandle {
    /// Key lists received on the batch endpoint, in arrival order.
    pub async fn batch_requests(&self) -> Vec<Vec<String>> {
        self.state.batch_requests.read().await.clone()
    }

    /// Number of batch calls received.
    pub async fn batch_call_count(&self) -> usize {
        self.state.batch_requests.read().await.len()
    }

    /// Bodies received on the log endpoint, one JSON value per shipment.
    pub async fn log_batches(&self) -> Vec<Value> {
        self.state.log_batches.read().await.clone()
    }

    /// `X-API-Key` header values observed, one per request (None = absent).
    pub async fn api_keys_seen(&self) -> Vec<Option<String>> {
        self.state.api_keys.read().await.clone()
    }
}

async fn record_api_key(state: &MockState, headers: &HeaderMap) {
    let key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    state.api_keys.write().await.push(key);
}

async fn handle_batch(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    record_api_key(&state, &headers).await;

    let keys: Vec<String> = serde_json::from_slice(&body).unwrap_or_default();
    state.batch_requests.write().await.push(keys.clone());

    if state.batch_status != StatusCode::OK {
        return (state.batch_status, String::new());
    }
    if let Some(raw) = &state.batch_raw_body {
        return (StatusCode::OK, raw.clone());
    }

    let decisions: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "key": key,
                "allow": !state.blocked.contains(key),
            })
        })
        .collect();
    (StatusCode::OK, json!(decisions).to_string())
}

async fn handle_single(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    record_api_key(&state, &headers).await;

    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let ip = request["ip_address"].as_str().unwrap_or_default();
    let allow = !state.blocked.contains(ip);

    (
        StatusCode::OK,
        json!({"allow": allow, "status": "success"}).to_string(),
    )
}

async fn handle_logs(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    record_api_key(&state, &headers).await;

    let batch: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.log_batches.write().await.push(batch);

    (state.log_status, String::new())
}
