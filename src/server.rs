//! HTTP surface of the proxy.
//!
//! Three JSON routes for the application plus a liveness endpoint:
//!
//! - `POST /api/allow` - allow/deny check against the decision engine
//! - `GET /api/encrypt-email` - debugging endpoint exposing the pseudonymizer
//! - `POST /api/log` - enqueue one activity record for bulk shipping
//! - `GET /health` - liveness probe
//!
//! The surface owns boundary concerns the core never sees: defaulting the
//! user-agent from the transport header, defaulting `event_type` to the
//! endpoint, and field-presence validation.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::DecisionEngine;
use crate::models::{CheckRequest, CheckResponse, LogEntry};
use crate::shipper::LogShipper;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DecisionEngine>,
    pub shipper: LogShipper,
}

/// Build the router for the proxy surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/allow", post(allow_decision))
        .route("/api/encrypt-email", get(encrypt_email))
        .route("/api/log", post(queue_log))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind and serve the router until the shutdown token fires.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(
    state: AppState,
    addr: &str,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "proxy surface listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("proxy surface shutting down");
        })
        .await?;

    Ok(())
}

/// Allow/deny check.
async fn allow_decision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<CheckRequest>,
) -> (StatusCode, Json<CheckResponse>) {
    if request.user_agent.is_empty() {
        request.user_agent = header_user_agent(&headers);
    }

    if let Err(error) = request.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(CheckResponse::from_error(&error)),
        );
    }

    match state.engine.check(request).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(error) => {
            warn!(%error, "check failed");
            (error.status_code(), Json(CheckResponse::from_error(&error)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct EncryptEmailQuery {
    #[serde(default)]
    email: String,
}

/// Pseudonymization debugging endpoint: shows the token an email maps to.
async fn encrypt_email(
    State(state): State<AppState>,
    Query(query): Query<EncryptEmailQuery>,
) -> impl IntoResponse {
    if query.email.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing email query parameter").into_response();
    }

    let encrypted = state.engine.pseudonymize_email(&query.email);
    Json(json!({
        "email": query.email,
        "encrypted": encrypted,
    }))
    .into_response()
}

/// Enqueue one activity record. Returns as soon as the entry is buffered.
async fn queue_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut entry): Json<LogEntry>,
) -> (StatusCode, Json<serde_json::Value>) {
    if entry.user_agent.is_empty() {
        entry.user_agent = header_user_agent(&headers);
    }

    if let Err(error) = entry.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "failure", "error": error.to_string()})),
        );
    }

    if entry.event_type.is_empty() {
        entry.event_type = entry.endpoint.clone();
    }

    state.shipper.queue(entry);

    (
        StatusCode::OK,
        Json(json!({"status": "success", "message": "Log queued"})),
    )
}

/// Liveness probe.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn header_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
