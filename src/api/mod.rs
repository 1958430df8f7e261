//! HTTP/JSON admin façade, fleshed out from the original Flask app
//! (`api.py`/`wsgi.py`): start/stop the scheduler, submit messages singly
//! or in bulk, inspect stats and recent logs, and a tiny status page.
//!
//! The scheduler core is synchronous (a blocking `std::sync::Mutex`, and
//! `S3Persistence` blocks on its tokio handle), so every handler that
//! touches it runs the call inside `tokio::task::spawn_blocking` rather
//! than on an async worker thread.

use crate::models::Message;
use crate::scheduler::Scheduler;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower::ServiceBuilder;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

/// Build the router. `state` is cloned into every handler (cheap — it's
/// two `Arc`s under the hood).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/api/send", post(send))
        .route("/api/send-bulk", post(send_bulk))
        .route("/api/stats", get(stats))
        .route("/api/success", get(recent_success))
        .route("/api/failed", get(recent_failed))
        .route("/api/config", get(get_config).post(post_config))
        .layer(ServiceBuilder::new().layer(tower_http::trace::TraceLayer::new_for_http()))
        .with_state(state)
}

struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.0,
            Json(json!({"status": "error", "message": self.1})),
        )
            .into_response()
    }
}

fn internal(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::INTERNAL_SERVER_ERROR, message.into())
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, message.into())
}

async fn index() -> Html<&'static str> {
    Html(include_str!("status.html"))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = state.scheduler.clone();
    let running = tokio::task::spawn_blocking(move || scheduler.is_running())
        .await
        .unwrap_or(false);
    Json(json!({"status": "healthy", "scheduler_running": running}))
}

async fn start(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let scheduler = state.scheduler.clone();
    tokio::task::spawn_blocking(move || scheduler.start())
        .await
        .map_err(|e| internal(format!("join error: {e}")))?;
    Ok(Json(json!({"status": "success", "message": "Scheduler started"})))
}

async fn stop(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let scheduler = state.scheduler.clone();
    tokio::task::spawn_blocking(move || scheduler.stop())
        .await
        .map_err(|e| internal(format!("join error: {e}")))?;
    Ok(Json(json!({"status": "success", "message": "Scheduler stopped"})))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    content: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }

    let message_id = Uuid::new_v4().to_string();
    let mut message = Message::new(message_id.clone(), req.content);
    if let Some(metadata) = req.metadata {
        message = message.with_metadata(metadata);
    }

    let scheduler = state.scheduler.clone();
    tokio::task::spawn_blocking(move || scheduler.new_message(message))
        .await
        .map_err(|e| internal(format!("join error: {e}")))?;

    Ok(Json(json!({"status": "success", "message_id": message_id})))
}

#[derive(Debug, Deserialize)]
struct SendBulkRequest {
    content: String,
    count: usize,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

async fn send_bulk(
    State(state): State<AppState>,
    Json(req): Json<SendBulkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    if req.count == 0 {
        return Err(bad_request("count must be > 0"));
    }

    let mut message_ids = Vec::with_capacity(req.count);
    let mut messages = Vec::with_capacity(req.count);
    for i in 0..req.count {
        let message_id = Uuid::new_v4().to_string();
        // `{'bulk_index': i, **metadata}` order: bulk_index is the base,
        // and the caller's metadata overrides it on key collision.
        let mut metadata = Map::new();
        metadata.insert("bulk_index".to_string(), json!(i));
        if let Some(caller_metadata) = req.metadata.clone() {
            metadata.extend(caller_metadata);
        }
        messages.push(Message::new(message_id.clone(), req.content.clone()).with_metadata(metadata));
        message_ids.push(message_id);
    }

    let scheduler = state.scheduler.clone();
    tokio::task::spawn_blocking(move || {
        for message in messages {
            scheduler.new_message(message);
        }
    })
    .await
    .map_err(|e| internal(format!("join error: {e}")))?;

    Ok(Json(
        json!({"status": "success", "count": req.count, "message_ids": message_ids}),
    ))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let scheduler = state.scheduler.clone();
    let stats = tokio::task::spawn_blocking(move || scheduler.get_stats())
        .await
        .map_err(|e| internal(format!("join error: {e}")))?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    100
}

async fn recent_success(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = state.scheduler.clone();
    let messages = tokio::task::spawn_blocking(move || scheduler.get_recent_success(query.limit))
        .await
        .map_err(|e| internal(format!("join error: {e}")))?
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(json!({"count": messages.len(), "messages": messages})))
}

async fn recent_failed(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduler = state.scheduler.clone();
    let messages = tokio::task::spawn_blocking(move || scheduler.get_recent_failed(query.limit))
        .await
        .map_err(|e| internal(format!("join error: {e}")))?
        .map_err(|e| internal(e.to_string()))?;
    Ok(Json(json!({"count": messages.len(), "messages": messages})))
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    // Fixed at construction, no lock held — safe to read directly rather
    // than through spawn_blocking.
    Json(state.scheduler.get_config())
}

async fn post_config() -> impl IntoResponse {
    // Configuration is resolved once at process start and handed to
    // immutable collaborators (the Persistence Port already captured its
    // prefixes by construction), so there is nothing to apply here.
    Json(json!({"status": "success", "message": "Config update requires restart"}))
}
