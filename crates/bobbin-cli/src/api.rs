//! HTTP surface: submit a job, read its status.
//!
//! - `POST /jobs`            -> 201 `{id, status}`
//! - `GET  /jobs/{id}`       -> 200 job view
//! - `GET  /jobs?id=...`     -> 200 job view
//! - `OPTIONS` on any path   -> 204
//! - anything else           -> 404 `{"error": "not found"}`
//!
//! Every response allows any origin.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bobbin_core::app::{App, Producer, StatusReader, SubmitRequest};
use bobbin_core::domain::{BobbinError, Classify, ErrorKind, ValidationError};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct ApiState {
    producer: Arc<Producer>,
    status: Arc<StatusReader>,
}

impl ApiState {
    pub fn new(app: &App) -> Self {
        Self {
            producer: Arc::clone(&app.producer),
            status: Arc::clone(&app.status),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", get(get_job_by_query).post(create_job))
        .route("/jobs/{id}", get(get_job))
        .fallback(fallback)
        .method_not_allowed_fallback(fallback)
        .with_state(state)
        .layer(cors)
}

async fn create_job(State(state): State<ApiState>, body: Bytes) -> Response {
    // 空のボディは {} と同じ扱い
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        SubmitRequest::default()
    } else {
        match serde_json::from_slice::<SubmitRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return error_response(ValidationError::new("body", e.to_string()).into());
            }
        }
    };

    match state.producer.submit(request).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    status_response(&state, &id).await
}

#[derive(Debug, Deserialize)]
struct JobQuery {
    id: Option<String>,
}

async fn get_job_by_query(State(state): State<ApiState>, Query(query): Query<JobQuery>) -> Response {
    status_response(&state, query.id.as_deref().unwrap_or_default()).await
}

async fn status_response(state: &ApiState, id: &str) -> Response {
    match state.status.get_status(id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "not found"})),
    )
        .into_response()
}

fn error_response(err: BobbinError) -> Response {
    let (status, code) = match err.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation_error"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorKind::Transient => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        ErrorKind::Permanent => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    json_error(status, code, err.to_string())
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
