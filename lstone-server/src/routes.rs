/// HTTP endpoints
///
/// - `GET /metrics`: Prometheus text format
/// - `GET /health`: liveness
/// - `GET /ready`: 200 while the checker is running (or disabled), 503 otherwise
/// - `GET /api/links/:id`: recorded health state of one link
/// - `POST /api/check`: run one pass now and return its summary

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lstone_checker::{metrics, CancellationToken, SchedulerState, StatusChecker};
use lstone_core::{EntityId, StatusRepository};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn StatusRepository>,
    pub checker: Arc<StatusChecker>,
    pub cancel: CancellationToken,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/api/links/:id", get(link_status))
        .route("/api/check", post(trigger_check))
        .with_state(state)
}

async fn metrics_handler() -> String {
    metrics::encode_metrics().unwrap_or_else(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        String::from("# Error encoding metrics\n")
    })
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    let ready = !state.checker.config().enabled || state.checker.state() == SchedulerState::Running;
    if ready {
        "OK".into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response()
    }
}

async fn link_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, AppError> {
    match state.repository.get_by_id(&EntityId::new(id.clone())).await? {
        Some(link) => Ok(Json(link).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no status recorded for {}", id) })),
        )
            .into_response()),
    }
}

/// Pass summary returned by `POST /api/check`
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub due: usize,
    pub alive: usize,
    pub gone: usize,
    pub server_error: usize,
    pub probe_failed: usize,
    pub archive_found: usize,
    pub persist_failed: usize,
    pub duration_ms: u64,
}

async fn trigger_check(State(state): State<AppState>) -> Result<Json<CheckSummary>, AppError> {
    let report = state.checker.run_once(state.cancel.clone()).await?;
    Ok(Json(CheckSummary {
        due: report.due,
        alive: report.alive,
        gone: report.gone,
        server_error: report.server_error,
        probe_failed: report.probe_failed,
        archive_found: report.archive_found,
        persist_failed: report.persist_failed,
        duration_ms: report.duration.as_millis() as u64,
    }))
}

/// Error type for handlers
pub struct AppError(lstone_core::Error);

impl From<lstone_core::Error> for AppError {
    fn from(err: lstone_core::Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.0.to_string(), "code": self.0.code() })),
        )
            .into_response()
    }
}
