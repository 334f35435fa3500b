//! Manager HTTP surface.
//!
//! All bodies are JSON; failures are `{"detail": ...}` with the status
//! code carrying the error class (404 unknown alias, 503 out of memory,
//! 500 startup failure). No stack traces cross this boundary.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::supervisor::{SpawnError, Supervisor};

pub fn router(supervisor: Arc<Supervisor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/spawn/{alias}", post(spawn))
        .route("/stop/{alias}", post(stop))
        .route("/touch/{alias}", post(touch))
        .route("/stop-all", post(stop_all))
        .layer(TraceLayer::new_for_http())
        .with_state(supervisor)
}

async fn health(State(supervisor): State<Arc<Supervisor>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "workers": supervisor.worker_count(),
    }))
}

async fn status(State(supervisor): State<Arc<Supervisor>>) -> Response {
    Json(supervisor.status()).into_response()
}

/// Runs detached so a disconnecting caller cannot cancel a spawn midway
/// and leave an untracked child behind.
async fn spawn(
    State(supervisor): State<Arc<Supervisor>>,
    Path(alias): Path<String>,
) -> Response {
    let result = tokio::spawn(async move {
        let outcome = supervisor.spawn(&alias).await;
        (alias, outcome)
    })
    .await;

    let (alias, outcome) = match result {
        Ok(pair) => pair,
        Err(join_error) => {
            error!(%join_error, "spawn task failed");
            return detail(StatusCode::INTERNAL_SERVER_ERROR, "spawn task failed".to_string());
        }
    };

    match outcome {
        Ok(record) => Json(json!({
            "alias": record.alias.clone(),
            "port": record.port,
            "memory_gb": record.memory_gb,
            "status": "running",
        }))
        .into_response(),
        Err(err) => {
            error!(alias = %alias, %err, "spawn failed");
            spawn_error_response(err)
        }
    }
}

async fn stop(
    State(supervisor): State<Arc<Supervisor>>,
    Path(alias): Path<String>,
) -> Response {
    let stopped = {
        let alias = alias.clone();
        tokio::spawn(async move { supervisor.stop(&alias).await })
            .await
            .unwrap_or(false)
    };
    if stopped {
        Json(json!({"status": "stopped", "alias": alias})).into_response()
    } else {
        detail(StatusCode::NOT_FOUND, format!("no worker for alias '{alias}'"))
    }
}

/// Always 200: touching an absent alias is a no-op by contract.
async fn touch(
    State(supervisor): State<Arc<Supervisor>>,
    Path(alias): Path<String>,
) -> Json<serde_json::Value> {
    supervisor.touch(&alias);
    Json(json!({"status": "ok"}))
}

async fn stop_all(State(supervisor): State<Arc<Supervisor>>) -> Json<serde_json::Value> {
    let stopped = tokio::spawn(async move { supervisor.stop_all().await })
        .await
        .unwrap_or(0);
    Json(json!({"status": "stopped", "count": stopped}))
}

fn spawn_error_response(err: SpawnError) -> Response {
    let status = match &err {
        SpawnError::UnknownModel(_) => StatusCode::NOT_FOUND,
        SpawnError::OutOfMemory { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SpawnError::StartupFailure(_) | SpawnError::Launch { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    detail(status, err.to_string())
}

fn detail(status: StatusCode, message: String) -> Response {
    (status, Json(json!({"detail": message}))).into_response()
}
