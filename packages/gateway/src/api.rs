//! Public OpenAI-style HTTP surface.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::dispatch::{
    Dispatcher, WorkerEndpoint, resolve_chat_alias, resolve_image_alias, resolve_vision_alias,
};
use crate::error::DispatchError;

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/images/generations", post(generate_images))
        .route("/v1/images/edits", post(edit_images))
        .route("/v1/vision/analyze", post(analyze_image))
        .route("/v1/vision/tasks", get(list_vision_tasks))
        .route("/healthz", get(healthz))
        .route("/v1/system/status", get(system_status))
        .route("/v1/system/evict/{alias}", post(evict_worker))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Value>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default = "default_n")]
    pub n: u32,
    #[serde(default = "default_size")]
    pub size: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    pub steps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ImageEditRequest {
    pub prompt: String,
    /// Base64-encoded source image.
    pub image: String,
    /// 0.0 keeps the original, 1.0 regenerates fully.
    #[serde(default = "default_strength")]
    pub strength: f64,
    pub size: Option<String>,
    #[serde(default = "default_image_model")]
    pub model: String,
    pub steps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct VisionAnalyzeRequest {
    /// Base64-encoded image or URL.
    pub image: String,
    #[serde(default = "default_task")]
    pub task: String,
    /// Custom prompt for the `custom` task.
    pub prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_n() -> u32 {
    1
}

fn default_size() -> String {
    "1024x1024".to_string()
}

fn default_image_model() -> String {
    "schnell".to_string()
}

fn default_strength() -> f64 {
    0.7
}

fn default_task() -> String {
    "caption".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn list_models(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Value> {
    let created = epoch_secs();
    let data: Vec<Value> = dispatcher
        .catalog()
        .aliases()
        .map(|alias| {
            json!({
                "id": alias,
                "object": "model",
                "created": created,
                "owned_by": "local",
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data}))
}

async fn chat_completions(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, DispatchError> {
    let alias = resolve_chat_alias(dispatcher.catalog(), &request.model)?;
    let payload = json!({
        "messages": request.messages,
        "stream": request.stream,
    });
    let (status, body) = dispatcher
        .dispatch(&alias, WorkerEndpoint::Chat, &payload)
        .await?;
    Ok(passthrough(status, body))
}

async fn generate_images(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<ImageGenerationRequest>,
) -> Result<Response, DispatchError> {
    let alias = resolve_image_alias(dispatcher.catalog())?;
    let payload = json!({
        "prompt": request.prompt,
        "n": request.n,
        "size": request.size,
        "model": request.model,
        "steps": request.steps,
    });
    let (status, body) = dispatcher
        .dispatch(&alias, WorkerEndpoint::Generate, &payload)
        .await?;
    Ok(passthrough(status, body))
}

async fn edit_images(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<ImageEditRequest>,
) -> Result<Response, DispatchError> {
    let alias = resolve_image_alias(dispatcher.catalog())?;
    let payload = json!({
        "prompt": request.prompt,
        "image": request.image,
        "strength": request.strength,
        "size": request.size,
        "model": request.model,
        "steps": request.steps,
    });
    let (status, body) = dispatcher
        .dispatch(&alias, WorkerEndpoint::Edit, &payload)
        .await?;
    Ok(passthrough(status, body))
}

async fn analyze_image(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<VisionAnalyzeRequest>,
) -> Result<Response, DispatchError> {
    let alias = resolve_vision_alias(dispatcher.catalog(), &request.task)?;
    let payload = json!({
        "image": request.image,
        "task": request.task,
        "prompt": request.prompt,
        "max_tokens": request.max_tokens,
    });
    let (status, body) = dispatcher
        .dispatch(&alias, WorkerEndpoint::Analyze, &payload)
        .await?;
    Ok(passthrough(status, body))
}

async fn list_vision_tasks() -> Json<Value> {
    Json(json!({
        "tasks": [
            {"id": "caption", "description": "Brief one-sentence caption"},
            {"id": "ocr", "description": "Extract text from image (OCR)"},
            {"id": "describe", "description": "Detailed image description"},
            {"id": "analyze", "description": "Comprehensive analysis"},
            {"id": "objects", "description": "List detected objects"},
            {"id": "custom", "description": "Custom prompt (provide 'prompt' field)"},
        ]
    }))
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok", "timestamp": epoch_secs()}))
}

async fn system_status(State(dispatcher): State<Arc<Dispatcher>>) -> Response {
    match dispatcher.manager().status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            error!(%err, "status fetch failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"detail": err.to_string()})),
            )
                .into_response()
        }
    }
}

async fn evict_worker(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path(alias): Path<String>,
) -> Response {
    match dispatcher.manager().stop(&alias).await {
        Ok(()) => Json(json!({"status": "evicted", "alias": alias})).into_response(),
        Err(err) => {
            error!(alias = %alias, %err, "evict failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": err.to_string()})),
            )
                .into_response()
        }
    }
}

/// Forward the worker's status and JSON body untouched.
fn passthrough(status: StatusCode, body: Bytes) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
