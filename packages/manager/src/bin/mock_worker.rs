//! warden-mock-worker: a worker that loads nothing.
//!
//! Implements the worker HTTP contract with canned responses so the
//! supervisor can be exercised end-to-end on machines without any
//! accelerator, and so integration tests have a child to spawn.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use clap::Parser;
use serde_json::{Value, json};

#[derive(Debug, Parser)]
#[command(name = "warden-mock-worker")]
struct Args {
    #[arg(long)]
    alias: String,

    #[arg(long = "model-path")]
    model_path: String,

    #[arg(long)]
    port: u16,
}

struct WorkerInfo {
    alias: String,
    model_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let info = Arc::new(WorkerInfo {
        alias: args.alias,
        model_path: args.model_path,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/analyze", post(analyze))
        .route("/generate", post(generate))
        .route("/edit", post(edit))
        .with_state(info);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn chat(State(info): State<Arc<WorkerInfo>>, Json(_request): Json<Value>) -> Json<Value> {
    Json(json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": format!("mock response from {}", info.alias),
            },
            "finish_reason": "stop",
        }],
        "usage": {"total_tokens": 10},
    }))
}

async fn analyze(State(info): State<Arc<WorkerInfo>>, Json(request): Json<Value>) -> Json<Value> {
    let task = request.get("task").and_then(Value::as_str).unwrap_or("caption");
    Json(json!({
        "task": task,
        "result": format!("mock {} from {}", task, info.alias),
        "model": info.model_path.clone(),
    }))
}

async fn generate(State(info): State<Arc<WorkerInfo>>, Json(request): Json<Value>) -> Json<Value> {
    let n = request.get("n").and_then(Value::as_u64).unwrap_or(1);
    let images: Vec<Value> = (0..n).map(|_| json!({"b64_json": ""})).collect();
    Json(json!({
        "created": epoch_secs(),
        "data": images,
        "model": info.model_path.clone(),
    }))
}

async fn edit(State(info): State<Arc<WorkerInfo>>, Json(_request): Json<Value>) -> Json<Value> {
    Json(json!({
        "created": epoch_secs(),
        "data": [{"b64_json": ""}],
        "model": info.model_path.clone(),
    }))
}
