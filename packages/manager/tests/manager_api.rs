//! In-process tests of the manager HTTP surface.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use warden_core::config::{MemoryConfig, WorkersConfig};
use warden_core::{AppConfig, ModelCatalog};
use warden_manager::{Supervisor, SupervisorPolicy, api};

fn test_router(log_dir: &std::path::Path) -> axum::Router {
    let config = AppConfig::from_yaml("models:\n  m: { type: mock, path: mock/m }\n").unwrap();
    let catalog = ModelCatalog::from_config(&config);
    let workers = WorkersConfig {
        log_dir: log_dir.to_path_buf(),
        ..WorkersConfig::default()
    };
    let supervisor = Arc::new(
        Supervisor::new(
            catalog,
            SupervisorPolicy::default(),
            MemoryConfig::default(),
            &workers,
        )
        .unwrap(),
    );
    api::router(supervisor)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_worker_count() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["workers"], 0);
}

#[tokio::test]
async fn spawn_unknown_alias_is_404_with_detail() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/spawn/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("unknown model"));
}

#[tokio::test]
async fn stop_unknown_alias_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stop/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn touch_is_always_200() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/touch/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_includes_memory_and_policy() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["memory"]["total_gb"].as_f64().unwrap() > 0.0);
    assert_eq!(body["policy"]["idle_timeout_seconds"], 300);
    assert_eq!(body["policy"]["max_requests_before_restart"], 50);
    assert_eq!(body["policy"]["max_unified_memory_gb"], 24.0);
    assert_eq!(body["policy"]["eviction_threshold_percent"], 75);
    assert!(body["workers"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn stop_all_on_empty_map_is_zero() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stop-all")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}
