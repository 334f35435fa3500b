//! Request-to-worker routing: alias resolution and payload forwarding.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::Value;
use tracing::debug;

use warden_core::ModelCatalog;

use crate::error::DispatchError;
use crate::manager_client::ManagerClient;

/// The worker endpoints the gateway forwards to, each with its own
/// outbound timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerEndpoint {
    Chat,
    Analyze,
    Generate,
    Edit,
}

impl WorkerEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            WorkerEndpoint::Chat => "chat",
            WorkerEndpoint::Analyze => "analyze",
            WorkerEndpoint::Generate => "generate",
            WorkerEndpoint::Edit => "edit",
        }
    }

    pub fn timeout(self) -> Duration {
        match self {
            WorkerEndpoint::Chat => Duration::from_secs(60),
            WorkerEndpoint::Analyze => Duration::from_secs(120),
            // image work is the slow path
            WorkerEndpoint::Generate | WorkerEndpoint::Edit => Duration::from_secs(300),
        }
    }
}

/// Resolve the alias for a chat request. Unknown names that look like a
/// hosted model (gpt, claude) silently fall back to `vlm-fast` so
/// off-the-shelf OpenAI clients work unmodified.
pub fn resolve_chat_alias(catalog: &ModelCatalog, model: &str) -> Result<String, DispatchError> {
    if catalog.contains(model) {
        return Ok(model.to_string());
    }
    let lower = model.to_lowercase();
    if lower.contains("gpt") || lower.contains("claude") {
        return Ok("vlm-fast".to_string());
    }
    let available: Vec<&str> = catalog.aliases().collect();
    Err(DispatchError::UnknownModel(format!(
        "Model '{model}' not found. Available: {available:?}"
    )))
}

/// Image generation and editing are pinned to the `image-gen` alias.
pub fn resolve_image_alias(catalog: &ModelCatalog) -> Result<String, DispatchError> {
    if catalog.contains("image-gen") {
        Ok("image-gen".to_string())
    } else {
        Err(DispatchError::NotConfigured(
            "Diffusion model not configured".to_string(),
        ))
    }
}

/// Vision analysis: the heavyweight tasks go to `vlm-best`, the rest to
/// `vlm-fast`, degrading to whatever VLM is configured.
pub fn resolve_vision_alias(catalog: &ModelCatalog, task: &str) -> Result<String, DispatchError> {
    let preferred = if matches!(task, "analyze" | "describe") {
        "vlm-best"
    } else {
        "vlm-fast"
    };
    if catalog.contains(preferred) {
        return Ok(preferred.to_string());
    }
    if catalog.contains("vlm-fast") {
        return Ok("vlm-fast".to_string());
    }
    catalog
        .first_vlm()
        .map(str::to_string)
        .ok_or_else(|| DispatchError::NotConfigured("No VLM model configured".to_string()))
}

/// Stateless forwarder: spawn-or-reuse via the manager, touch, proxy the
/// payload, hand back the worker's body untouched.
pub struct Dispatcher {
    catalog: ModelCatalog,
    manager: ManagerClient,
    worker_host: String,
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new(catalog: ModelCatalog, manager: ManagerClient, worker_host: impl Into<String>) -> Self {
        Self {
            catalog,
            manager,
            worker_host: worker_host.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn manager(&self) -> &ManagerClient {
        &self.manager
    }

    /// Route one request to a worker endpoint. The worker's status and
    /// JSON body pass through verbatim; the gateway never reshapes them.
    ///
    /// The whole leg runs in a detached task: a client that disconnects
    /// drops the handler future, but the worker call completes and its
    /// response is discarded rather than severed mid-request.
    pub async fn dispatch(
        &self,
        alias: &str,
        endpoint: WorkerEndpoint,
        payload: &Value,
    ) -> Result<(StatusCode, Bytes), DispatchError> {
        let manager = self.manager.clone();
        let http = self.http.clone();
        let worker_host = self.worker_host.clone();
        let alias = alias.to_string();
        let payload = payload.clone();

        let task = tokio::spawn(async move {
            let worker = manager.spawn(&alias).await?;
            manager.touch(&alias).await;

            let url = format!("http://{worker_host}:{}/{}", worker.port, endpoint.path());
            debug!(alias = %alias, %url, "forwarding to worker");

            let response = http
                .post(&url)
                .json(&payload)
                .timeout(endpoint.timeout())
                .send()
                .await
                .map_err(|e| DispatchError::WorkerTransport(e.to_string()))?;

            let status = StatusCode::from_u16(response.status().as_u16())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = response
                .bytes()
                .await
                .map_err(|e| DispatchError::WorkerTransport(e.to_string()))?;
            Ok((status, body))
        });

        task.await
            .map_err(|e| DispatchError::WorkerTransport(format!("dispatch task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::AppConfig;

    fn catalog(yaml: &str) -> ModelCatalog {
        ModelCatalog::from_config(&AppConfig::from_yaml(yaml).unwrap())
    }

    fn standard() -> ModelCatalog {
        catalog(
            r#"
models:
  vlm-fast: { type: vlm, path: org/small-3b }
  vlm-best: { type: vlm, path: org/big-7b }
  image-gen: { type: diffusion, path: org/flux }
"#,
        )
    }

    #[test]
    fn chat_known_alias_passes_through() {
        assert_eq!(resolve_chat_alias(&standard(), "vlm-fast").unwrap(), "vlm-fast");
    }

    #[test]
    fn chat_hosted_model_names_fall_back() {
        assert_eq!(resolve_chat_alias(&standard(), "gpt-4").unwrap(), "vlm-fast");
        assert_eq!(
            resolve_chat_alias(&standard(), "claude-sonnet-4").unwrap(),
            "vlm-fast"
        );
    }

    #[test]
    fn chat_unknown_model_is_404_with_listing() {
        let err = resolve_chat_alias(&standard(), "unknown").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let message = err.to_string();
        assert!(message.contains("'unknown' not found"));
        assert!(message.contains("vlm-fast"));
    }

    #[test]
    fn image_alias_fixed_or_404() {
        assert_eq!(resolve_image_alias(&standard()).unwrap(), "image-gen");

        let no_diffusion = catalog("models:\n  vlm-fast: { type: vlm, path: p }\n");
        let err = resolve_image_alias(&no_diffusion).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn vision_heavy_tasks_prefer_best() {
        assert_eq!(resolve_vision_alias(&standard(), "analyze").unwrap(), "vlm-best");
        assert_eq!(resolve_vision_alias(&standard(), "describe").unwrap(), "vlm-best");
        assert_eq!(resolve_vision_alias(&standard(), "caption").unwrap(), "vlm-fast");
        assert_eq!(resolve_vision_alias(&standard(), "ocr").unwrap(), "vlm-fast");
    }

    #[test]
    fn vision_degrades_to_any_configured_vlm() {
        let only_custom = catalog("models:\n  my-vlm: { type: vlm, path: p }\n");
        assert_eq!(resolve_vision_alias(&only_custom, "analyze").unwrap(), "my-vlm");

        let no_vlm = catalog("models:\n  image-gen: { type: diffusion, path: p }\n");
        assert!(resolve_vision_alias(&no_vlm, "caption").is_err());
    }

    #[test]
    fn endpoint_timeouts() {
        assert_eq!(WorkerEndpoint::Chat.timeout(), Duration::from_secs(60));
        assert_eq!(WorkerEndpoint::Analyze.timeout(), Duration::from_secs(120));
        assert_eq!(WorkerEndpoint::Generate.timeout(), Duration::from_secs(300));
    }
}
