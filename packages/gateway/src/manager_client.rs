//! HTTP client for the worker manager.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::DispatchError;

const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Spawns block on model load; give the manager room.
const POST_TIMEOUT: Duration = Duration::from_secs(120);

/// The manager's answer to a spawn: everything the gateway needs to
/// reach the worker for this one request.
#[derive(Debug, Clone, Deserialize)]
pub struct SpawnedWorker {
    pub alias: String,
    pub port: u16,
    pub memory_gb: f64,
}

#[derive(Debug, Clone)]
pub struct ManagerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Build from `WORKER_MANAGER_HOST` / `WORKER_MANAGER_PORT`
    /// (defaults: `host.docker.internal:8100`).
    pub fn from_env() -> Self {
        let host = std::env::var("WORKER_MANAGER_HOST")
            .unwrap_or_else(|_| "host.docker.internal".to_string());
        let port = std::env::var("WORKER_MANAGER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8100);
        Self::new(format!("http://{host}:{port}"))
    }

    /// Idempotent spawn. Manager rejections (unknown alias, out of
    /// memory, startup failure) keep their status code and detail.
    pub async fn spawn(&self, alias: &str) -> Result<SpawnedWorker, DispatchError> {
        let url = format!("{}/spawn/{alias}", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(POST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DispatchError::ManagerUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }
        response
            .json::<SpawnedWorker>()
            .await
            .map_err(|e| DispatchError::ManagerUnreachable(format!("bad spawn response: {e}")))
    }

    /// Best-effort idle-clock reset; a failed touch never fails the
    /// request it was counting.
    pub async fn touch(&self, alias: &str) {
        let url = format!("{}/touch/{alias}", self.base_url);
        match self.http.post(&url).timeout(GET_TIMEOUT).send().await {
            Ok(_) => debug!(alias, "touched worker"),
            Err(error) => warn!(alias, %error, "touch failed"),
        }
    }

    pub async fn status(&self) -> Result<Value, DispatchError> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(GET_TIMEOUT)
            .send()
            .await
            .map_err(|e| DispatchError::ManagerUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| DispatchError::ManagerUnreachable(format!("bad status response: {e}")))
    }

    pub async fn stop(&self, alias: &str) -> Result<(), DispatchError> {
        let url = format!("{}/stop/{alias}", self.base_url);
        let response = self
            .http
            .post(&url)
            .timeout(POST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DispatchError::ManagerUnreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }
        Ok(())
    }

    async fn rejection(&self, response: reqwest::Response) -> DispatchError {
        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let detail = match response.json::<Value>().await {
            Ok(body) => body
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("worker manager error")
                .to_string(),
            Err(_) => "worker manager error".to_string(),
        };
        DispatchError::ManagerRejected { status, detail }
    }
}
