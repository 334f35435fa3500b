use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

/// Failures on the dispatch path, each mapped to exactly one client
/// status. Manager rejections keep the manager's own status and detail.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    UnknownModel(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("{detail}")]
    ManagerRejected { status: StatusCode, detail: String },

    #[error("cannot connect to worker manager: {0}")]
    ManagerUnreachable(String),

    #[error("worker error: {0}")]
    WorkerTransport(String),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::UnknownModel(_) | DispatchError::NotConfigured(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::ManagerRejected { status, .. } => *status,
            DispatchError::ManagerUnreachable(_) | DispatchError::WorkerTransport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({"detail": self.to_string()}))).into_response()
    }
}
