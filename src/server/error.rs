use crate::KubeyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl KubeyError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            KubeyError::NoContexts => (StatusCode::SERVICE_UNAVAILABLE, "NO_CONTEXTS"),
            KubeyError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            KubeyError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            KubeyError::Connectivity { .. } => (StatusCode::BAD_GATEWAY, "CLUSTER_UNREACHABLE"),
            KubeyError::QueueFull(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_FULL"),
            KubeyError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR"),
            KubeyError::KubernetesError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "KUBERNETES_ERROR")
            }
            KubeyError::MetricsError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "METRICS_ERROR"),
            KubeyError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
            }
            KubeyError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for KubeyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code,
        };

        (status, Json(body)).into_response()
    }
}
