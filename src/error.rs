use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the extraction pipeline. The HTTP mapping below is
/// deliberate: 4xx means retrying the same request is pointless, 502/503 means
/// an external dependency failed and a retry may succeed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    #[error("unsupported OCR language '{0}' (allowed: en, id, ch, zh)")]
    UnsupportedLanguage(String),

    #[error("recognition engine failure: {0}")]
    RecognitionEngine(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    ExternalService(String),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match &self {
            PipelineError::ImageDecode(_)
            | PipelineError::UnsupportedLanguage(_)
            | PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::RecognitionEngine(_) | PipelineError::ExternalService(_) => {
                StatusCode::BAD_GATEWAY
            }
            PipelineError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
