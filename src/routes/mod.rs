use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::AppState;

pub mod ocr;

pub fn router(state: AppState) -> Router {
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ocr/upload", post(ocr::upload_and_extract))
        .route("/api/v1/ocr/process", post(ocr::process_image_by_path))
        .route("/api/v1/ocr/supported-languages", get(ocr::supported_languages))
        .layer(DefaultBodyLimit::max(max_upload))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
