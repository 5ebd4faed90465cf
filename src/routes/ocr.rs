use std::path::PathBuf;

use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::pipeline::{self, ExtractOptions, TransactionUploadResult};
use crate::AppState;

pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".bmp", ".tiff", ".webp"];

/// Extension whitelist, checked before any bytes are decoded.
pub fn validate_image_filename(filename: &str) -> Result<(), PipelineError> {
    let lower = filename.to_lowercase();
    if ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "invalid file type '{}'; allowed: {}",
            filename,
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

/// Upload an image and extract text, optionally with structured receipt
/// extraction and/or AI extraction.
///
/// Multipart fields: `file` (required), `language` (default "en"),
/// `extract_receipt` (default true), `ai_extraction` (default false).
pub async fn upload_and_extract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TransactionUploadResult>, PipelineError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut options = ExtractOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidInput(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    PipelineError::InvalidInput(format!("failed to read upload: {}", e))
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            "language" => {
                options.language = read_text_field(field).await?;
            }
            "extract_receipt" => {
                options.extract_receipt = parse_bool(&read_text_field(field).await?, true);
            }
            "ai_extraction" => {
                options.ai_extraction = parse_bool(&read_text_field(field).await?, false);
            }
            _ => {}
        }
    }

    let filename =
        filename.ok_or_else(|| PipelineError::InvalidInput("missing 'file' field".to_string()))?;
    validate_image_filename(&filename)?;
    let bytes = file_bytes
        .ok_or_else(|| PipelineError::InvalidInput("empty 'file' field".to_string()))?;

    let result = pipeline::process_image(&state, &bytes, &options).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct ProcessImageRequest {
    pub image_path: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub extract_receipt: bool,
    #[serde(default)]
    pub ai_extraction: bool,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

/// Re-process an already-stored image without re-uploading it. Relative paths
/// resolve against the configured upload directory.
pub async fn process_image_by_path(
    State(state): State<AppState>,
    Json(req): Json<ProcessImageRequest>,
) -> Result<Json<TransactionUploadResult>, PipelineError> {
    validate_image_filename(&req.image_path)?;

    let path = PathBuf::from(&req.image_path);
    let path = if path.is_absolute() {
        path
    } else {
        state.config.upload_dir.join(path)
    };

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::NotFound(format!("image file not found: {}", req.image_path))
        } else {
            PipelineError::InvalidInput(format!("failed to read image file: {}", e))
        }
    })?;

    let options = ExtractOptions {
        language: req.language,
        extract_receipt: req.extract_receipt,
        ai_extraction: req.ai_extraction,
    };

    let result = pipeline::process_image(&state, &bytes, &options).await?;
    Ok(Json(result))
}

/// Fixed capability table for the recognizer.
pub async fn supported_languages() -> Json<Value> {
    Json(json!({
        "supported_languages": [
            {"code": "en", "name": "English"},
            {"code": "id", "name": "Indonesian"},
            {"code": "ch", "name": "Chinese Simplified"},
            {"code": "zh", "name": "Chinese Simplified (alias)"},
        ],
        "default": "en",
        "allowed_extensions": ALLOWED_EXTENSIONS,
    }))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, PipelineError> {
    field
        .text()
        .await
        .map_err(|e| PipelineError::InvalidInput(format!("invalid multipart field: {}", e)))
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
