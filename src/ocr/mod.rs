// Text recognition adapter. The real engine (tesseract via leptess) is only
// compiled with the `ocr` feature so the crate builds on machines without
// leptonica/tesseract installed; without it the factory returns an error and
// everything else still works (tests inject fake engines through the same
// traits).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::error::PipelineError;

#[cfg(feature = "ocr")]
mod tesseract;

/// One recognized text fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub text: String,
    /// Recognizer confidence in [0, 1].
    pub confidence: f64,
    /// Bounding quadrilateral, clockwise from top-left.
    pub bbox: [[i32; 2]; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mode: String,
}

/// Full recognizer output for one image.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    pub success: bool,
    pub total_detections: usize,
    /// Detections in the recognizer's native scan order. Top-to-bottom /
    /// left-to-right is NOT guaranteed.
    pub detections: Vec<Detection>,
    /// All detection texts joined with single spaces, in detection order.
    pub raw_text: String,
    pub processing_time_ms: u64,
    pub image_info: ImageInfo,
}

impl RecognitionResult {
    pub fn from_detections(detections: Vec<Detection>, elapsed: Duration, info: ImageInfo) -> Self {
        let raw_text = detections
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            success: true,
            total_detections: detections.len(),
            detections,
            raw_text,
            processing_time_ms: elapsed.as_millis() as u64,
            image_info: info,
        }
    }
}

/// Map an API language code to the recognizer's language name. Closed set;
/// anything else is rejected before any recognition work starts.
pub fn map_language(code: &str) -> Result<&'static str, PipelineError> {
    match code {
        "en" => Ok("eng"),
        "id" => Ok("ind"),
        "ch" | "zh" => Ok("chi_sim"),
        other => Err(PipelineError::UnsupportedLanguage(other.to_string())),
    }
}

/// A ready-to-use recognizer instance. Implementations own whatever interior
/// mutability the backend needs; `recognize` takes encoded image bytes.
pub trait RecognitionEngine: Send + Sync {
    fn recognize(&self, image_png: &[u8]) -> anyhow::Result<Vec<Detection>>;
}

/// Builds engines for a language set. Construction is assumed expensive and
/// is invoked at most once per language set by the registry.
pub trait EngineFactory: Send + Sync {
    fn create(&self, languages: &[String]) -> anyhow::Result<Arc<dyn RecognitionEngine>>;
}

/// Process-wide cache of recognizer instances keyed by the sorted language
/// list. The map lock covers only the check-or-insert of the per-key cell;
/// engine construction runs outside it, so different language sets initialize
/// concurrently while same-key callers wait on one init.
pub struct RecognizerRegistry {
    factory: Arc<dyn EngineFactory>,
    engines: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn RecognitionEngine>>>>>,
}

impl RecognizerRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub async fn engine_for(
        &self,
        languages: &[&str],
    ) -> Result<Arc<dyn RecognitionEngine>, PipelineError> {
        let mut sorted: Vec<&str> = languages.to_vec();
        sorted.sort_unstable();
        let key = sorted.join(",");

        let cell = {
            let mut map = self
                .engines
                .lock()
                .map_err(|_| PipelineError::RecognitionEngine("registry lock poisoned".into()))?;
            map.entry(key.clone()).or_default().clone()
        };

        let engine = cell
            .get_or_try_init(|| {
                let factory = self.factory.clone();
                let langs: Vec<String> = sorted.iter().map(|s| s.to_string()).collect();
                async move {
                    tokio::task::spawn_blocking(move || factory.create(&langs))
                        .await
                        .map_err(|e| {
                            PipelineError::RecognitionEngine(format!(
                                "engine init task failed: {}",
                                e
                            ))
                        })?
                        .map_err(|e| {
                            PipelineError::RecognitionEngine(format!(
                                "failed to initialize recognizer for [{}]: {}",
                                key, e
                            ))
                        })
                }
            })
            .await?;

        Ok(engine.clone())
    }
}

/// Run recognition over already-preprocessed image bytes.
pub async fn extract_text(
    registry: &RecognizerRegistry,
    image_png: Vec<u8>,
    info: ImageInfo,
    language: &str,
) -> Result<RecognitionResult, PipelineError> {
    let lang = map_language(language)?;
    let engine = registry.engine_for(&[lang]).await?;

    let started = Instant::now();
    let detections = tokio::task::spawn_blocking(move || engine.recognize(&image_png))
        .await
        .map_err(|e| PipelineError::RecognitionEngine(format!("recognition task failed: {}", e)))?
        .map_err(|e| PipelineError::RecognitionEngine(e.to_string()))?;

    Ok(RecognitionResult::from_detections(
        detections,
        started.elapsed(),
        info,
    ))
}

#[cfg(feature = "ocr")]
pub fn default_factory() -> Arc<dyn EngineFactory> {
    Arc::new(tesseract::TesseractFactory)
}

#[cfg(not(feature = "ocr"))]
pub fn default_factory() -> Arc<dyn EngineFactory> {
    Arc::new(StubFactory)
}

/// Placeholder used when the crate is built without the `ocr` feature.
#[cfg(not(feature = "ocr"))]
struct StubFactory;

#[cfg(not(feature = "ocr"))]
impl EngineFactory for StubFactory {
    fn create(&self, _languages: &[String]) -> anyhow::Result<Arc<dyn RecognitionEngine>> {
        Err(anyhow::anyhow!(
            "OCR feature not enabled; build with --features ocr and install Tesseract/Leptonica"
        ))
    }
}
