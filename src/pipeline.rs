// Assembles one upload response: preprocess -> recognize -> optional
// heuristic receipt + optional AI extraction. The two extraction paths are
// independent; reconciling conflicting fields between them is the caller's
// decision, not ours.

use serde::Serialize;

use crate::ai::AiExtraction;
use crate::error::PipelineError;
use crate::ocr::{self, RecognitionResult};
use crate::preprocess;
use crate::receipt::{self, ReceiptInfo};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub language: String,
    pub extract_receipt: bool,
    pub ai_extraction: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            extract_receipt: true,
            ai_extraction: false,
        }
    }
}

/// Assembled response for one upload. Built once per request and never
/// persisted here; storing the eventual transaction is the caller's job.
#[derive(Debug, Serialize)]
pub struct TransactionUploadResult {
    pub success: bool,
    pub message: String,
    pub ocr_result: RecognitionResult,
    pub receipt_info: Option<ReceiptInfo>,
    pub ai_extraction: Option<AiExtraction>,
}

/// Run the full extraction pipeline over raw image bytes.
pub async fn process_image(
    state: &AppState,
    bytes: &[u8],
    options: &ExtractOptions,
) -> Result<TransactionUploadResult, PipelineError> {
    // Reject unknown languages before doing any image work.
    ocr::map_language(&options.language)?;

    let decoded = preprocess::decode_image(bytes)?;
    let prepared = preprocess::preprocess(&decoded.image);
    if prepared.degraded {
        tracing::warn!("preprocessing degraded, recognizing original image");
    }
    let png = preprocess::encode_png(&prepared.image)?;

    let ocr_result =
        ocr::extract_text(&state.registry, png, decoded.info, &options.language).await?;

    // A receipt over zero text is meaningless: skip, not error.
    let receipt_info = if options.extract_receipt
        && ocr_result.success
        && !ocr_result.detections.is_empty()
    {
        Some(receipt::extract_receipt_info(&ocr_result))
    } else {
        None
    };

    let ai_extraction = if options.ai_extraction {
        Some(state.ai.process_receipt_text(&ocr_result.raw_text).await?)
    } else {
        None
    };

    Ok(TransactionUploadResult {
        success: true,
        message: "Image processed successfully".to_string(),
        ocr_result,
        receipt_info,
        ai_extraction,
    })
}
