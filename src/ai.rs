// LLM structured-extraction adapter. Sends the raw OCR text to a
// chat-completion endpoint with a fixed instruction template and coerces the
// reply into a transaction candidate. A malformed-but-present reply is not an
// error: it degrades to regex-only fallback extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::PipelineError;

pub const CATEGORIES: &[&str] = &[
    "Food & Dining",
    "Transportation",
    "Shopping",
    "Bills & Utilities",
    "Entertainment",
    "Healthcare",
    "Education",
    "Salary",
    "Business",
    "Investment",
    "Gift",
    "Other",
];

const DEFAULT_CURRENCY: &str = "IDR";
const DEFAULT_TRANSACTION_TYPE: &str = "expense";
const FALLBACK_DESCRIPTION: &str = "AI extraction failed, manual review needed";

/// Transaction fields coerced out of the model reply. Every field is
/// tolerant: coercion failure means absent, never a panic or error.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExtractedTransaction {
    pub amount: Option<f64>,
    pub merchant: Option<String>,
    /// ISO-8601 date string as reported by the model.
    pub date: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub transaction_type: Option<String>,
    pub items: Vec<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AiExtraction {
    /// True whenever a model reply was obtained, by either parse path.
    /// False only when the API call itself failed.
    pub success: bool,
    pub confidence: f64,
    pub fields: ExtractedTransaction,
    /// Verbatim model reply (or the call error), kept for audit.
    pub raw_model_response: String,
}

impl AiExtraction {
    fn call_failed(message: String) -> Self {
        Self {
            success: false,
            confidence: 0.0,
            fields: ExtractedTransaction::default(),
            raw_model_response: message,
        }
    }
}

pub struct AiExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl AiExtractor {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.ai_timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: config.ai_api_key.clone(),
            base_url: config.ai_base_url.clone(),
            model: config.ai_model.clone(),
        })
    }

    /// Extract transaction fields from raw OCR text.
    ///
    /// A missing credential is a configuration problem and surfaces as
    /// `ServiceUnavailable` before any network traffic. A failed API call is
    /// caught and reported as an unsuccessful extraction carrying the error
    /// text, so one flaky upstream call never fails the whole upload.
    pub async fn process_receipt_text(&self, ocr_text: &str) -> Result<AiExtraction, PipelineError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::ServiceUnavailable(
                    "AI API key is not configured; set AI_API_KEY".to_string(),
                )
            })?;

        let prompt = build_extraction_prompt(ocr_text);

        match self.call_model(api_key, &prompt).await {
            Ok(reply) => Ok(parse_model_reply(&reply)),
            Err(e) => {
                tracing::error!("AI extraction call failed: {}", e);
                Ok(AiExtraction::call_failed(e.to_string()))
            }
        }
    }

    async fn call_model(&self, api_key: &str, prompt: &str) -> Result<String, PipelineError> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.1,
            "max_tokens": 500,
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::ExternalService(format!("AI API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ExternalService(format!(
                "AI API error: {} - {}",
                status, body
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            PipelineError::ExternalService(format!("invalid AI API reply: {}", e))
        })?;

        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::ExternalService("no choices in AI API reply".to_string())
            })?;

        if content.trim().is_empty() {
            return Err(PipelineError::ExternalService(
                "empty reply from AI API".to_string(),
            ));
        }

        Ok(content.to_string())
    }
}

fn build_extraction_prompt(ocr_text: &str) -> String {
    let categories = CATEGORIES
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze the following receipt/financial document text and extract key information.
Return the data in JSON format with the following structure:

{{
    "amount": <numeric_value_without_currency>,
    "merchant": "<merchant_name>",
    "date": "<YYYY-MM-DD>",
    "category": "<category_name>",
    "description": "<brief_description>",
    "confidence": <0.0_to_1.0>,
    "currency": "<currency_code>",
    "transaction_type": "expense|income",
    "items": ["<item1>", "<item2>", ...],
    "location": "<location_if_available>"
}}

Categories to choose from:
{categories}

OCR Text:
{ocr_text}

Important:
1. Extract the TOTAL amount, not individual item prices
2. If no clear total is found, sum the visible amounts
3. Choose the most appropriate category
4. Set confidence based on text clarity and completeness
5. Use "expense" for most receipts, "income" for salary/business documents
6. Return valid JSON only, no additional text
"#
    )
}

/// Parse a model reply into an extraction. Invalid JSON is common enough that
/// it takes the fallback path instead of erroring.
pub fn parse_model_reply(reply: &str) -> AiExtraction {
    let cleaned = strip_code_fence(reply);

    match serde_json::from_str::<Value>(cleaned) {
        Ok(data) => AiExtraction {
            success: true,
            confidence: safe_float(data.get("confidence")).unwrap_or(0.5),
            fields: coerce_fields(&data),
            raw_model_response: reply.to_string(),
        },
        Err(_) => fallback_extraction(reply),
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let mut cleaned = reply.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

fn coerce_fields(data: &Value) -> ExtractedTransaction {
    ExtractedTransaction {
        amount: safe_float(data.get("amount")),
        merchant: safe_string(data.get("merchant")),
        date: safe_string(data.get("date")),
        category: safe_string(data.get("category")),
        description: safe_string(data.get("description")),
        currency: safe_string(data.get("currency"))
            .or_else(|| Some(DEFAULT_CURRENCY.to_string())),
        transaction_type: safe_string(data.get("transaction_type"))
            .or_else(|| Some(DEFAULT_TRANSACTION_TYPE.to_string())),
        items: data
            .get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        location: safe_string(data.get("location")),
    }
}

static FALLBACK_AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(\d+[.,]\d{2})", r"(\d+\.?\d*)"]
        .iter()
        .map(|p| Regex::new(p).expect("valid fallback pattern"))
        .collect()
});

/// Regex-only recovery when the model reply is not valid JSON: keep any bare
/// numeric amount, flag the record for manual review.
fn fallback_extraction(reply: &str) -> AiExtraction {
    let amount = FALLBACK_AMOUNT_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
    });

    AiExtraction {
        success: true,
        confidence: 0.1,
        fields: ExtractedTransaction {
            amount,
            category: Some("Other".to_string()),
            description: Some(FALLBACK_DESCRIPTION.to_string()),
            currency: Some(DEFAULT_CURRENCY.to_string()),
            transaction_type: Some(DEFAULT_TRANSACTION_TYPE.to_string()),
            ..ExtractedTransaction::default()
        },
        raw_model_response: reply.to_string(),
    }
}

fn safe_string(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => other.to_string(),
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn safe_float(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}
