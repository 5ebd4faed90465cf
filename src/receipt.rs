// Heuristic receipt extractor: pure rule-based structuring of OCR output.
// Each sub-extraction walks an ordered pattern table with first-match-wins
// semantics, so new patterns are added to the tables, not the control flow.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::ocr::{Detection, RecognitionResult};

/// Best-guess structured receipt. Absent fields mean "not found", never a
/// placeholder value.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptInfo {
    pub merchant_name: Option<String>,
    pub total_amount: Option<f64>,
    pub date: Option<NaiveDate>,
    /// Cleaned line-item candidates in detection order, at most 10.
    pub items: Vec<String>,
    pub raw_text: String,
    /// Arithmetic mean of detection confidences; 0.0 with no detections.
    pub confidence_score: f64,
}

const MAX_ITEMS: usize = 10;
const MERCHANT_SCAN_WINDOW: usize = 5;
const RESERVED_WORDS: &[&str] = &["total", "amount", "tax", "subtotal"];

/// Amount patterns, in priority order. First table entry with a match wins.
static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"total[:\s]+(\d+[.,]\d{2})",
        r"amount[:\s]+(\d+[.,]\d{2})",
        r"grand\s+total[:\s]+(\d+[.,]\d{2})",
        r"(\d+[.,]\d{2})\s*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid amount pattern"))
    .collect()
});

/// Date patterns, in priority order: numeric d/m/y, month-name, ISO y-m-d.
static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})",
        r"(\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+\d{2,4})",
        r"(\d{4}[-/]\d{1,2}[-/]\d{1,2})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid date pattern"))
    .collect()
});

/// Formats tried against a matched date string, in order.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%Y-%m-%d", "%d/%m/%y", "%d-%m-%y",
];

static AMOUNT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[.,]\d{2}").expect("valid regex"));
static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}[-/]\d{1,2}[-/]\d{2,4}|\d{4}[-/]\d{1,2}[-/]\d{1,2})")
        .expect("valid regex")
});
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Reconstruct a structured receipt from recognizer output. Pure computation;
/// the four sub-extractions are independent reads over the same input.
pub fn extract_receipt_info(ocr: &RecognitionResult) -> ReceiptInfo {
    let confidence_score = if ocr.detections.is_empty() {
        0.0
    } else {
        ocr.detections.iter().map(|d| d.confidence).sum::<f64>() / ocr.detections.len() as f64
    };

    ReceiptInfo {
        merchant_name: extract_merchant_name(&ocr.detections),
        total_amount: extract_total_amount(&ocr.raw_text),
        date: extract_date(&ocr.raw_text),
        items: extract_items(&ocr.detections),
        raw_text: ocr.raw_text.clone(),
        confidence_score,
    }
}

/// The merchant name is usually one of the first few detections: take the
/// first that is long enough and not a number or amount.
fn extract_merchant_name(detections: &[Detection]) -> Option<String> {
    for detection in detections.iter().take(MERCHANT_SCAN_WINDOW) {
        let text = detection.text.as_str();
        if char_count(text) > 3 && !is_numeric(text) && !is_amount(text) {
            let cleaned = clean_text(text);
            if char_count(&cleaned) > 2 {
                return Some(cleaned);
            }
        }
    }
    None
}

fn extract_total_amount(raw_text: &str) -> Option<f64> {
    let lower = raw_text.to_lowercase();
    for pattern in AMOUNT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            let amount_str = caps.get(1)?.as_str().replace(',', ".");
            if let Ok(amount) = amount_str.parse::<f64>() {
                return Some(amount);
            }
        }
    }
    None
}

fn extract_date(raw_text: &str) -> Option<NaiveDate> {
    let lower = raw_text.to_lowercase();
    for pattern in DATE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&lower) {
            let date_str = caps.get(1)?.as_str();
            for format in DATE_FORMATS {
                if let Ok(date) = NaiveDate::parse_from_str(date_str, format) {
                    return Some(date);
                }
            }
        }
    }
    None
}

/// Keep detections that look like item descriptions: not amounts, dates,
/// bare numbers, or receipt keywords.
fn extract_items(detections: &[Detection]) -> Vec<String> {
    let mut items = Vec::new();

    for detection in detections {
        let text = detection.text.as_str();
        if char_count(text) > 3
            && !is_amount(text)
            && !is_date(text)
            && !is_numeric(text)
            && !RESERVED_WORDS.contains(&text.to_lowercase().as_str())
        {
            let cleaned = clean_text(text);
            if char_count(&cleaned) > 2 {
                items.push(cleaned);
                if items.len() == MAX_ITEMS {
                    break;
                }
            }
        }
    }

    items
}

fn is_amount(text: &str) -> bool {
    AMOUNT_PREFIX.is_match(text)
}

fn is_date(text: &str) -> bool {
    DATE_PREFIX.is_match(text)
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Length gates count characters, not bytes; multi-byte scripts (Chinese is a
/// supported recognizer language) would otherwise pass on byte length alone.
fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn clean_text(text: &str) -> String {
    NON_WORD.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{ImageInfo, RecognitionResult};
    use std::time::Duration;

    fn detection(text: &str, confidence: f64) -> Detection {
        Detection {
            text: text.to_string(),
            confidence,
            bbox: [[0, 0], [10, 0], [10, 10], [0, 10]],
        }
    }

    fn recognition(texts: &[(&str, f64)]) -> RecognitionResult {
        let detections = texts.iter().map(|(t, c)| detection(t, *c)).collect();
        let info = ImageInfo {
            width: 640,
            height: 480,
            format: "Png".into(),
            mode: "L8".into(),
        };
        RecognitionResult::from_detections(detections, Duration::from_millis(1), info)
    }

    #[test]
    fn confidence_is_mean_of_detections() {
        let ocr = recognition(&[("Alfamart", 0.9), ("Milk", 0.7), ("Bread", 0.5)]);
        let receipt = extract_receipt_info(&ocr);
        assert!((receipt.confidence_score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_zero_without_detections() {
        let ocr = recognition(&[]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.confidence_score, 0.0);
    }

    #[test]
    fn merchant_comes_from_first_plausible_detection() {
        let ocr = recognition(&[("123", 0.9), ("12.50", 0.9), ("Warung Makan!", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.merchant_name.as_deref(), Some("Warung Makan"));
    }

    #[test]
    fn merchant_is_never_short_or_numeric() {
        // Only numerics and too-short candidates in the scan window.
        let ocr = recognition(&[("12345", 0.9), ("ab", 0.9), ("9.99", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert!(receipt.merchant_name.is_none());
    }

    #[test]
    fn merchant_scan_stops_after_five_detections() {
        let ocr = recognition(&[
            ("12", 0.9),
            ("34", 0.9),
            ("56", 0.9),
            ("78", 0.9),
            ("90", 0.9),
            ("Indomaret", 0.9),
        ]);
        let receipt = extract_receipt_info(&ocr);
        assert!(receipt.merchant_name.is_none());
    }

    #[test]
    fn total_amount_from_total_keyword() {
        let ocr = recognition(&[("Total:", 0.9), ("125.50", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.total_amount, Some(125.50));
    }

    #[test]
    fn total_amount_normalizes_comma_decimal() {
        let ocr = recognition(&[("total:", 0.9), ("125,50", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.total_amount, Some(125.50));
    }

    #[test]
    fn trailing_amount_wins_without_keyword() {
        let ocr = recognition(&[("Milk", 0.9), ("42.00", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.total_amount, Some(42.00));
    }

    #[test]
    fn no_amount_means_absent() {
        let ocr = recognition(&[("just words", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert!(receipt.total_amount.is_none());
    }

    #[test]
    fn date_parses_slash_format() {
        let ocr = recognition(&[("15/03/2024", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn date_parses_dash_format() {
        let ocr = recognition(&[("15-03-2024", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.date, NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn unparsable_date_is_absent() {
        let ocr = recognition(&[("99/99/9999", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert!(receipt.date.is_none());
    }

    #[test]
    fn items_exclude_amounts_dates_and_keywords() {
        let ocr = recognition(&[
            ("12.34", 0.9),
            ("2024-01-01", 0.9),
            ("TOTAL", 0.9),
            ("Milk 1L", 0.9),
        ]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.items, vec!["Milk 1L".to_string()]);
    }

    #[test]
    fn iso_dates_are_excluded_from_items() {
        // Both separator styles of a 4-digit-year date must be filtered out,
        // not stripped into a bare number by cleaning.
        let ocr = recognition(&[("2024-01-01", 0.9), ("2024/01/01", 0.9), ("Sabun Mandi", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.items, vec!["Sabun Mandi".to_string()]);
    }

    #[test]
    fn two_character_cjk_merchant_is_rejected() {
        // "超市" is 6 bytes but 2 characters; the >3 / >2 gates count characters.
        let ocr = recognition(&[("超市", 0.9), ("全家便利店", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.merchant_name.as_deref(), Some("全家便利店"));
    }

    #[test]
    fn short_cjk_items_are_filtered_by_character_count() {
        let ocr = recognition(&[("牛奶面包", 0.9), ("牛奶", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.items, vec!["牛奶面包".to_string()]);
    }

    #[test]
    fn items_are_capped_at_ten() {
        let texts: Vec<(String, f64)> = (0..15).map(|i| (format!("Item number {}", i), 0.9)).collect();
        let refs: Vec<(&str, f64)> = texts.iter().map(|(t, c)| (t.as_str(), *c)).collect();
        let ocr = recognition(&refs);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.items.len(), 10);
        assert_eq!(receipt.items[0], "Item number 0");
    }

    #[test]
    fn raw_text_is_carried_through() {
        let ocr = recognition(&[("Alfamart", 0.9), ("Total: 10.00", 0.9)]);
        let receipt = extract_receipt_info(&ocr);
        assert_eq!(receipt.raw_text, "Alfamart Total: 10.00");
    }
}
