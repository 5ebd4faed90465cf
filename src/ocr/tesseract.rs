// Tesseract-backed recognition engine via leptess. One engine instance per
// language set; LepTess is not thread-safe, so recognition serializes on a
// per-engine mutex while the registry stays free for other language sets.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use leptess::LepTess;

use super::{Detection, EngineFactory, RecognitionEngine};

pub struct TesseractFactory;

impl EngineFactory for TesseractFactory {
    fn create(&self, languages: &[String]) -> anyhow::Result<Arc<dyn RecognitionEngine>> {
        // Tesseract joins multiple trained languages with '+'.
        let lang = languages.join("+");
        let lt = LepTess::new(None, &lang).map_err(|e| anyhow!("tesseract init: {}", e))?;
        Ok(Arc::new(TesseractEngine {
            inner: Mutex::new(lt),
        }))
    }
}

pub struct TesseractEngine {
    inner: Mutex<LepTess>,
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&self, image_png: &[u8]) -> anyhow::Result<Vec<Detection>> {
        let mut lt = self
            .inner
            .lock()
            .map_err(|_| anyhow!("recognizer mutex poisoned"))?;
        lt.set_image_from_mem(image_png)
            .map_err(|e| anyhow!("set image: {}", e))?;
        let tsv = lt
            .get_tsv_text(0)
            .map_err(|e| anyhow!("tesseract run: {}", e))?;
        Ok(parse_tsv(&tsv))
    }
}

/// Parse tesseract TSV output into word-level detections. Columns:
/// level page block par line word left top width height conf text.
/// Level 5 rows are words; conf is -1 for structural rows.
fn parse_tsv(tsv: &str) -> Vec<Detection> {
    let mut detections = Vec::new();

    for line in tsv.lines() {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let (Ok(left), Ok(top), Ok(width), Ok(height)) = (
            cols[6].parse::<i32>(),
            cols[7].parse::<i32>(),
            cols[8].parse::<i32>(),
            cols[9].parse::<i32>(),
        ) else {
            continue;
        };
        let conf: f64 = cols[10].parse().unwrap_or(0.0);

        detections.push(Detection {
            text: text.to_string(),
            confidence: (conf / 100.0).clamp(0.0, 1.0),
            bbox: [
                [left, top],
                [left + width, top],
                [left + width, top + height],
                [left, top + height],
            ],
        });
    }

    detections
}
