use std::io::Cursor;

use image::{DynamicImage, GrayImage};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::median_filter;

use crate::error::PipelineError;
use crate::ocr::ImageInfo;

/// Half-width of the adaptive threshold window (11px block, matching what
/// works well for receipt photos).
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

#[derive(Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub info: ImageInfo,
}

/// Result of preprocessing. `degraded` means normalization could not run and
/// the recognizer gets the original image instead; a degraded-but-present
/// image beats no image.
#[derive(Debug)]
pub struct Preprocessed {
    pub image: DynamicImage,
    pub degraded: bool,
}

/// Decode raw upload bytes. This is the only place that fails when the input
/// is not an image at all.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, PipelineError> {
    let format = image::guess_format(bytes)
        .map(|f| format!("{:?}", f))
        .unwrap_or_else(|_| "Unknown".to_string());

    let image = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::ImageDecode(e.to_string()))?;

    let info = ImageInfo {
        width: image.width(),
        height: image.height(),
        format,
        mode: format!("{:?}", image.color()),
    };

    Ok(DecodedImage { image, info })
}

/// Normalize an image for recognition: grayscale, adaptive threshold, 3x3
/// median denoise. Fail-open: when a step cannot run, hand back the original
/// image and flag the degradation.
pub fn preprocess(image: &DynamicImage) -> Preprocessed {
    match try_preprocess(image) {
        Some(processed) => Preprocessed {
            image: DynamicImage::ImageLuma8(processed),
            degraded: false,
        },
        None => {
            tracing::warn!(
                width = image.width(),
                height = image.height(),
                "image preprocessing skipped, recognizer gets the original image"
            );
            Preprocessed {
                image: image.clone(),
                degraded: true,
            }
        }
    }
}

fn try_preprocess(image: &DynamicImage) -> Option<GrayImage> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();

    // Threshold window must fit inside the image.
    let window = ADAPTIVE_BLOCK_RADIUS * 2 + 1;
    if width <= window || height <= window {
        return None;
    }

    let binarized = adaptive_threshold(&gray, ADAPTIVE_BLOCK_RADIUS);
    Some(median_filter(&binarized, 1, 1))
}

/// Encode the (possibly preprocessed) image for the recognizer, which accepts
/// encoded image bytes rather than a pixel buffer.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::InvalidInput(format!("failed to encode image: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])));
        encode_png(&img).expect("encode")
    }

    #[test]
    fn decode_rejects_non_image_bytes() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::ImageDecode(_)));
    }

    #[test]
    fn decode_captures_image_info() {
        let bytes = white_png(64, 32);
        let decoded = decode_image(&bytes).expect("decode");
        assert_eq!(decoded.info.width, 64);
        assert_eq!(decoded.info.height, 32);
        assert_eq!(decoded.info.format, "Png");
    }

    #[test]
    fn preprocess_normalizes_regular_image() {
        let bytes = white_png(64, 64);
        let decoded = decode_image(&bytes).expect("decode");
        let out = preprocess(&decoded.image);
        assert!(!out.degraded);
        // Grayscale single-channel output.
        assert!(matches!(out.image, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn preprocess_fails_open_on_tiny_image() {
        let bytes = white_png(4, 4);
        let decoded = decode_image(&bytes).expect("decode");
        let out = preprocess(&decoded.image);
        assert!(out.degraded);
        assert_eq!(out.image.width(), 4);
    }
}
