//! Raster image preparation for vision description.
//!
//! Grounded in `ingestion-pipeline/src/utils/image_parsing.rs` (base64
//! encoding) and the original source's image bound constants: images are
//! resized to at most 768x2000px and re-encoded under 20 MiB by iteratively
//! lowering JPEG quality; images with either dimension at or below 32px are
//! considered decorative and skipped entirely.

use base64::Engine;
use common::error::AppError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

pub const MAX_WIDTH: u32 = 768;
pub const MAX_HEIGHT: u32 = 2000;
pub const MAX_BYTES: usize = 20 * 1024 * 1024;
pub const TINY_IMAGE_THRESHOLD: u32 = 32;

pub struct PreparedImage {
    pub base64: String,
    pub mime: &'static str,
}

/// Returns `Ok(None)` for images too small to be meaningful (skipped, not
/// an error), `Ok(Some(..))` for a successfully prepared image.
pub fn prepare_for_vision(bytes: &[u8]) -> Result<Option<PreparedImage>, AppError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| AppError::Resource(format!("failed to decode image: {e}")))?;

    let (width, height) = image.dimensions();
    if width <= TINY_IMAGE_THRESHOLD || height <= TINY_IMAGE_THRESHOLD {
        return Ok(None);
    }

    let resized = resize_to_bounds(image);
    let encoded = encode_under_size_limit(&resized)?;

    Ok(Some(PreparedImage {
        base64: base64::engine::general_purpose::STANDARD.encode(encoded),
        mime: "image/jpeg",
    }))
}

fn resize_to_bounds(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= MAX_WIDTH && height <= MAX_HEIGHT {
        return image;
    }
    image.resize(MAX_WIDTH, MAX_HEIGHT, FilterType::Lanczos3)
}

fn encode_under_size_limit(image: &DynamicImage) -> Result<Vec<u8>, AppError> {
    let mut quality: u8 = 90;
    loop {
        let mut buf = Vec::new();
        {
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
            encoder
                .encode_image(image)
                .map_err(|e| AppError::Resource(format!("failed to encode jpeg: {e}")))?;
        }
        if buf.len() <= MAX_BYTES || quality <= 10 {
            return Ok(buf);
        }
        quality = quality.saturating_sub(15).max(10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, 128])
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn tiny_images_are_skipped() {
        let bytes = png_bytes(16, 16);
        let result = prepare_for_vision(&bytes).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn normal_images_are_prepared() {
        let bytes = png_bytes(100, 100);
        let result = prepare_for_vision(&bytes).unwrap();
        let prepared = result.expect("should prepare");
        assert_eq!(prepared.mime, "image/jpeg");
        assert!(!prepared.base64.is_empty());
    }

    #[test]
    fn oversized_images_are_downscaled() {
        let bytes = png_bytes(2000, 3000);
        let result = prepare_for_vision(&bytes).unwrap();
        assert!(result.is_some());
    }
}
