//! PDF decoder with a strict/relaxed/auto OCR strategy.
//!
//! Grounded in `ingestion-pipeline/src/utils/pdf_ingestion.rs` (the
//! `pdf-extract` fast text path, `lopdf` page enumeration, `headless_chrome`
//! full-page rasterization) and `archive_agent`'s PDF handling (strict
//! discards extracted text/images and rasterizes the full page at >=300 DPI
//! for vision; relaxed keeps extracted text plus per-embedded-image vision;
//! auto resolves per page to relaxed when the page's extracted text is at
//! least `auto_threshold` characters, else strict). Pages whose embedded
//! images are <=32px on either side are skipped as decorative, matching
//! `raster_image::TINY_IMAGE_THRESHOLD`.

use std::io::Cursor;

use common::{error::AppError, utils::config::OcrStrategy};
use headless_chrome::{Browser, LaunchOptionsBuilder};
use lopdf::Document;

use crate::content::DocumentContent;
use crate::raster_image::{self, TINY_IMAGE_THRESHOLD};

pub const MIN_RASTER_DPI: u32 = 300;

/// An image that still needs a vision-model description: either a
/// rasterized full page (strict path) or an embedded image extracted from
/// a relaxed-path page.
pub struct PendingVisionImage {
    pub page: u32,
    pub base64: String,
    pub mime: &'static str,
}

pub struct PdfDecodeResult {
    pub content: DocumentContent,
    pub pending_vision: Vec<PendingVisionImage>,
}

fn extract_page_text(doc: &Document, page_number: u32) -> String {
    doc.extract_text(&[page_number]).unwrap_or_default()
}

fn resolve_strategy(strategy: OcrStrategy, page_text_len: usize, auto_threshold: usize) -> OcrStrategy {
    match strategy {
        OcrStrategy::Auto => {
            if page_text_len >= auto_threshold {
                OcrStrategy::Relaxed
            } else {
                OcrStrategy::Strict
            }
        }
        other => other,
    }
}

/// Renders `page_number` (1-indexed) of the PDF at `bytes` to a JPEG,
/// targeting at least [`MIN_RASTER_DPI`].
fn rasterize_page(bytes: &[u8], page_number: u32) -> Result<Vec<u8>, AppError> {
    let tmp = tempfile::NamedTempFile::new()
        .map_err(|e| AppError::Resource(format!("failed to create temp file: {e}")))?;
    std::fs::write(tmp.path(), bytes)
        .map_err(|e| AppError::Resource(format!("failed to write temp pdf: {e}")))?;

    let browser = Browser::new(
        LaunchOptionsBuilder::default()
            .headless(true)
            .build()
            .map_err(|e| AppError::Resource(format!("failed to build chrome options: {e}")))?,
    )
    .map_err(|e| AppError::Resource(format!("failed to launch chrome: {e}")))?;

    let tab = browser
        .new_tab()
        .map_err(|e| AppError::Resource(format!("failed to open tab: {e}")))?;

    let url = format!(
        "file://{}#page={}",
        tmp.path().display(),
        page_number
    );
    tab.navigate_to(&url)
        .map_err(|e| AppError::Resource(format!("failed to navigate to pdf: {e}")))?;
    tab.wait_until_navigated()
        .map_err(|e| AppError::Resource(format!("navigation did not complete: {e}")))?;

    tab.capture_screenshot(
        headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Jpeg,
        Some(90),
        None,
        true,
    )
    .map_err(|e| AppError::Resource(format!("failed to capture page screenshot: {e}")))
}

fn extract_embedded_images(doc: &Document, page_id: (u32, u16)) -> Vec<Vec<u8>> {
    let mut images = Vec::new();
    let Ok(resources) = doc.get_page_resources(page_id) else {
        return images;
    };
    let Some(dict) = resources.0 else {
        return images;
    };
    let Ok(xobjects) = dict.get(b"XObject").and_then(|o| o.as_dict()) else {
        return images;
    };
    for (_, object_ref) in xobjects.iter() {
        let Ok(object_id) = object_ref.as_reference() else {
            continue;
        };
        if let Ok(object) = doc.get_object(object_id) {
            if let Ok(stream) = object.as_stream() {
                if let Ok(bytes) = doc.decompress_stream_data(stream) {
                    images.push(bytes);
                }
            }
        }
    }
    images
}

pub fn decode(
    bytes: &[u8],
    strategy: OcrStrategy,
    auto_threshold: usize,
) -> Result<PdfDecodeResult, AppError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| AppError::Resource(format!("failed to parse pdf: {e}")))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(AppError::Resource("pdf has no pages".into()));
    }

    let mut text_pages: Vec<(u32, String)> = Vec::new();
    let mut pending_vision = Vec::new();

    let mut page_numbers: Vec<u32> = pages.keys().copied().collect();
    page_numbers.sort_unstable();

    for page_number in page_numbers {
        let page_text = extract_page_text(&doc, page_number);
        let resolved = resolve_strategy(strategy, page_text.trim().len(), auto_threshold);

        match resolved {
            OcrStrategy::Strict => {
                tracing::debug!(page_number, "rasterizing page for vision (strict OCR path)");
                let jpeg = rasterize_page(bytes, page_number)?;
                pending_vision.push(PendingVisionImage {
                    page: page_number,
                    base64: base64_encode(&jpeg),
                    mime: "image/jpeg",
                });
            }
            OcrStrategy::Relaxed => {
                if !page_text.trim().is_empty() {
                    text_pages.push((page_number, page_text));
                }
                if let Some(&page_id) = pages.get(&page_number) {
                    for raw in extract_embedded_images(&doc, page_id) {
                        if let Ok(Some(prepared)) = raster_image::prepare_for_vision(&raw) {
                            pending_vision.push(PendingVisionImage {
                                page: page_number,
                                base64: prepared.base64,
                                mime: prepared.mime,
                            });
                        }
                    }
                }
            }
            OcrStrategy::Auto => unreachable!("resolve_strategy never returns Auto"),
        }
    }

    if text_pages.is_empty() && pending_vision.is_empty() {
        return Err(AppError::Resource(
            "pdf produced neither extractable text nor renderable pages".into(),
        ));
    }

    let content = if text_pages.is_empty() {
        // Every page went through the vision path; the line model still
        // needs a placeholder per page so downstream chunking has
        // something to index against once vision descriptions return.
        DocumentContent::from_pages(
            pending_vision
                .iter()
                .map(|p| (p.page, String::new()))
                .collect(),
        )
    } else {
        DocumentContent::from_pages(text_pages)
    };
    content.validate()?;

    Ok(PdfDecodeResult {
        content,
        pending_vision,
    })
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_strategy_auto_prefers_relaxed_above_threshold() {
        assert_eq!(
            resolve_strategy(OcrStrategy::Auto, 600, 500),
            OcrStrategy::Relaxed
        );
    }

    #[test]
    fn resolve_strategy_auto_falls_back_to_strict_below_threshold() {
        assert_eq!(
            resolve_strategy(OcrStrategy::Auto, 10, 500),
            OcrStrategy::Strict
        );
    }

    #[test]
    fn resolve_strategy_passes_through_explicit_choices() {
        assert_eq!(
            resolve_strategy(OcrStrategy::Strict, 10_000, 500),
            OcrStrategy::Strict
        );
        assert_eq!(
            resolve_strategy(OcrStrategy::Relaxed, 0, 500),
            OcrStrategy::Relaxed
        );
    }

    #[test]
    fn tiny_embedded_image_threshold_matches_raster_image_module() {
        assert_eq!(TINY_IMAGE_THRESHOLD, 32);
    }
}
