//! Dispatches a file's raw bytes to the right decoder by extension and, for
//! decoders that surface embedded/rasterized images, routes them through
//! the [`VisionWorker`] and folds the descriptions back into the line model.
//! Grounded in `ingestion-pipeline/src/utils/file_text_extraction.rs`'s
//! extension-based dispatch table (teacher).

use std::path::Path;

use common::{error::AppError, utils::config::AppConfig};
use decoders::{ascii_markup, binary_document, content::DocumentContent, pdf, plaintext, raster_image};

use crate::vision_worker::{VisionRequest, VisionWorker};

const UNPROCESSABLE_IMAGE: &str = "[Unprocessable Image]";

pub async fn decode_file(
    path: &Path,
    bytes: &[u8],
    config: &AppConfig,
    vision: &VisionWorker,
) -> Result<DocumentContent, AppError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let content = match ext.as_str() {
        "txt" | "md" | "csv" | "json" | "log" | "rs" | "py" | "toml" | "yaml" | "yml" => {
            plaintext::decode(bytes)?
        }
        "html" | "htm" => ascii_markup::decode(&String::from_utf8_lossy(bytes), None)?,
        "docx" | "odt" => decode_binary_document(bytes, vision).await?,
        "pdf" => decode_pdf(bytes, config, vision).await?,
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => decode_raster_image(bytes, vision).await?,
        other => {
            return Err(AppError::Resource(format!(
                "no decoder registered for file extension \"{other}\""
            )))
        }
    };

    content.validate()?;
    Ok(content)
}

async fn decode_binary_document(
    bytes: &[u8],
    vision: &VisionWorker,
) -> Result<DocumentContent, AppError> {
    let decoded = binary_document::decode(bytes)?;

    let mut prepared_indices = Vec::new();
    let mut requests = Vec::new();
    for (i, image) in decoded.images.iter().enumerate() {
        if let Some(prepared) = raster_image::prepare_for_vision(&image.bytes)? {
            prepared_indices.push(i);
            requests.push(VisionRequest {
                base64: prepared.base64,
                mime: prepared.mime,
            });
        }
    }

    let descriptions = vision.describe_all(requests).await;

    let mut lines = decoded.content.lines;
    for (slot, description) in prepared_indices.into_iter().zip(descriptions) {
        let line = match description {
            Some(text) => format!("[Image: {text}]"),
            None => UNPROCESSABLE_IMAGE.to_string(),
        };
        let _ = slot;
        lines.push(line);
    }

    let line_numbers: Vec<u32> = (1..=lines.len() as u32).collect();
    let content = DocumentContent {
        text: lines.join("\n"),
        lines,
        lines_per_line: Some(line_numbers),
        pages_per_line: None,
    };
    Ok(content)
}

async fn decode_raster_image(
    bytes: &[u8],
    vision: &VisionWorker,
) -> Result<DocumentContent, AppError> {
    let Some(prepared) = raster_image::prepare_for_vision(bytes)? else {
        return Err(AppError::Resource(
            "image too small to describe".into(),
        ));
    };

    let requests = vec![VisionRequest {
        base64: prepared.base64,
        mime: prepared.mime,
    }];
    let mut descriptions = vision.describe_all(requests).await;
    let description = descriptions.pop().flatten().unwrap_or_else(|| UNPROCESSABLE_IMAGE.to_string());

    Ok(DocumentContent::from_pages(vec![(1, description)]))
}

async fn decode_pdf(
    bytes: &[u8],
    config: &AppConfig,
    vision: &VisionWorker,
) -> Result<DocumentContent, AppError> {
    let decoded = pdf::decode(bytes, config.ocr_strategy, config.ocr_auto_threshold)?;

    let requests: Vec<VisionRequest> = decoded
        .pending_vision
        .iter()
        .map(|p| VisionRequest {
            base64: p.base64.clone(),
            mime: p.mime,
        })
        .collect();
    let descriptions = vision.describe_all(requests).await;

    let mut by_page: std::collections::BTreeMap<u32, Vec<String>> = std::collections::BTreeMap::new();
    for (page, line) in decoded
        .content
        .pages_per_line
        .as_ref()
        .unwrap_or(&Vec::new())
        .iter()
        .zip(decoded.content.lines.iter())
    {
        by_page.entry(*page).or_default().push(line.clone());
    }

    for (pending, description) in decoded.pending_vision.iter().zip(descriptions) {
        let line = match description {
            Some(text) => format!("[Image: {text}]"),
            None => UNPROCESSABLE_IMAGE.to_string(),
        };
        by_page.entry(pending.page).or_default().insert(0, line);
    }

    let pages: Vec<(u32, String)> = by_page
        .into_iter()
        .map(|(page, lines)| (page, lines.join("\n")))
        .collect();

    let content = DocumentContent::from_pages(pages);
    Ok(content)
}
