//! HTML/markup decoder. Grounded in the teacher's `dom_smoothie` dependency
//! (Readability-style HTML-to-text extraction), generalized here to the
//! line-preserving variant this spec's decoder module requires: rather than
//! returning a single flattened summary, each extracted block becomes its
//! own source line.

use common::error::AppError;
use dom_smoothie::{Article, Config, Readability};

use crate::content::DocumentContent;

pub fn decode(html: &str, url: Option<&str>) -> Result<DocumentContent, AppError> {
    let mut readability = Readability::new(html, url, Some(Config::default()))
        .map_err(|e| AppError::Resource(format!("failed to parse HTML: {e}")))?;

    let Article { text_content, .. } = readability
        .parse()
        .map_err(|e| AppError::Resource(format!("failed to extract article: {e}")))?;

    let lines: Vec<String> = text_content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        return Err(AppError::Resource("no extractable text content".into()));
    }

    let content = DocumentContent::from_lines_with_line_numbers(lines);
    content.validate()?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_paragraph_lines() {
        let html = "<html><body><article><p>First paragraph.</p><p>Second paragraph.</p></article></body></html>";
        let content = decode(html, None).unwrap();
        assert!(!content.lines.is_empty());
    }
}
