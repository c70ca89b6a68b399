//! Uniform decoded-document model every decoder produces.

use common::error::AppError;
use serde::{Deserialize, Serialize};

/// Line-addressable decoded content. Exactly one of `lines_per_line` or
/// `pages_per_line` is populated: text-native sources (plaintext, markup,
/// binary documents) carry per-line source-line numbers; page-rasterized
/// sources (PDF pages, standalone images) carry per-line page numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentContent {
    pub text: String,
    pub lines: Vec<String>,
    pub lines_per_line: Option<Vec<u32>>,
    pub pages_per_line: Option<Vec<u32>>,
}

impl DocumentContent {
    pub fn from_lines_with_line_numbers(lines: Vec<String>) -> Self {
        let line_numbers: Vec<u32> = (1..=lines.len() as u32).collect();
        let text = lines.join("\n");
        Self {
            text,
            lines,
            lines_per_line: Some(line_numbers),
            pages_per_line: None,
        }
    }

    /// Emits one blank line (with a matching `0` in `pages_per_line`)
    /// between pages, so the segmenter's blank-line paragraph break never
    /// silently merges the last sentence of one page with the first
    /// sentence of the next.
    pub fn from_pages(pages: Vec<(u32, String)>) -> Self {
        let mut lines = Vec::new();
        let mut pages_per_line = Vec::new();
        for (i, (page, page_text)) in pages.into_iter().enumerate() {
            if i > 0 {
                lines.push(String::new());
                pages_per_line.push(0);
            }
            for line in page_text.lines() {
                lines.push(line.to_string());
                pages_per_line.push(page);
            }
        }
        let text = lines.join("\n");
        Self {
            text,
            lines,
            lines_per_line: None,
            pages_per_line: Some(pages_per_line),
        }
    }

    /// Validates the mutual-exclusivity and length invariants every
    /// `DocumentContent` must satisfy.
    pub fn validate(&self) -> Result<(), AppError> {
        match (&self.lines_per_line, &self.pages_per_line) {
            (Some(_), Some(_)) => {
                return Err(AppError::SchemaInvalid(
                    "DocumentContent cannot have both lines_per_line and pages_per_line".into(),
                ))
            }
            (None, None) => {
                return Err(AppError::SchemaInvalid(
                    "DocumentContent must have exactly one of lines_per_line/pages_per_line".into(),
                ))
            }
            _ => {}
        }

        if let Some(refs) = &self.lines_per_line {
            if refs.len() != self.lines.len() {
                return Err(AppError::SchemaInvalid(
                    "lines_per_line length must match lines length".into(),
                ));
            }
        }
        if let Some(refs) = &self.pages_per_line {
            if refs.len() != self.lines.len() {
                return Err(AppError::SchemaInvalid(
                    "pages_per_line length must match lines length".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbered_content_is_valid() {
        let content = DocumentContent::from_lines_with_line_numbers(vec![
            "one".into(),
            "two".into(),
        ]);
        content.validate().expect("should be valid");
        assert_eq!(content.lines_per_line, Some(vec![1, 2]));
    }

    #[test]
    fn page_numbered_content_is_valid() {
        let content = DocumentContent::from_pages(vec![
            (1, "a\nb".into()),
            (2, "c".into()),
        ]);
        content.validate().expect("should be valid");
        assert_eq!(content.pages_per_line, Some(vec![1, 1, 0, 2]));
    }

    #[test]
    fn both_refs_present_is_invalid() {
        let mut content = DocumentContent::from_lines_with_line_numbers(vec!["x".into()]);
        content.pages_per_line = Some(vec![1]);
        assert!(content.validate().is_err());
    }

    #[test]
    fn neither_refs_present_is_invalid() {
        let mut content = DocumentContent::from_lines_with_line_numbers(vec!["x".into()]);
        content.lines_per_line = None;
        assert!(content.validate().is_err());
    }

    #[test]
    fn mismatched_length_is_invalid() {
        let mut content = DocumentContent::from_lines_with_line_numbers(vec!["x".into(), "y".into()]);
        content.lines_per_line = Some(vec![1]);
        assert!(content.validate().is_err());
    }
}
