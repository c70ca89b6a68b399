//! Plaintext decoder: charset sniff (UTF-8 with a lossy fallback) + line
//! split, preserving original line numbers.

use common::error::AppError;

use crate::content::DocumentContent;

pub fn decode(bytes: &[u8]) -> Result<DocumentContent, AppError> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    };

    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    let content = DocumentContent::from_lines_with_line_numbers(lines);
    content.validate()?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_valid_utf8() {
        let content = decode(b"line one\nline two\n").unwrap();
        assert_eq!(content.lines, vec!["line one", "line two"]);
        assert_eq!(content.lines_per_line, Some(vec![1, 2]));
    }

    #[test]
    fn falls_back_to_lossy_on_invalid_utf8() {
        let bytes = [b'o', b'k', 0xff, 0xfe, b'\n'];
        let content = decode(&bytes).unwrap();
        assert_eq!(content.lines.len(), 1);
    }
}
