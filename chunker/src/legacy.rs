//! Reads the legacy chunk-header format.
//!
//! Grounded in `archive_agent/data/chunk.py::_format_chunk`: older chunks
//! were written with an extra `# file://<uri>` line preceding the header
//! line. Current chunks drop that line; this reader accepts both so older
//! chunk text already stored in a vector store still parses.

pub struct ParsedChunk<'a> {
    pub uri: Option<&'a str>,
    pub header: &'a str,
    pub body: &'a str,
}

pub fn parse(text: &str) -> Option<ParsedChunk<'_>> {
    let mut lines = text.splitn(2, '\n');
    let first = lines.next()?.trim();
    let rest = lines.next().unwrap_or("").trim_start_matches('\n');

    if let Some(uri) = first.strip_prefix("# file://") {
        let mut inner = rest.splitn(2, '\n');
        let header_line = inner.next()?.trim();
        let body = inner.next().unwrap_or("").trim_start_matches('\n').trim();
        let header = header_line.strip_prefix("# ")?;
        Some(ParsedChunk {
            uri: Some(uri),
            header,
            body,
        })
    } else {
        let header = first.strip_prefix("# ")?;
        Some(ParsedChunk {
            uri: None,
            header,
            body: rest.trim(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_format() {
        let text = "# notes.md\n\nSome body text.";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.uri, None);
        assert_eq!(parsed.header, "notes.md");
        assert_eq!(parsed.body, "Some body text.");
    }

    #[test]
    fn parses_legacy_format_with_uri_line() {
        let text = "# file:///home/user/notes.md\n# notes.md\n\nSome body text.";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.uri, Some("/home/user/notes.md"));
        assert_eq!(parsed.header, "notes.md");
        assert_eq!(parsed.body, "Some body text.");
    }

    #[test]
    fn rejects_text_without_a_header_line() {
        assert!(parse("no header here").is_none());
    }
}
