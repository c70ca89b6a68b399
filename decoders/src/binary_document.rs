//! Binary document decoder (ODT/DOCX): both formats are ZIP containers
//! holding an XML document body plus embedded media. Text is extracted by
//! stripping markup from the body XML; embedded images are surfaced
//! separately so the caller can route them through vision description.

use std::io::{Cursor, Read};

use common::error::AppError;

use crate::content::DocumentContent;

pub struct EmbeddedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct BinaryDocument {
    pub content: DocumentContent,
    pub images: Vec<EmbeddedImage>,
}

enum Format {
    Docx,
    Odt,
}

fn detect_format(archive: &zip::ZipArchive<Cursor<&[u8]>>) -> Result<Format, AppError> {
    let names: Vec<&str> = archive.file_names().collect();
    if names.iter().any(|n| *n == "word/document.xml") {
        Ok(Format::Docx)
    } else if names.iter().any(|n| *n == "content.xml") {
        Ok(Format::Odt)
    } else {
        Err(AppError::Resource(
            "zip container is neither DOCX nor ODT".into(),
        ))
    }
}

fn strip_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut in_tag = false;
    for ch in xml.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, AppError> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| AppError::Resource(format!("missing {name}: {e}")))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| AppError::Resource(format!("failed to read {name}: {e}")))?;
    Ok(xml)
}

pub fn decode(bytes: &[u8]) -> Result<BinaryDocument, AppError> {
    let cursor = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| AppError::Resource(format!("not a valid zip container: {e}")))?;

    let format = detect_format(&archive)?;
    let body_path = match format {
        Format::Docx => "word/document.xml",
        Format::Odt => "content.xml",
    };
    let xml = read_entry(&mut archive, body_path)?;
    let text = strip_tags(&xml);

    let lines: Vec<String> = text
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if lines.is_empty() {
        return Err(AppError::Resource("document body had no text content".into()));
    }

    let media_prefixes = match format {
        Format::Docx => ["word/media/", ""],
        Format::Odt => ["Pictures/", ""],
    };
    let image_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(media_prefixes[0]))
        .map(str::to_string)
        .collect();

    let mut images = Vec::new();
    for name in image_names {
        let mut file = archive
            .by_name(&name)
            .map_err(|e| AppError::Resource(format!("failed to open embedded image: {e}")))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| AppError::Resource(format!("failed to read embedded image: {e}")))?;
        images.push(EmbeddedImage { name, bytes: data });
    }

    let content = DocumentContent::from_lines_with_line_numbers(lines);
    content.validate()?;
    Ok(BinaryDocument { content, images })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_docx(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_text_from_docx_body() {
        let xml = "<w:document><w:body><w:p>Hello world</w:p></w:body></w:document>";
        let bytes = build_docx(xml);
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.content.lines.iter().any(|l| l.contains("Hello world")));
    }

    #[test]
    fn rejects_non_document_zip() {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            writer
                .start_file("readme.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"not a document").unwrap();
            writer.finish().unwrap();
        }
        assert!(decode(&buf).is_err());
    }
}
