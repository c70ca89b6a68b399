//! Provenance hashing.
//!
//! Grounded in `archive_agent/ai/AiManager.py::get_point_hash`: a SHA-1
//! digest, truncated to its first 16 hex characters, computed over the
//! concatenation of the fields that uniquely identify a chunk's provenance.
//! This is a display/lookup identifier, not a security primitive.

use sha1::{Digest, Sha1};

/// An inclusive numeric range, rendered as `"start-end"`, or the empty
/// string when absent (mirrors the original's "empty string when the range
/// has no value" convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    fn format(range: Option<Range>) -> String {
        match range {
            Some(r) => format!("{}-{}", r.start, r.end),
            None => String::new(),
        }
    }
}

/// Computes the 16-hex-character provenance hash for a chunk.
pub fn point_hash(
    chunk_index: usize,
    chunks_total: usize,
    file_path: &str,
    file_mtime: i64,
    line_range: Option<Range>,
    page_range: Option<Range>,
) -> String {
    let material = format!(
        "{chunk_index}|{chunks_total}|{file_path}|{file_mtime}|{}|{}",
        Range::format(line_range),
        Range::format(page_range),
    );

    let mut hasher = Sha1::new();
    hasher.update(material.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(40);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex.truncate(16);
    hex
}

/// Hamming distance between two equal-length hex strings, treating each hex
/// character as a 4-bit nibble. Returns `None` if the lengths differ.
pub fn hamming_distance_hex(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    let mut distance = 0u32;
    for (ca, cb) in a.chars().zip(b.chars()) {
        let na = ca.to_digit(16)?;
        let nb = cb.to_digit(16)?;
        distance += (na ^ nb).count_ones();
    }
    Some(distance)
}
