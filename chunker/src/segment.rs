//! Rule-based sentence segmentation.
//!
//! Grounded in `archive_agent/data/chunk.py`'s `_build_para_blocks`,
//! `_process_para_block`, and `split_sentences`: paragraph blocks are
//! closed by a blank line or opened anew by a `"- "`-prefixed line (a
//! markdown list item always starts its own block, even without a
//! preceding blank line); a single line-wrap inside a block is never a
//! sentence or paragraph boundary by itself. Exposed behind [`Segmenter`]
//! so a model-backed implementation could replace the rule-based default
//! without callers changing.

/// A segmented sentence and the inclusive range of source references (line
/// numbers or page numbers, whichever the input carries) it spans. A
/// `ref_start`/`ref_end` of `0` with empty `text` marks the separator
/// inserted between two paragraph blocks.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SentenceSpan {
    pub text: String,
    pub ref_start: u32,
    pub ref_end: u32,
}

pub trait Segmenter {
    fn segment(&self, lines: &[String], refs: &[u32]) -> Vec<SentenceSpan>;
}

pub struct RuleBasedSegmenter;

impl Segmenter for RuleBasedSegmenter {
    fn segment(&self, lines: &[String], refs: &[u32]) -> Vec<SentenceSpan> {
        segment(lines, refs)
    }
}

struct ParaBlock {
    lines: Vec<(String, u32)>,
}

fn build_para_blocks(lines: &[String], refs: &[u32]) -> Vec<ParaBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<(String, u32)> = Vec::new();

    for (line, &reference) in lines.iter().zip(refs.iter()) {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if !current.is_empty() {
                blocks.push(ParaBlock {
                    lines: std::mem::take(&mut current),
                });
            }
            continue;
        }

        if trimmed.starts_with("- ") && !current.is_empty() {
            blocks.push(ParaBlock {
                lines: std::mem::take(&mut current),
            });
        }

        current.push((line.clone(), reference));
    }

    if !current.is_empty() {
        blocks.push(ParaBlock { lines: current });
    }

    blocks
}

fn normalize_whitespace(line: &str) -> String {
    let replaced: String = line
        .chars()
        .map(|c| if c == '\t' || c == '\u{a0}' { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(replaced.len());
    let mut last_was_space = false;
    for c in replaced.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

/// Splits normalized block text into sentences, each reported as a
/// `(start_char, end_char)` byte-offset span within `text`.
fn split_sentences_in_block(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if matches!(c, '.' | '!' | '?') {
            let mut end = i + 1;
            // Swallow a run of closing punctuation (e.g. "...", "?!").
            while end < bytes.len() && matches!(bytes[end] as char, '.' | '!' | '?' | '"' | '\'') {
                end += 1;
            }
            let boundary = end >= bytes.len() || bytes[end] == b' ';
            if boundary {
                let span_text = text[start..end].trim();
                if !span_text.is_empty() {
                    spans.push((start, end));
                }
                start = end;
                while start < bytes.len() && bytes[start] == b' ' {
                    start += 1;
                }
                i = start;
                continue;
            }
        }
        i += 1;
    }

    if start < bytes.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            spans.push((start, bytes.len()));
        }
    }

    spans
}

fn process_para_block(block: &ParaBlock) -> Vec<SentenceSpan> {
    let mut joined = String::new();
    let mut line_start_offsets = Vec::with_capacity(block.lines.len());
    let mut line_refs = Vec::with_capacity(block.lines.len());

    for (line, reference) in &block.lines {
        let normalized = normalize_whitespace(line);
        if normalized.is_empty() {
            continue;
        }
        if !joined.is_empty() {
            joined.push(' ');
        }
        line_start_offsets.push(joined.len());
        line_refs.push(*reference);
        joined.push_str(&normalized);
    }

    if joined.is_empty() {
        return Vec::new();
    }

    let spans = split_sentences_in_block(&joined);

    spans
        .into_iter()
        .map(|(start, end)| {
            let start_line_idx = line_index_for_offset(&line_start_offsets, start);
            let end_line_idx = line_index_for_offset(&line_start_offsets, end.saturating_sub(1));
            SentenceSpan {
                text: joined[start..end].trim().to_string(),
                ref_start: line_refs.get(start_line_idx).copied().unwrap_or(0),
                ref_end: line_refs.get(end_line_idx).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// Bisects `offsets` (ascending line-start offsets) to find the index of
/// the line containing byte offset `pos`.
fn line_index_for_offset(offsets: &[usize], pos: usize) -> usize {
    match offsets.binary_search(&pos) {
        Ok(idx) => idx,
        Err(0) => 0,
        Err(idx) => idx - 1,
    }
}

pub fn segment(lines: &[String], refs: &[u32]) -> Vec<SentenceSpan> {
    let blocks = build_para_blocks(lines, refs);
    let mut out = Vec::new();

    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push(SentenceSpan {
                text: String::new(),
                ref_start: 0,
                ref_end: 0,
            });
        }
        out.extend(process_para_block(block));
    }

    out
}
