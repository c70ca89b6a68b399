//! Reference-token extraction, Hamming-distance repair, and answer
//! formatting. Grounded in `archive_agent/ai/AiManager.py`
//! (`get_context_from_points`, `format_query_references`): context blocks
//! are prefixed with a `<<< hash >>>` token, and each synthesised answer
//! is expected to echo that token back in its `chunk_ref_list` for whatever
//! chunk it drew on. The original falls back to a literal `??? (hash)`
//! marker when a token doesn't match any known chunk; this pipeline instead
//! tries to repair it via Hamming distance first (spec.md §4.10 step 8 /
//! `DESIGN.md` Open Question resolution), only dropping the token if no
//! candidate is close enough.

use std::collections::HashMap;

use common::hashing::hamming_distance_hex;
use provider::AnswerItem;
use vector_store::{Range, ScoredPoint};

/// Maximum hex-nibble Hamming distance tolerated when repairing a
/// reference token that doesn't exactly match any chunk in context.
pub const HASH_REPAIR_MAX_DIST: u32 = 2;

pub struct RepairedAnswerItem {
    pub answer: String,
    /// Reference numbers (1-based, first-appearance order shared across
    /// every answer) this item's resolved `chunk_ref_list` entries map to.
    pub ref_numbers: Vec<usize>,
}

pub struct RepairedAnswer {
    pub items: Vec<RepairedAnswerItem>,
    /// Hashes actually referenced across all answers, in first-appearance order.
    pub used_hashes: Vec<String>,
    /// Tokens that could not be resolved to any known chunk, for logging.
    pub dropped_tokens: Vec<String>,
}

struct TokenSpan {
    inner: String,
}

fn find_tokens(text: &str) -> Vec<TokenSpan> {
    let mut spans = Vec::new();
    let mut search_from = 0;
    while let Some(rel_open) = text[search_from..].find("<<<") {
        let open = search_from + rel_open;
        let Some(rel_close) = text[open..].find(">>>") else {
            break;
        };
        let close = open + rel_close + 3;
        let inner = text[open + 3..open + rel_close].trim().to_string();
        spans.push(TokenSpan { inner });
        search_from = close;
    }
    spans
}

/// A `chunk_ref_list` entry is expected as `"<<< <16-hex> >>>"`; this pulls
/// the hex token out of that wrapper, falling back to the trimmed raw
/// string if the model omitted it.
fn extract_ref_token(raw: &str) -> String {
    find_tokens(raw)
        .into_iter()
        .next()
        .map(|span| span.inner)
        .unwrap_or_else(|| raw.trim().to_string())
}

fn repair_token(token: &str, known_hashes: &[String]) -> Option<String> {
    if known_hashes.iter().any(|h| h.eq_ignore_ascii_case(token)) {
        return known_hashes.iter().find(|h| h.eq_ignore_ascii_case(token)).cloned();
    }
    if token.len() != 16 {
        return None;
    }
    known_hashes
        .iter()
        .filter_map(|h| hamming_distance_hex(token, h).map(|d| (d, h)))
        .filter(|(d, _)| *d <= HASH_REPAIR_MAX_DIST)
        .min_by_key(|(d, _)| *d)
        .map(|(_, h)| h.clone())
}

/// Resolves every answer item's `chunk_ref_list` against `known_hashes`,
/// assigning shared, first-appearance-ordered reference numbers. Entries
/// that cannot be resolved (even after Hamming-distance repair) are
/// discarded, not replaced by a placeholder.
pub fn repair_references(answer_list: &[AnswerItem], known_hashes: &[String]) -> RepairedAnswer {
    let mut order: Vec<String> = Vec::new();
    let mut dropped_tokens = Vec::new();
    let mut items = Vec::with_capacity(answer_list.len());

    for item in answer_list {
        let mut ref_numbers = Vec::new();
        for raw_ref in &item.chunk_ref_list {
            let token = extract_ref_token(raw_ref);
            match repair_token(&token, known_hashes) {
                Some(hash) => {
                    let n = match order.iter().position(|h| h == &hash) {
                        Some(i) => i + 1,
                        None => {
                            order.push(hash);
                            order.len()
                        }
                    };
                    if !ref_numbers.contains(&n) {
                        ref_numbers.push(n);
                    }
                }
                None => dropped_tokens.push(token),
            }
        }
        items.push(RepairedAnswerItem {
            answer: collapse_double_spaces(&item.answer),
            ref_numbers,
        });
    }

    RepairedAnswer {
        items,
        used_hashes: order,
        dropped_tokens,
    }
}

fn collapse_double_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        out.push(ch);
    }
    out
}

fn format_range(line_range: Option<Range>, page_range: Option<Range>) -> String {
    if let Some(r) = line_range {
        if r.start == r.end {
            format!("line {}", r.start)
        } else {
            format!("lines {}-{}", r.start, r.end)
        }
    } else if let Some(r) = page_range {
        if r.start == r.end {
            format!("page {}", r.start)
        } else {
            format!("pages {}-{}", r.start, r.end)
        }
    } else {
        String::new()
    }
}

/// Assembles the final "Question / Answers / Conclusion / References /
/// Follow-Up Questions" sections (spec.md §4.10 step 9). `Conclusion`,
/// `References`, and `Follow-Up Questions` are each omitted when empty.
pub fn format_answer(
    question: &str,
    repaired: &RepairedAnswer,
    answer_conclusion: &str,
    follow_up_questions: &[String],
    context_chunks: &[(&str, ScoredPoint)],
) -> String {
    let by_hash: HashMap<&str, &ScoredPoint> = context_chunks.iter().map(|(hash, point)| (*hash, point)).collect();

    let answers_text = repaired
        .items
        .iter()
        .map(|item| {
            if item.ref_numbers.is_empty() {
                item.answer.clone()
            } else {
                let suffix = item
                    .ref_numbers
                    .iter()
                    .map(|n| format!("**[{n}]**"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} {suffix}", item.answer)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let references_text = repaired
        .used_hashes
        .iter()
        .enumerate()
        .filter_map(|(i, hash)| {
            by_hash.get(hash.as_str()).map(|point| {
                let range = format_range(point.point.payload.line_range, point.point.payload.page_range);
                if range.is_empty() {
                    format!("- **[{}]** {}", i + 1, point.point.payload.file_path)
                } else {
                    format!("- **[{}]** {} ({})", i + 1, point.point.payload.file_path, range)
                }
            })
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut sections = vec![
        "### Question".to_string(),
        format!("**{question}**"),
        "### Answers".to_string(),
        answers_text,
    ];

    if !answer_conclusion.trim().is_empty() {
        sections.push("### Conclusion".to_string());
        sections.push(answer_conclusion.to_string());
    }
    if !references_text.is_empty() {
        sections.push("### References".to_string());
        sections.push(references_text);
    }
    if !follow_up_questions.is_empty() {
        sections.push("### Follow-Up Questions".to_string());
        let list = follow_up_questions.iter().map(|q| format!("- {q}")).collect::<Vec<_>>().join("\n");
        sections.push(list);
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vector_store::{Point, PointPayload};

    fn item(answer: &str, refs: &[&str]) -> AnswerItem {
        AnswerItem {
            answer: answer.to_string(),
            chunk_ref_list: refs.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn exact_token_match_becomes_numbered_marker() {
        let known = vec!["abcdef0123456789".to_string()];
        let answers = vec![item("The sky is blue.", &["<<< abcdef0123456789 >>>"])];
        let repaired = repair_references(&answers, &known);
        assert_eq!(repaired.items[0].ref_numbers, vec![1]);
        assert_eq!(repaired.used_hashes, vec!["abcdef0123456789".to_string()]);
    }

    #[test]
    fn close_token_is_repaired_via_hamming_distance() {
        // differs in the low nibble of the last byte only (one bit flip)
        let known = vec!["abcdef0123456789".to_string()];
        let answers = vec![item("Claim.", &["<<< abcdef0123456788 >>>"])];
        let repaired = repair_references(&answers, &known);
        assert_eq!(repaired.used_hashes, vec!["abcdef0123456789".to_string()]);
    }

    #[test]
    fn unresolvable_token_is_dropped() {
        let known = vec!["abcdef0123456789".to_string()];
        let answers = vec![item("Claim.", &["<<< ffffffffffffffff >>>"])];
        let repaired = repair_references(&answers, &known);
        assert!(repaired.used_hashes.is_empty());
        assert_eq!(repaired.dropped_tokens, vec!["ffffffffffffffff".to_string()]);
        assert!(repaired.items[0].ref_numbers.is_empty());
    }

    #[test]
    fn repeated_hash_across_answers_gets_a_single_shared_number() {
        let known = vec!["abcdef0123456789".to_string()];
        let answers = vec![
            item("First.", &["<<< abcdef0123456789 >>>"]),
            item("Then again.", &["<<< abcdef0123456789 >>>"]),
        ];
        let repaired = repair_references(&answers, &known);
        assert_eq!(repaired.items[0].ref_numbers, vec![1]);
        assert_eq!(repaired.items[1].ref_numbers, vec![1]);
        assert_eq!(repaired.used_hashes.len(), 1);
    }

    #[test]
    fn format_answer_includes_every_populated_section() {
        let known = vec!["abcdef0123456789".to_string()];
        let answers = vec![item("The sky is blue.", &["<<< abcdef0123456789 >>>"])];
        let repaired = repair_references(&answers, &known);

        let point = ScoredPoint {
            point: Point {
                id: "a".into(),
                embedding: vec![1.0, 0.0],
                payload: PointPayload {
                    file_path: "notes.md".into(),
                    file_mtime: 0,
                    chunk_index: 0,
                    chunks_total: 1,
                    chunk_text: "the sky is blue".into(),
                    version: None,
                    line_range: Some(Range { start: 1, end: 1 }),
                    page_range: None,
                },
            },
            score: 1.0,
        };
        let context_chunks: Vec<(&str, ScoredPoint)> = vec![("abcdef0123456789", point)];

        let formatted = format_answer(
            "what color is the sky?",
            &repaired,
            "It's blue.",
            &["anything else?".to_string()],
            &context_chunks,
        );

        assert!(formatted.contains("### Question"));
        assert!(formatted.contains("### Answers"));
        assert!(formatted.contains("**[1]**"));
        assert!(formatted.contains("### Conclusion"));
        assert!(formatted.contains("It's blue."));
        assert!(formatted.contains("### References"));
        assert!(formatted.contains("### Follow-Up Questions"));
        assert!(formatted.contains("anything else?"));
    }
}
