//! Block-wise, LLM-driven semantic chunking.
//!
//! Grounded in `archive_agent/data/chunk.py::generate_chunks_with_ranges`:
//! sentences are grouped into fixed-size blocks; for each block, the tail
//! carried over from the previous block's last (possibly incomplete) chunk
//! is prepended into the same numbered text the chunking model sees, so a
//! boundary index is always 1-based over the combined carry+block
//! sequence — never over the block alone. A sentinel index of `total + 1`
//! is appended to the collected boundary list so the final chunk's end is
//! always well-defined. Reference ranges are aggregated as `(min, max)`
//! over each chunk's sentences, ignoring sentences whose reference is `0`
//! (the paragraph-separator placeholder).

use common::{error::AppError, retry::RetryPolicy};
use provider::ModelProvider;
use serde::{Deserialize, Serialize};

use crate::segment::SentenceSpan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWithRange {
    pub index: usize,
    pub text: String,
    pub ref_start: Option<u32>,
    pub ref_end: Option<u32>,
}

/// Header line convention. The legacy format additionally prefixed a
/// `# file://<uri>` line before the header; `chunker::legacy` reads either
/// form back.
fn format_chunk(header: &str, body: &str) -> String {
    format!("# {header}\n\n{body}")
}

fn aggregate_range(sentences: &[&SentenceSpan]) -> Option<(u32, u32)> {
    let refs: Vec<u32> = sentences
        .iter()
        .flat_map(|s| [s.ref_start, s.ref_end])
        .filter(|&r| r != 0)
        .collect();
    if refs.is_empty() {
        return None;
    }
    let min = *refs.iter().min().unwrap_or(&0);
    let max = *refs.iter().max().unwrap_or(&0);
    Some((min, max))
}

fn body_text(sentences: &[&SentenceSpan]) -> String {
    sentences
        .iter()
        .filter(|s| !s.text.is_empty())
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Chunker<'a> {
    provider: &'a dyn ModelProvider,
    retry: RetryPolicy,
    block_size: usize,
}

impl<'a> Chunker<'a> {
    pub fn new(provider: &'a dyn ModelProvider, retry: RetryPolicy, block_size: usize) -> Self {
        Self {
            provider,
            retry,
            block_size: block_size.max(1),
        }
    }

    pub async fn generate_chunks(
        &self,
        sentences: &[SentenceSpan],
        header: &str,
    ) -> Result<Vec<ChunkWithRange>, AppError> {
        if sentences.is_empty() {
            return Ok(Vec::new());
        }

        let total = sentences.len();
        let mut chunk_start_lines: Vec<usize> = vec![0];
        let mut pending_start = 0usize;
        let mut block_begin = 0usize;

        while block_begin < total {
            let block_end = (block_begin + self.block_size).min(total);
            // The carry (previous block's unfinished tail) is prepended
            // into the same numbered text, not sent as a separate preface —
            // so a boundary the model reports is always 1-based over this
            // whole combined slice, carry included.
            let combined: Vec<&SentenceSpan> = sentences[pending_start..block_end].iter().collect();
            let combined_text: String = combined
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}: {}", i + 1, s.text))
                .collect::<Vec<_>>()
                .join("\n");

            let decision = self.retry.run(|| self.provider.chunk(&combined_text)).await?;

            let Some(decision) = decision else {
                tracing::warn!(pending_start, block_end, "chunk boundary call exhausted retries, carrying block over whole");
                block_begin = block_end;
                continue;
            };

            for boundary in decision.boundaries {
                let local = boundary.next_chunk_start;
                if local == 0 || local > combined.len() {
                    continue;
                }
                let global_index = pending_start + local - 1;
                let last = *chunk_start_lines.last().expect("always seeded with 0");
                if global_index > last && global_index <= block_end {
                    chunk_start_lines.push(global_index);
                }
            }

            pending_start = *chunk_start_lines.last().expect("always seeded with 0");
            block_begin = block_end;
        }

        // Sentinel: guarantees the final chunk's end is always defined.
        chunk_start_lines.push(total + 1);
        chunk_start_lines.dedup();

        let mut chunks = Vec::new();
        for (index, window) in chunk_start_lines.windows(2).enumerate() {
            let start = window[0];
            let end = window[1].min(total);
            if start >= end {
                continue;
            }
            let members: Vec<&SentenceSpan> = sentences[start..end].iter().collect();
            let range = aggregate_range(&members);
            let body = body_text(&members);
            if body.is_empty() {
                continue;
            }

            chunks.push(ChunkWithRange {
                index,
                text: format_chunk(header, &body),
                ref_start: range.map(|(min, _)| min),
                ref_end: range.map(|(_, max)| max),
            });
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use provider::{ChunkBoundary, ChunkDecision, QueryResult, RerankResult, VisionResult};

    struct FixedBoundaryProvider {
        boundaries: Vec<usize>,
    }

    #[async_trait]
    impl ModelProvider for FixedBoundaryProvider {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            unimplemented!()
        }

        async fn chunk(&self, _block_text: &str) -> Result<ChunkDecision, AppError> {
            Ok(ChunkDecision {
                boundaries: self
                    .boundaries
                    .iter()
                    .map(|&next_chunk_start| ChunkBoundary { next_chunk_start })
                    .collect(),
            })
        }

        async fn rerank(&self, _query: &str, _documents: &[String]) -> Result<RerankResult, AppError> {
            unimplemented!()
        }

        async fn query(&self, _prompt: &str, _context: &str) -> Result<QueryResult, AppError> {
            unimplemented!()
        }

        async fn vision(&self, _image_base64: &str, _mime: &str) -> Result<VisionResult, AppError> {
            unimplemented!()
        }
    }

    fn sentences(texts: &[&str]) -> Vec<SentenceSpan> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| SentenceSpan {
                text: t.to_string(),
                ref_start: (i + 1) as u32,
                ref_end: (i + 1) as u32,
            })
            .collect()
    }

    #[tokio::test]
    async fn single_block_with_no_boundaries_yields_one_chunk() {
        let provider = FixedBoundaryProvider { boundaries: vec![] };
        let chunker = Chunker::new(&provider, RetryPolicy::default(), 10);
        let spans = sentences(&["One.", "Two.", "Three."]);

        let chunks = chunker.generate_chunks(&spans, "doc").await.unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("# doc\n\n"));
        assert_eq!(chunks[0].ref_start, Some(1));
        assert_eq!(chunks[0].ref_end, Some(3));
    }

    #[tokio::test]
    async fn boundary_splits_block_into_two_chunks() {
        let provider = FixedBoundaryProvider { boundaries: vec![3] };
        let chunker = Chunker::new(&provider, RetryPolicy::default(), 10);
        let spans = sentences(&["One.", "Two.", "Three.", "Four."]);

        let chunks = chunker.generate_chunks(&spans, "doc").await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].ref_start, Some(1));
        assert_eq!(chunks[0].ref_end, Some(2));
        assert_eq!(chunks[1].ref_start, Some(3));
        assert_eq!(chunks[1].ref_end, Some(4));
    }

    #[tokio::test]
    async fn empty_input_yields_no_chunks() {
        let provider = FixedBoundaryProvider { boundaries: vec![] };
        let chunker = Chunker::new(&provider, RetryPolicy::default(), 10);
        let chunks = chunker.generate_chunks(&[], "doc").await.unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn aggregate_range_ignores_zero_refs() {
        let separator = SentenceSpan {
            text: String::new(),
            ref_start: 0,
            ref_end: 0,
        };
        let real = SentenceSpan {
            text: "x".into(),
            ref_start: 5,
            ref_end: 5,
        };
        let range = aggregate_range(&[&separator, &real]);
        assert_eq!(range, Some((5, 5)));
    }
}
