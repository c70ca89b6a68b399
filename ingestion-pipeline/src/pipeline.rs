//! Ingestion entry points: `add`, `change`, `remove`. Grounded in the
//! teacher's `pipeline.rs` task lifecycle, generalized from a task-queue
//! worker loop to a direct synchronous call per operation, since nothing
//! in this system claims ingestion tasks from a shared queue.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use chunker::{ChunkWithRange, Chunker, RuleBasedSegmenter, Segmenter};
use common::{error::AppError, retry::RetryPolicy, tagged_span::TaggedSpan, utils::config::AppConfig};
use decoders::content::DocumentContent;
use provider::ModelProvider;
use vector_store::{new_point_id, Filter, Point, PointPayload, Range, VectorStore};

use crate::decode::decode_file;
use crate::embedder::Embedder;
use crate::vision_worker::VisionWorker;

pub struct IngestionPipeline {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn VectorStore>,
    config: AppConfig,
}

impl IngestionPipeline {
    pub fn new(provider: Arc<dyn ModelProvider>, store: Arc<dyn VectorStore>, config: AppConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.retry_predelay,
            self.config.retry_delay_min,
            self.config.retry_delay_max,
            self.config.retry_backoff_exponent,
            self.config.retry_retries,
        )
    }

    /// Decodes, segments, chunks, embeds, and upserts every chunk of
    /// `path`. Returns the number of points written.
    pub async fn add(&self, path: &Path) -> Result<usize, AppError> {
        let file_path = path.to_string_lossy().into_owned();
        let tag = TaggedSpan::file(&file_path);
        let _guard = tag.enter();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Resource(format!("failed to read {}: {e}", path.display())))?;
        let mtime = file_mtime(path).await?;

        let points = self.build_points(&file_path, mtime, &bytes).await?;

        if points.is_empty() {
            return Ok(0);
        }
        let written = points.len();
        self.store.upsert(points).await?;
        Ok(written)
    }

    /// Re-ingests `path`: decodes and chunks the new content, then deletes
    /// the file's old points before upserting the new ones.
    pub async fn change(&self, path: &Path) -> Result<usize, AppError> {
        let file_path = path.to_string_lossy().into_owned();
        let tag = TaggedSpan::file(&file_path);
        let _guard = tag.enter();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Resource(format!("failed to read {}: {e}", path.display())))?;
        let mtime = file_mtime(path).await?;

        let points = self.build_points(&file_path, mtime, &bytes).await?;
        let written = points.len();

        self.store.delete_by(&file_path).await?;
        if !points.is_empty() {
            self.store.upsert(points).await?;
        }
        Ok(written)
    }

    /// Deletes every point belonging to `path`. A no-op (returns `0`) when
    /// the file has no ingested points.
    pub async fn remove(&self, path: &Path) -> Result<u64, AppError> {
        let file_path = path.to_string_lossy().into_owned();
        let tag = TaggedSpan::file(&file_path);
        let _guard = tag.enter();

        let existing = self.store.count(Some(&Filter::FilePathEquals(file_path.clone()))).await?;
        if existing == 0 {
            return Ok(0);
        }
        self.store.delete_by(&file_path).await
    }

    async fn build_points(
        &self,
        file_path: &str,
        mtime: i64,
        bytes: &[u8],
    ) -> Result<Vec<Point>, AppError> {
        let pool_size = self.config.max_workers;
        let vision = VisionWorker::with_retry(Arc::clone(&self.provider), pool_size, self.retry_policy());
        let content = decode_file(Path::new(file_path), bytes, &self.config, &vision).await?;

        let sentences = RuleBasedSegmenter.segment(&content.lines, &refs_of(&content));
        let chunker = Chunker::new(
            self.provider.as_ref(),
            self.retry_policy(),
            self.config.chunk_lines_block,
        );
        let chunks = chunker.generate_chunks(&sentences, file_path).await?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = Embedder::with_retry(Arc::clone(&self.provider), pool_size, self.retry_policy());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_all(&texts).await;

        let chunks_total = chunks.len();
        let is_page_based = content.pages_per_line.is_some();

        let mut points = Vec::with_capacity(chunks_total);
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let Some(embedding) = embedding else {
                tracing::warn!(chunk_index = chunk.index, "dropping chunk with no embedding");
                continue;
            };
            let mut payload = payload_for(file_path, mtime, chunks_total, &chunk, is_page_based);
            payload.validate()?;
            points.push(Point {
                id: new_point_id(),
                embedding,
                payload,
            });
        }
        Ok(points)
    }
}

fn refs_of(content: &DocumentContent) -> Vec<u32> {
    content
        .lines_per_line
        .clone()
        .or_else(|| content.pages_per_line.clone())
        .unwrap_or_default()
}

fn payload_for(
    file_path: &str,
    file_mtime: i64,
    chunks_total: usize,
    chunk: &ChunkWithRange,
    is_page_based: bool,
) -> PointPayload {
    let range = chunk.ref_start.zip(chunk.ref_end).map(|(start, end)| {
        if start == end {
            Range { start, end: start }
        } else {
            Range { start, end }
        }
    });

    PointPayload {
        file_path: file_path.to_string(),
        file_mtime,
        chunk_index: chunk.index,
        chunks_total,
        chunk_text: chunk.text.clone(),
        version: None,
        line_range: if is_page_based { None } else { range },
        page_range: if is_page_based { range } else { None },
    }
}

async fn file_mtime(path: &Path) -> Result<i64, AppError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::Resource(format!("failed to stat {}: {e}", path.display())))?;
    let modified = metadata
        .modified()
        .map_err(|e| AppError::Resource(format!("mtime unavailable for {}: {e}", path.display())))?;
    let seconds = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Resource(format!("invalid mtime: {e}")))?
        .as_secs();
    Ok(seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_endpoint_range_collapses_to_single_value() {
        let chunk = ChunkWithRange {
            index: 0,
            text: "x".into(),
            ref_start: Some(3),
            ref_end: Some(3),
        };
        let payload = payload_for("f.txt", 0, 1, &chunk, false);
        assert_eq!(payload.line_range, Some(Range { start: 3, end: 3 }));
        assert_eq!(payload.page_range, None);
    }

    #[test]
    fn differing_endpoints_keep_min_max_range() {
        let chunk = ChunkWithRange {
            index: 0,
            text: "x".into(),
            ref_start: Some(2),
            ref_end: Some(5),
        };
        let payload = payload_for("f.pdf", 0, 1, &chunk, true);
        assert_eq!(payload.page_range, Some(Range { start: 2, end: 5 }));
        assert_eq!(payload.line_range, None);
    }

    #[test]
    fn missing_range_leaves_both_fields_none_before_validate() {
        let chunk = ChunkWithRange {
            index: 0,
            text: "x".into(),
            ref_start: None,
            ref_end: None,
        };
        let payload = payload_for("f.txt", 0, 1, &chunk, false);
        assert_eq!(payload.line_range, None);
        assert_eq!(payload.page_range, None);
    }
}
