//! The eight `PipelineStage` implementations: embed, retrieve, knee,
//! rerank, expand, dedup, synthesize, repair.

use async_trait::async_trait;
use common::{error::AppError, hashing};
use vector_store::ScoredPoint;

use crate::context::PipelineContext;
use crate::knee::find_score_cutoff_index;
use crate::reference::{format_answer, repair_references};
use crate::stage::{PipelineStage, StageKind};

pub struct EmbedStage;

#[async_trait]
impl PipelineStage for EmbedStage {
    fn kind(&self) -> StageKind {
        StageKind::Embed
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let mut vectors = ctx.provider.embed(std::slice::from_ref(&ctx.question)).await?;
        ctx.query_embedding = vectors.pop().ok_or_else(|| {
            AppError::InternalError("embedding provider returned no vector for the query".into())
        })?;
        Ok(())
    }
}

pub struct RetrieveStage;

#[async_trait]
impl PipelineStage for RetrieveStage {
    fn kind(&self) -> StageKind {
        StageKind::Retrieve
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let results = ctx
            .store
            .search(&ctx.query_embedding, ctx.config.retrieve_chunks_max)
            .await?;
        let score_min = ctx.config.retrieve_score_min;
        ctx.candidates = results.into_iter().filter(|r| r.score >= score_min).collect();
        Ok(())
    }
}

pub struct KneeStage;

#[async_trait]
impl PipelineStage for KneeStage {
    fn kind(&self) -> StageKind {
        StageKind::Knee
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        if !ctx.config.retrieve_knee_enable {
            return Ok(());
        }
        let scores: Vec<f32> = ctx.candidates.iter().map(|c| c.score).collect();
        if let Some(cutoff) = find_score_cutoff_index(
            &scores,
            ctx.config.retrieve_knee_min_chunks,
            ctx.config.retrieve_knee_sensitivity,
        ) {
            ctx.candidates.truncate(cutoff.min(ctx.candidates.len()));
        }
        Ok(())
    }
}

pub struct RerankStage;

#[async_trait]
impl PipelineStage for RerankStage {
    fn kind(&self) -> StageKind {
        StageKind::Rerank
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        if ctx.candidates.len() <= 1 {
            return Ok(());
        }

        let documents: Vec<String> = ctx.candidates.iter().map(|c| c.point.payload.chunk_text.clone()).collect();
        let result = match ctx.provider.rerank(&ctx.question, &documents).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "rerank call failed, keeping retrieval order");
                ctx.candidates.truncate(ctx.config.rerank_chunks_max);
                return Ok(());
            }
        };

        if result.is_rejected {
            tracing::warn!(reason = ?result.rejection_reason, "rerank rejected, keeping retrieval order");
            ctx.candidates.truncate(ctx.config.rerank_chunks_max);
            return Ok(());
        }

        let n = ctx.candidates.len();
        let mut seen = vec![false; n];
        let is_permutation = result.reranked_indices.len() == n
            && result.reranked_indices.iter().all(|&i| {
                if i >= n || seen[i] {
                    false
                } else {
                    seen[i] = true;
                    true
                }
            });

        if !is_permutation {
            tracing::warn!(indices = ?result.reranked_indices, "rerank did not return a valid permutation, keeping retrieval order");
            ctx.candidates.truncate(ctx.config.rerank_chunks_max);
            return Ok(());
        }

        let mut reordered: Vec<ScoredPoint> = result
            .reranked_indices
            .into_iter()
            .map(|i| ctx.candidates[i].clone())
            .collect();
        reordered.truncate(ctx.config.rerank_chunks_max);
        ctx.candidates = reordered;
        Ok(())
    }
}

pub struct ExpandStage;

#[async_trait]
impl PipelineStage for ExpandStage {
    fn kind(&self) -> StageKind {
        StageKind::Expand
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let radius = ctx.config.expand_chunks_radius;
        let mut expanded = Vec::new();

        for candidate in &ctx.candidates {
            expanded.push(candidate.clone());
            if radius == 0 {
                continue;
            }
            let file_path = &candidate.point.payload.file_path;
            let chunks_total = candidate.point.payload.chunks_total;
            let center = candidate.point.payload.chunk_index;

            for offset in 1..=radius {
                if let Some(idx) = center.checked_sub(offset) {
                    if let Some(neighbor) = ctx.store.fetch_by_file_chunk(file_path, idx).await? {
                        expanded.push(ScoredPoint {
                            point: neighbor,
                            score: candidate.score,
                        });
                    }
                }
                let idx = center + offset;
                if idx < chunks_total {
                    if let Some(neighbor) = ctx.store.fetch_by_file_chunk(file_path, idx).await? {
                        expanded.push(ScoredPoint {
                            point: neighbor,
                            score: candidate.score,
                        });
                    }
                }
            }
        }

        ctx.expanded = expanded;
        Ok(())
    }
}

pub struct DedupStage;

#[async_trait]
impl PipelineStage for DedupStage {
    fn kind(&self) -> StageKind {
        StageKind::Dedup
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let mut seen = std::collections::HashSet::new();
        ctx.expanded.retain(|sp| {
            seen.insert((sp.point.payload.file_path.clone(), sp.point.payload.chunk_index))
        });
        Ok(())
    }
}

fn point_hash(point: &vector_store::Point) -> String {
    let payload = &point.payload;
    hashing::point_hash(
        payload.chunk_index,
        payload.chunks_total,
        &payload.file_path,
        payload.file_mtime,
        payload.line_range.map(|r| hashing::Range { start: r.start, end: r.end }),
        payload.page_range.map(|r| hashing::Range { start: r.start, end: r.end }),
    )
}

pub struct SynthesizeStage;

#[async_trait]
impl PipelineStage for SynthesizeStage {
    fn kind(&self) -> StageKind {
        StageKind::Synthesize
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        if ctx.expanded.is_empty() {
            ctx.rejected = Some("no relevant context found".into());
            return Ok(());
        }

        let context_block = ctx
            .expanded
            .iter()
            .map(|sp| format!("<<< {} >>>\n\n{}\n", point_hash(&sp.point), sp.point.payload.chunk_text))
            .collect::<Vec<_>>()
            .join("\n");

        // `query` itself is never cached (spec: answers are always freshly
        // synthesised). On rejection we still pop the most recently touched
        // cache entry as defence-in-depth, in case an embed/chunk/rerank/
        // vision call earlier in this same request populated one that's now
        // tainted by the surrounding rejected exchange.
        let result = ctx.provider.query(&ctx.question, &context_block).await?;
        if result.is_rejected {
            if let Some(cache) = ctx.cache.as_ref() {
                cache.pop_last_touched()?;
            }
            ctx.rejected = Some(result.rejection_reason.unwrap_or_else(|| "query rejected".into()));
        } else {
            ctx.raw_answer = Some(result);
        }
        Ok(())
    }
}

pub struct RepairStage;

#[async_trait]
impl PipelineStage for RepairStage {
    fn kind(&self) -> StageKind {
        StageKind::Repair
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let Some(raw_answer) = ctx.raw_answer.as_ref() else {
            return Ok(());
        };

        let hashed_chunks: Vec<(String, ScoredPoint)> = ctx
            .expanded
            .iter()
            .map(|sp| (point_hash(&sp.point), sp.clone()))
            .collect();
        let known_hashes: Vec<String> = hashed_chunks.iter().map(|(h, _)| h.clone()).collect();

        let repaired = repair_references(&raw_answer.answer_list, &known_hashes);
        if !repaired.dropped_tokens.is_empty() {
            tracing::warn!(dropped = ?repaired.dropped_tokens, "dropped unresolvable reference tokens");
        }

        let context_chunks: Vec<(&str, ScoredPoint)> =
            hashed_chunks.iter().map(|(h, sp)| (h.as_str(), sp.clone())).collect();
        ctx.final_answer = Some(format_answer(
            &ctx.question,
            &repaired,
            &raw_answer.answer_conclusion,
            &raw_answer.follow_up_questions_list,
            &context_chunks,
        ));
        Ok(())
    }
}
