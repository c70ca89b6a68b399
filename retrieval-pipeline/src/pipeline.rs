//! `QueryPipeline`: assembles the eight stages and runs a query end to end.

use std::sync::Arc;

use common::{cache::ResponseCache, error::AppError, tagged_span::TaggedSpan, utils::config::AppConfig};
use provider::ModelProvider;
use vector_store::VectorStore;

use crate::context::PipelineContext;
use crate::stage::{run_stages, BoxedStage, PipelineStageTimings};
use crate::stages::{DedupStage, EmbedStage, ExpandStage, KneeStage, RepairStage, RerankStage, RetrieveStage, SynthesizeStage};

/// Outcome of a completed query: either a formatted answer or a rejection
/// reason, never both.
pub enum QueryOutcome {
    Answered { text: String },
    Rejected { reason: String },
}

pub struct QueryRunOutput {
    pub outcome: QueryOutcome,
    pub stage_timings: PipelineStageTimings,
}

pub struct QueryPipeline {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn VectorStore>,
    config: AppConfig,
    cache: Option<Arc<ResponseCache>>,
}

impl QueryPipeline {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn VectorStore>,
        config: AppConfig,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            cache,
        }
    }

    fn stages() -> Vec<BoxedStage> {
        vec![
            Box::new(EmbedStage),
            Box::new(RetrieveStage),
            Box::new(KneeStage),
            Box::new(RerankStage),
            Box::new(ExpandStage),
            Box::new(DedupStage),
            Box::new(SynthesizeStage),
            Box::new(RepairStage),
        ]
    }

    pub async fn run(&self, question: &str) -> Result<QueryRunOutput, AppError> {
        let tag = TaggedSpan::query(question);
        let _guard = tag.enter();

        let mut ctx = PipelineContext::new(
            question.to_string(),
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.config.clone(),
            self.cache.clone(),
        );

        run_stages(Self::stages(), &mut ctx).await?;

        let outcome = match (ctx.rejected, ctx.final_answer) {
            (Some(reason), _) => QueryOutcome::Rejected { reason },
            (None, Some(text)) => QueryOutcome::Answered { text },
            (None, None) => QueryOutcome::Rejected {
                reason: "no answer was produced".into(),
            },
        };

        Ok(QueryRunOutput {
            outcome,
            stage_timings: ctx.stage_timings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use provider::{AnswerItem, ChunkDecision, QueryResult, RerankResult, VisionResult};
    use vector_store::{InMemoryVectorStore, Point, PointPayload, Range};

    struct StubProvider {
        answer: String,
        chunk_refs: Vec<String>,
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        async fn chunk(&self, _: &str) -> Result<ChunkDecision, AppError> {
            unimplemented!()
        }
        async fn rerank(&self, _: &str, documents: &[String]) -> Result<RerankResult, AppError> {
            Ok(RerankResult {
                reranked_indices: (0..documents.len()).collect(),
                is_rejected: false,
                rejection_reason: None,
            })
        }
        async fn query(&self, _: &str, _: &str) -> Result<QueryResult, AppError> {
            Ok(QueryResult {
                question_rephrased: String::new(),
                answer_list: vec![AnswerItem {
                    answer: self.answer.clone(),
                    chunk_ref_list: self.chunk_refs.clone(),
                }],
                answer_conclusion: String::new(),
                follow_up_questions_list: vec![],
                is_rejected: false,
                rejection_reason: None,
            })
        }
        async fn vision(&self, _: &str, _: &str) -> Result<VisionResult, AppError> {
            unimplemented!()
        }
    }

    fn default_config() -> AppConfig {
        AppConfig {
            openai_api_key: String::new(),
            surrealdb_address: String::new(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: String::new(),
            surrealdb_database: String::new(),
            data_dir: "./data".into(),
            openai_base_url: String::new(),
            model_chunk: String::new(),
            model_embed: String::new(),
            model_rerank: String::new(),
            model_query: String::new(),
            model_vision: String::new(),
            temperature_query: 0.2,
            chunk_lines_block: 24,
            retrieve_score_min: 0.0,
            retrieve_chunks_max: 10,
            retrieve_knee_enable: false,
            retrieve_knee_sensitivity: 1.0,
            retrieve_knee_min_chunks: 1,
            rerank_chunks_max: 10,
            expand_chunks_radius: 0,
            ocr_strategy: common::utils::config::OcrStrategy::Auto,
            ocr_auto_threshold: 500,
            invalidate_cache: false,
            max_workers: 2,
            retry_predelay: 0.0,
            retry_delay_min: 1.0,
            retry_delay_max: 2.0,
            retry_backoff_exponent: 2.0,
            retry_retries: 0,
        }
    }

    fn point(id: &str, chunk_index: usize, text: &str) -> Point {
        Point {
            id: id.into(),
            embedding: vec![1.0, 0.0],
            payload: PointPayload {
                file_path: "notes.md".into(),
                file_mtime: 42,
                chunk_index,
                chunks_total: 2,
                chunk_text: text.into(),
                version: None,
                line_range: Some(Range { start: chunk_index as u32 + 1, end: chunk_index as u32 + 1 }),
                page_range: None,
            },
        }
    }

    #[tokio::test]
    async fn answers_with_references_section_when_model_cites_a_known_hash() {
        let store = Arc::new(InMemoryVectorStore::new());
        let p = point("a", 0, "the sky is blue");
        let hash = crate::stages_test_support::hash_of(&p);
        store.upsert(vec![p]).await.unwrap();

        let provider = Arc::new(StubProvider {
            answer: "The sky is blue.".into(),
            chunk_refs: vec![format!("<<< {hash} >>>")],
        });
        let pipeline = QueryPipeline::new(provider, store, default_config(), None);
        let output = pipeline.run("what color is the sky?").await.unwrap();

        match output.outcome {
            QueryOutcome::Answered { text } => {
                assert!(text.contains("### References"));
                assert!(text.contains("**[1]**"));
            }
            QueryOutcome::Rejected { reason } => panic!("expected an answer, got rejection: {reason}"),
        }
    }

    #[tokio::test]
    async fn empty_store_yields_rejection() {
        let store = Arc::new(InMemoryVectorStore::new());
        let provider = Arc::new(StubProvider {
            answer: "irrelevant".into(),
            chunk_refs: vec![],
        });
        let pipeline = QueryPipeline::new(provider, store, default_config(), None);
        let output = pipeline.run("anything?").await.unwrap();
        assert!(matches!(output.outcome, QueryOutcome::Rejected { .. }));
    }
}
