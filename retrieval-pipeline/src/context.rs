//! Mutable state threaded through the query pipeline's stages. Grounded in
//! `retrieval-pipeline/src/pipeline/stages/mod.rs`'s `PipelineContext`
//! (teacher), generalized from the entity/graph fields it carried to the
//! flat chunk-retrieval fields this pipeline's stages need.

use std::sync::Arc;

use common::{cache::ResponseCache, utils::config::AppConfig};
use provider::{ModelProvider, QueryResult};
use vector_store::{ScoredPoint, VectorStore};

use crate::stage::PipelineStageTimings;

pub struct PipelineContext {
    pub question: String,
    pub provider: Arc<dyn ModelProvider>,
    pub store: Arc<dyn VectorStore>,
    pub config: AppConfig,
    pub cache: Option<Arc<ResponseCache>>,

    pub query_embedding: Vec<f32>,
    pub candidates: Vec<ScoredPoint>,
    pub expanded: Vec<ScoredPoint>,

    pub raw_answer: Option<QueryResult>,
    pub rejected: Option<String>,
    pub final_answer: Option<String>,

    pub stage_timings: PipelineStageTimings,
}

impl PipelineContext {
    pub fn new(
        question: String,
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn VectorStore>,
        config: AppConfig,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        Self {
            question,
            provider,
            store,
            config,
            cache,
            query_embedding: Vec::new(),
            candidates: Vec::new(),
            expanded: Vec::new(),
            raw_answer: None,
            rejected: None,
            final_answer: None,
            stage_timings: PipelineStageTimings::default(),
        }
    }
}
