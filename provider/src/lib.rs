pub mod caching;
pub mod factory;
pub mod local_http;
pub mod params;
pub mod remote_api;

pub use caching::CachingProvider;
pub use factory::{ProviderFactory, ProviderVariant};
pub use params::ProviderParams;

use async_trait::async_trait;
use common::error::AppError;
use serde::{Deserialize, Serialize};

/// A boundary decision returned by the chunking model: which sentence index,
/// 1-based over the combined carry-plus-block text passed in this call,
/// the next chunk should start at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkBoundary {
    /// 1-based position within the text passed to `chunk` (carry sentences,
    /// if any, occupy the low positions). A boundary landing inside the
    /// carry yields an empty leading chunk the caller discards.
    pub next_chunk_start: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDecision {
    pub boundaries: Vec<ChunkBoundary>,
}

/// Result of `ModelProvider::rerank`. `reranked_indices` must be a
/// permutation of `0..documents.len()`; callers fall back to the original
/// order (and log) when it isn't, or when `is_rejected`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RerankResult {
    pub reranked_indices: Vec<usize>,
    pub is_rejected: bool,
    pub rejection_reason: Option<String>,
}

/// One synthesised answer, with the context chunks it draws on. Each entry
/// of `chunk_ref_list` is expected in `"<<< <16-hex> >>>"` form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerItem {
    pub answer: String,
    pub chunk_ref_list: Vec<String>,
}

/// Result of `ModelProvider::query`. Never cached. A rejected response
/// leaves every field but `is_rejected`/`rejection_reason` blank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResult {
    pub question_rephrased: String,
    pub answer_list: Vec<AnswerItem>,
    pub answer_conclusion: String,
    pub follow_up_questions_list: Vec<String>,
    pub is_rejected: bool,
    pub rejection_reason: Option<String>,
}

/// Result of `ModelProvider::vision`. A content-filter signal from the
/// provider is translated into a structured rejection, not a fatal error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisionResult {
    pub entities: Vec<String>,
    pub relations: Vec<String>,
    pub answer: String,
    pub is_rejected: bool,
    pub rejection_reason: Option<String>,
}

/// Vendor-agnostic capability surface every concrete provider variant
/// implements. Grounded in `ingestion-pipeline/src/enricher.rs` (chat +
/// JSON schema), `common/src/utils/embedding.rs` (embeddings), and
/// `ingestion-pipeline/src/utils/image_parsing.rs` (vision).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    /// Asks the chunking model where, within `block_text` (one sentence per
    /// line, numbered 1-based), chunk boundaries fall. `block_text` already
    /// has any tail carried over from the previous block's last (possibly
    /// incomplete) chunk prepended and renumbered into the same sequence —
    /// there is no separate carry parameter, so a reported boundary is
    /// always resolvable against this one numbered text.
    async fn chunk(&self, block_text: &str) -> Result<ChunkDecision, AppError>;

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<RerankResult, AppError>;

    /// Synthesises an answer from `context` (already-assembled chunk text,
    /// each block prefixed with a `<<< hash >>>` provenance token) in
    /// response to `prompt`.
    async fn query(&self, prompt: &str, context: &str) -> Result<QueryResult, AppError>;

    /// Describes the contents of a base64-encoded image.
    async fn vision(&self, image_base64: &str, mime: &str) -> Result<VisionResult, AppError>;
}
