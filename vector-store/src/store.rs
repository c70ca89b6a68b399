use async_trait::async_trait;

use crate::schema::{Filter, Point, ScoredPoint};
use common::error::AppError;

/// Capability interface for the vector backend. Mirrors the shape of the
/// teacher's `SurrealDbClient` CRUD surface (`store_item`/`get_item`/
/// `delete_item`) generalized to the RAG point schema, plus the nearest
/// neighbor search the original piped through Qdrant's `search_points`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, points: Vec<Point>) -> Result<(), AppError>;

    /// Deletes every point belonging to `file_path`, returning how many were
    /// removed. Grounded in `archive_agent/db/QdrantManager.py`'s
    /// "remove all points of a file before re-ingesting its chunks" step.
    async fn delete_by(&self, file_path: &str) -> Result<u64, AppError>;

    /// Counts points, optionally narrowed by `filter`. `None` counts the
    /// whole store.
    async fn count(&self, filter: Option<&Filter>) -> Result<u64, AppError>;

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, AppError>;

    async fn fetch(&self, id: &str) -> Result<Option<Point>, AppError>;

    /// Looks up the point at a specific chunk position within a file.
    /// Grounded in `archive_agent`'s chunk-expansion step, which needs a
    /// neighboring chunk by `(file_path, chunk_index)` rather than by id.
    async fn fetch_by_file_chunk(
        &self,
        file_path: &str,
        chunk_index: usize,
    ) -> Result<Option<Point>, AppError>;

    /// Fetches up to `limit` points matching `filter`, over payload fields.
    async fn fetch_where(&self, filter: &Filter, limit: usize) -> Result<Vec<Point>, AppError>;

    /// Whether the backing collection/table has been created yet.
    async fn collection_exists(&self) -> Result<bool, AppError>;

    /// Creates the backing collection/table (and its search index), if not
    /// already present. Idempotent.
    async fn create(&self) -> Result<(), AppError>;
}
