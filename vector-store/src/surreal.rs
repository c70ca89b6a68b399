//! `VectorStore` backed by `common::storage::db::SurrealDbClient`. Grounded
//! in the teacher's `TextChunkEmbedding::vector_search` (the `<|take,100|>`
//! HNSW operator combined with `vector::similarity::cosine`) and
//! `redefine_hnsw_index` (index lifecycle via `DEFINE INDEX OVERWRITE`).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use common::error::AppError;
use common::storage::db::SurrealDbClient;

use crate::schema::{Filter, Point, PointPayload, Range, ScoredPoint};
use crate::store::VectorStore;

const TABLE: &str = "point";
const INDEX: &str = "idx_point_embedding";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct StoredPoint {
    id: String,
    embedding: Vec<f32>,
    file_path: String,
    file_mtime: i64,
    chunk_index: i64,
    chunks_total: i64,
    chunk_text: String,
    version: Option<String>,
    line_range: Option<Range>,
    page_range: Option<Range>,
}

impl From<Point> for StoredPoint {
    fn from(p: Point) -> Self {
        StoredPoint {
            id: p.id,
            embedding: p.embedding,
            file_path: p.payload.file_path,
            file_mtime: p.payload.file_mtime,
            chunk_index: p.payload.chunk_index as i64,
            chunks_total: p.payload.chunks_total as i64,
            chunk_text: p.payload.chunk_text,
            version: p.payload.version,
            line_range: p.payload.line_range,
            page_range: p.payload.page_range,
        }
    }
}

impl From<StoredPoint> for Point {
    fn from(s: StoredPoint) -> Self {
        Point {
            id: s.id,
            embedding: s.embedding,
            payload: PointPayload {
                file_path: s.file_path,
                file_mtime: s.file_mtime,
                chunk_index: s.chunk_index.max(0) as usize,
                chunks_total: s.chunks_total.max(0) as usize,
                chunk_text: s.chunk_text,
                version: s.version,
                line_range: s.line_range,
                page_range: s.page_range,
            },
        }
    }
}

pub struct SurrealVectorStore {
    db: Arc<SurrealDbClient>,
    dimension: usize,
}

impl SurrealVectorStore {
    pub async fn new(db: Arc<SurrealDbClient>, dimension: usize) -> Result<Self, AppError> {
        db.define_hnsw_index(INDEX, TABLE, "embedding", dimension)
            .await
            .map_err(|e| AppError::Store(format!("failed to define {INDEX}: {e}")))?;
        Ok(Self { db, dimension })
    }

    pub async fn rebuild_index(&self) -> Result<(), AppError> {
        self.db
            .rebuild_index(INDEX, TABLE)
            .await
            .map_err(|e| AppError::Store(format!("failed to rebuild {INDEX}: {e}")))
    }
}

#[async_trait]
impl VectorStore for SurrealVectorStore {
    async fn upsert(&self, points: Vec<Point>) -> Result<(), AppError> {
        for point in points {
            let mut payload = point.payload.clone();
            payload.validate()?;
            if point.embedding.len() != self.dimension {
                return Err(AppError::Store(format!(
                    "embedding dimension {} does not match store dimension {}",
                    point.embedding.len(),
                    self.dimension
                )));
            }
            let mut point = point;
            point.payload = payload;
            let stored: StoredPoint = point.into();
            self.db
                .client
                .upsert::<Option<StoredPoint>>((TABLE, stored.id.clone()))
                .content(stored)
                .await
                .map_err(|e| AppError::Store(format!("upsert failed: {e}")))?;
        }
        Ok(())
    }

    async fn delete_by(&self, file_path: &str) -> Result<u64, AppError> {
        #[derive(Deserialize)]
        struct IdRow {
            id: surrealdb::sql::Thing,
        }

        let sql = format!("DELETE {TABLE} WHERE file_path = $file_path RETURN BEFORE");
        let mut response = self
            .db
            .client
            .query(&sql)
            .bind(("file_path", file_path.to_string()))
            .await
            .map_err(|e| AppError::Store(format!("delete_by failed: {e}")))?;

        let deleted: Vec<IdRow> = response.take(0).unwrap_or_default();
        Ok(deleted.len() as u64)
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<u64, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: u64,
        }

        let mut response = match filter {
            None => {
                let sql = format!("SELECT count() AS count FROM {TABLE} GROUP ALL");
                self.db.client.query(sql).await
            }
            Some(Filter::FilePathEquals(path)) => {
                let sql = format!("SELECT count() AS count FROM {TABLE} WHERE file_path = $file_path GROUP ALL");
                self.db.client.query(sql).bind(("file_path", path.clone())).await
            }
            Some(Filter::FilePathAnyOf(paths)) => {
                let sql = format!("SELECT count() AS count FROM {TABLE} WHERE file_path IN $file_paths GROUP ALL");
                self.db.client.query(sql).bind(("file_paths", paths.clone())).await
            }
        }
        .map_err(|e| AppError::Store(format!("count failed: {e}")))?;

        let rows: Vec<CountRow> = response.take(0).unwrap_or_default();
        Ok(rows.first().map(|r| r.count).unwrap_or(0))
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            #[serde(flatten)]
            point: StoredPoint,
            score: f32,
        }

        let sql = format!(
            r#"
            SELECT *, vector::similarity::cosine(embedding, $embedding) AS score
            FROM {TABLE}
            WHERE embedding <|{limit},100|> $embedding
            ORDER BY score DESC
            LIMIT {limit};
            "#,
        );

        let mut response = self
            .db
            .client
            .query(&sql)
            .bind(("embedding", query_embedding.to_vec()))
            .await
            .map_err(|e| AppError::Store(format!("search failed: {e}")))?;

        let rows: Vec<Row> = response.take(0).unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|r| ScoredPoint {
                point: r.point.into(),
                score: r.score,
            })
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<Option<Point>, AppError> {
        let stored: Option<StoredPoint> = self
            .db
            .client
            .select((TABLE, id))
            .await
            .map_err(|e| AppError::Store(format!("fetch failed: {e}")))?;
        Ok(stored.map(Into::into))
    }

    async fn fetch_by_file_chunk(
        &self,
        file_path: &str,
        chunk_index: usize,
    ) -> Result<Option<Point>, AppError> {
        let sql = format!(
            "SELECT * FROM {TABLE} WHERE file_path = $file_path AND chunk_index = $chunk_index LIMIT 1;"
        );
        let mut response = self
            .db
            .client
            .query(&sql)
            .bind(("file_path", file_path.to_string()))
            .bind(("chunk_index", chunk_index as i64))
            .await
            .map_err(|e| AppError::Store(format!("fetch_by_file_chunk failed: {e}")))?;
        let rows: Vec<StoredPoint> = response.take(0).unwrap_or_default();
        Ok(rows.into_iter().next().map(Into::into))
    }

    async fn fetch_where(&self, filter: &Filter, limit: usize) -> Result<Vec<Point>, AppError> {
        let mut response = match filter {
            Filter::FilePathEquals(path) => {
                let sql = format!("SELECT * FROM {TABLE} WHERE file_path = $file_path LIMIT {limit}");
                self.db.client.query(sql).bind(("file_path", path.clone())).await
            }
            Filter::FilePathAnyOf(paths) => {
                let sql = format!("SELECT * FROM {TABLE} WHERE file_path IN $file_paths LIMIT {limit}");
                self.db.client.query(sql).bind(("file_paths", paths.clone())).await
            }
        }
        .map_err(|e| AppError::Store(format!("fetch_where failed: {e}")))?;

        let rows: Vec<StoredPoint> = response.take(0).unwrap_or_default();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn collection_exists(&self) -> Result<bool, AppError> {
        #[derive(Deserialize, Default)]
        struct TableInfo {
            #[serde(default)]
            indexes: std::collections::BTreeMap<String, String>,
        }

        let sql = format!("INFO FOR TABLE {TABLE}");
        let mut response = self
            .db
            .client
            .query(sql)
            .await
            .map_err(|e| AppError::Store(format!("collection_exists failed: {e}")))?;
        let info: Option<TableInfo> = response.take(0).unwrap_or_default();
        Ok(info.map(|i| i.indexes.contains_key(INDEX)).unwrap_or(false))
    }

    async fn create(&self) -> Result<(), AppError> {
        let sql = format!("DEFINE TABLE IF NOT EXISTS {TABLE} SCHEMALESS");
        self.db
            .client
            .query(sql)
            .await
            .map_err(|e| AppError::Store(format!("create failed: {e}")))?;
        self.db
            .define_hnsw_index(INDEX, TABLE, "embedding", self.dimension)
            .await
            .map_err(|e| AppError::Store(format!("failed to define {INDEX}: {e}")))
    }
}

/// Generates a fresh point id. Grounded in `archive_agent` uuid-keyed point
/// ids (Qdrant points are keyed by UUID, not the provenance hash — the hash
/// lives in the chunk text as the reference token).
pub fn new_point_id() -> String {
    Uuid::new_v4().to_string()
}
