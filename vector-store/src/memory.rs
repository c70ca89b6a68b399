//! In-process `VectorStore` for tests. Grounded in
//! `common::storage::db::SurrealDbClient::memory` — a dependency-free
//! stand-in so ingestion/retrieval pipeline tests don't need a live
//! SurrealDB instance, brute-forcing the cosine scan the HNSW index would
//! otherwise accelerate.

use std::sync::Mutex;

use async_trait::async_trait;

use common::error::AppError;

use crate::schema::{Filter, Point, ScoredPoint};
use crate::store::VectorStore;

fn matches_filter(point: &Point, filter: &Filter) -> bool {
    match filter {
        Filter::FilePathEquals(path) => point.payload.file_path == *path,
        Filter::FilePathAnyOf(paths) => paths.iter().any(|p| p == &point.payload.file_path),
    }
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    points: Mutex<Vec<Point>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, points: Vec<Point>) -> Result<(), AppError> {
        let mut guard = self.points.lock().expect("vector store mutex poisoned");
        for mut point in points {
            point.payload.validate()?;
            if let Some(existing) = guard.iter_mut().find(|p| p.id == point.id) {
                *existing = point;
            } else {
                guard.push(point);
            }
        }
        Ok(())
    }

    async fn delete_by(&self, file_path: &str) -> Result<u64, AppError> {
        let mut guard = self.points.lock().expect("vector store mutex poisoned");
        let before = guard.len();
        guard.retain(|p| p.payload.file_path != file_path);
        Ok((before - guard.len()) as u64)
    }

    async fn count(&self, filter: Option<&Filter>) -> Result<u64, AppError> {
        let guard = self.points.lock().expect("vector store mutex poisoned");
        match filter {
            None => Ok(guard.len() as u64),
            Some(filter) => Ok(guard.iter().filter(|p| matches_filter(p, filter)).count() as u64),
        }
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, AppError> {
        let guard = self.points.lock().expect("vector store mutex poisoned");
        let mut scored: Vec<ScoredPoint> = guard
            .iter()
            .map(|point| ScoredPoint {
                point: point.clone(),
                score: cosine_similarity(query_embedding, &point.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn fetch(&self, id: &str) -> Result<Option<Point>, AppError> {
        let guard = self.points.lock().expect("vector store mutex poisoned");
        Ok(guard.iter().find(|p| p.id == id).cloned())
    }

    async fn fetch_by_file_chunk(
        &self,
        file_path: &str,
        chunk_index: usize,
    ) -> Result<Option<Point>, AppError> {
        let guard = self.points.lock().expect("vector store mutex poisoned");
        Ok(guard
            .iter()
            .find(|p| p.payload.file_path == file_path && p.payload.chunk_index == chunk_index)
            .cloned())
    }

    async fn fetch_where(&self, filter: &Filter, limit: usize) -> Result<Vec<Point>, AppError> {
        let guard = self.points.lock().expect("vector store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|p| matches_filter(p, filter))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn collection_exists(&self) -> Result<bool, AppError> {
        Ok(true)
    }

    async fn create(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PointPayload, Range};

    fn point(id: &str, file_path: &str, embedding: Vec<f32>) -> Point {
        Point {
            id: id.into(),
            embedding,
            payload: PointPayload {
                file_path: file_path.into(),
                file_mtime: 0,
                chunk_index: 0,
                chunks_total: 1,
                chunk_text: "body".into(),
                version: None,
                line_range: Some(Range { start: 1, end: 2 }),
                page_range: None,
            },
        }
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                point("a", "x.md", vec![1.0, 0.0]),
                point("b", "x.md", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results[0].point.id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn delete_by_removes_only_matching_file() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                point("a", "x.md", vec![1.0, 0.0]),
                point("b", "y.md", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = store.delete_by("x.md").await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert!(store.fetch("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_rejects_payload_with_both_ranges() {
        let store = InMemoryVectorStore::new();
        let mut bad = point("a", "x.md", vec![1.0]);
        bad.payload.page_range = Some(Range { start: 1, end: 2 });
        assert!(store.upsert(vec![bad]).await.is_err());
    }

    #[tokio::test]
    async fn fetch_by_file_chunk_finds_neighbor_by_position() {
        let store = InMemoryVectorStore::new();
        let mut second = point("b", "x.md", vec![0.0, 1.0]);
        second.payload.chunk_index = 1;
        store
            .upsert(vec![point("a", "x.md", vec![1.0, 0.0]), second])
            .await
            .unwrap();

        let found = store.fetch_by_file_chunk("x.md", 1).await.unwrap();
        assert_eq!(found.map(|p| p.id), Some("b".to_string()));
        assert!(store.fetch_by_file_chunk("x.md", 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_and_fetch_where_narrow_by_file_path() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                point("a", "x.md", vec![1.0, 0.0]),
                point("b", "y.md", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.count(Some(&Filter::FilePathEquals("x.md".into()))).await.unwrap(),
            1
        );
        let matches = store
            .fetch_where(&Filter::FilePathAnyOf(vec!["x.md".into(), "y.md".into()]), 10)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_id() {
        let store = InMemoryVectorStore::new();
        store.upsert(vec![point("a", "x.md", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(vec![point("a", "x.md", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);
        let fetched = store.fetch("a").await.unwrap().unwrap();
        assert_eq!(fetched.embedding, vec![0.0, 1.0]);
    }
}
