//! `CachingProvider`: wraps any [`ModelProvider`] with `common::cache::ResponseCache`
//! read-through/write-through, per spec §4.3 ("each call wrapped by the
//! cache except `query`"). A decorator, not a trait default method, so the
//! concrete providers stay free of caching concerns — the same "decorator,
//! not global" shape as `common::tagged_span`.
//!
//! The per-call cache key is `sha256("<op>:<sorted-json(kwargs)>:<static
//! params key>")`, grounded in `archive_agent/ai_provider/AiProviderParams.py`'s
//! static key combined with `CacheManager`'s per-call keying.

use std::sync::Arc;

use async_trait::async_trait;
use common::{cache::ResponseCache, error::AppError};
use serde::Serialize;

use crate::{ChunkDecision, ModelProvider, ProviderParams, QueryResult, RerankResult, VisionResult};

pub struct CachingProvider {
    inner: Box<dyn ModelProvider>,
    cache: Arc<ResponseCache>,
    params: ProviderParams,
    /// When set, every call bypasses the cache on read (still writes
    /// through), mirroring spec §4.2's `invalidate_cache` bypass.
    invalidate: bool,
}

impl CachingProvider {
    pub fn new(inner: Box<dyn ModelProvider>, cache: Arc<ResponseCache>, params: ProviderParams, invalidate: bool) -> Self {
        Self {
            inner,
            cache,
            params,
            invalidate,
        }
    }

    fn key<T: Serialize>(&self, op: &str, kwargs: &T) -> Result<String, AppError> {
        #[derive(Serialize)]
        struct Payload<'a, T> {
            op: &'a str,
            kwargs: &'a T,
            params: &'a str,
        }
        let static_key = self.params.static_cache_key();
        ResponseCache::key_for(&Payload {
            op,
            kwargs,
            params: &static_key,
        })
    }

    async fn cached<T, F>(&self, op: &str, kwargs: &impl Serialize, fetch: F) -> Result<T, AppError>
    where
        T: Serialize + serde::de::DeserializeOwned,
        F: std::future::Future<Output = Result<T, AppError>>,
    {
        let key = self.key(op, kwargs)?;
        if !self.invalidate {
            if let Some(cached) = self.cache.get::<T>(&key)? {
                return Ok(cached);
            }
        }
        let result = fetch.await?;
        self.cache.put(&key, &result)?;
        Ok(result)
    }
}

#[async_trait]
impl ModelProvider for CachingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.cached("embed", &texts, self.inner.embed(texts)).await
    }

    async fn chunk(&self, block_text: &str) -> Result<ChunkDecision, AppError> {
        self.cached("chunk", &block_text, self.inner.chunk(block_text)).await
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<RerankResult, AppError> {
        self.cached("rerank", &(query, documents), self.inner.rerank(query, documents))
            .await
    }

    /// Not cached: spec §4.3 excludes `query` from caching so answers are
    /// always freshly synthesised.
    async fn query(&self, prompt: &str, context: &str) -> Result<QueryResult, AppError> {
        self.inner.query(prompt, context).await
    }

    async fn vision(&self, image_base64: &str, mime: &str) -> Result<VisionResult, AppError> {
        self.cached("vision", &(image_base64, mime), self.inner.vision(image_base64, mime))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AnswerItem, ChunkBoundary};

    struct CountingProvider {
        embed_calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl ModelProvider for CountingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            self.embed_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
        }
        async fn chunk(&self, _: &str) -> Result<ChunkDecision, AppError> {
            Ok(ChunkDecision {
                boundaries: vec![ChunkBoundary { next_chunk_start: 1 }],
            })
        }
        async fn rerank(&self, _: &str, _: &[String]) -> Result<RerankResult, AppError> {
            Ok(RerankResult {
                reranked_indices: vec![],
                is_rejected: false,
                rejection_reason: None,
            })
        }
        async fn query(&self, _: &str, _: &str) -> Result<QueryResult, AppError> {
            Ok(QueryResult {
                question_rephrased: "q".into(),
                answer_list: vec![AnswerItem {
                    answer: "answer".into(),
                    chunk_ref_list: vec![],
                }],
                answer_conclusion: String::new(),
                follow_up_questions_list: vec![],
                is_rejected: false,
                rejection_reason: None,
            })
        }
        async fn vision(&self, _: &str, _: &str) -> Result<VisionResult, AppError> {
            Ok(VisionResult {
                entities: vec![],
                relations: vec![],
                answer: "description".into(),
                is_rejected: false,
                rejection_reason: None,
            })
        }
    }

    fn params() -> ProviderParams {
        ProviderParams {
            model_chunk: "c".into(),
            model_embed: "e".into(),
            model_rerank: "r".into(),
            model_query: "q".into(),
            model_vision: "v".into(),
            temperature_query: 0.0,
        }
    }

    fn open_cache() -> Arc<ResponseCache> {
        let dir = tempfile::tempdir().expect("tempdir");
        Arc::new(ResponseCache::open(dir.into_path()).expect("open cache"))
    }

    #[tokio::test]
    async fn repeated_embed_call_hits_cache_on_second_call() {
        let embed_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let inner = Box::new(CountingProvider {
            embed_calls: Arc::clone(&embed_calls),
        });
        let provider = CachingProvider::new(inner, open_cache(), params(), false);

        let texts = vec!["hello".to_string()];
        provider.embed(&texts).await.unwrap();
        provider.embed(&texts).await.unwrap();

        assert_eq!(embed_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_flag_bypasses_the_cache_on_read() {
        let embed_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let inner = Box::new(CountingProvider {
            embed_calls: Arc::clone(&embed_calls),
        });
        let provider = CachingProvider::new(inner, open_cache(), params(), true);

        let texts = vec!["hello".to_string()];
        provider.embed(&texts).await.unwrap();
        provider.embed(&texts).await.unwrap();

        assert_eq!(embed_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn query_is_never_cached() {
        let inner = Box::new(CountingProvider {
            embed_calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        });
        let provider = CachingProvider::new(inner, open_cache(), params(), false);
        assert_eq!(provider.query("q", "ctx").await.unwrap().answer_list[0].answer, "answer");
        assert_eq!(provider.query("q", "ctx").await.unwrap().answer_list[0].answer, "answer");
    }
}
