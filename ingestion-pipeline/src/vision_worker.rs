//! Bounded vision-description worker pool. Grounded the same way as
//! [`crate::embedder::Embedder`] on `RerankerPool`'s semaphore-bounded,
//! per-task-provider-view pattern; image preparation is
//! `decoders::raster_image::prepare_for_vision`.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use common::retry::RetryPolicy;
use provider::ModelProvider;

/// One image awaiting a vision description, already resized/encoded by
/// `decoders::raster_image::prepare_for_vision` (or, for PDF strict-path
/// pages, already rasterized to JPEG).
pub struct VisionRequest {
    pub base64: String,
    pub mime: &'static str,
}

pub struct VisionWorker {
    provider: Arc<dyn ModelProvider>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl VisionWorker {
    pub fn new(provider: Arc<dyn ModelProvider>, pool_size: usize) -> Self {
        Self::with_retry(provider, pool_size, RetryPolicy::default())
    }

    pub fn with_retry(provider: Arc<dyn ModelProvider>, pool_size: usize, retry: RetryPolicy) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            retry,
        }
    }

    /// Describes every request, returning results in the original request
    /// order regardless of completion order. A request whose provider call
    /// fails (including a content-filter rejection) becomes `None` at its
    /// index; the caller emits `[Unprocessable Image]` for it.
    pub async fn describe_all(&self, requests: Vec<VisionRequest>) -> Vec<Option<String>> {
        let mut tasks = Vec::with_capacity(requests.len());

        for (index, request) in requests.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let retry = self.retry;
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = retry.run(|| provider.vision(&request.base64, request.mime)).await;
                (index, result)
            }));
        }

        let mut results: Vec<Option<String>> = vec![None; tasks.len()];
        for task in tasks {
            match task.await {
                Ok((index, Ok(Some(vision)))) if vision.is_rejected => {
                    warn!(image_index = index, reason = ?vision.rejection_reason, "vision call rejected by content filter");
                }
                Ok((index, Ok(Some(vision)))) => {
                    let single_line = vision.answer.replace(['\n', '\r'], " ");
                    results[index] = Some(single_line);
                }
                Ok((index, Ok(None))) => {
                    warn!(image_index = index, "vision description dropped after retry policy gave up");
                }
                Ok((index, Err(err))) => {
                    warn!(image_index = index, error = %err, "vision description failed");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "vision worker task panicked");
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::error::AppError;
    use provider::{ChunkDecision, QueryResult, RerankResult, VisionResult};

    struct StubProvider;

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn embed(&self, _: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            unimplemented!()
        }
        async fn chunk(&self, _: &str) -> Result<ChunkDecision, AppError> {
            unimplemented!()
        }
        async fn rerank(&self, _: &str, _: &[String]) -> Result<RerankResult, AppError> {
            unimplemented!()
        }
        async fn query(&self, _: &str, _: &str) -> Result<QueryResult, AppError> {
            unimplemented!()
        }
        async fn vision(&self, image_base64: &str, _mime: &str) -> Result<VisionResult, AppError> {
            Ok(VisionResult {
                entities: vec![],
                relations: vec![],
                answer: format!("description for {}\nsecond line", image_base64),
                is_rejected: false,
                rejection_reason: None,
            })
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl ModelProvider for RejectingProvider {
        async fn embed(&self, _: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            unimplemented!()
        }
        async fn chunk(&self, _: &str) -> Result<ChunkDecision, AppError> {
            unimplemented!()
        }
        async fn rerank(&self, _: &str, _: &[String]) -> Result<RerankResult, AppError> {
            unimplemented!()
        }
        async fn query(&self, _: &str, _: &str) -> Result<QueryResult, AppError> {
            unimplemented!()
        }
        async fn vision(&self, _: &str, _: &str) -> Result<VisionResult, AppError> {
            Ok(VisionResult {
                entities: vec![],
                relations: vec![],
                answer: String::new(),
                is_rejected: true,
                rejection_reason: Some("content filter".into()),
            })
        }
    }

    #[tokio::test]
    async fn describes_requests_in_original_order() {
        let worker = VisionWorker::new(Arc::new(StubProvider), 4);
        let requests = vec![
            VisionRequest { base64: "a".into(), mime: "image/jpeg" },
            VisionRequest { base64: "b".into(), mime: "image/jpeg" },
        ];
        let results = worker.describe_all(requests).await;
        assert_eq!(results[0].as_deref(), Some("description for a second line"));
        assert_eq!(results[1].as_deref(), Some("description for b second line"));
    }

    #[tokio::test]
    async fn rejected_image_becomes_none() {
        let worker = VisionWorker::new(Arc::new(RejectingProvider), 2);
        let requests = vec![VisionRequest { base64: "a".into(), mime: "image/jpeg" }];
        let results = worker.describe_all(requests).await;
        assert_eq!(results, vec![None]);
    }
}
