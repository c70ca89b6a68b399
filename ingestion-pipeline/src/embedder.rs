//! Bounded embedding worker pool. Grounded in
//! `retrieval-pipeline/src/reranking/mod.rs`'s `RerankerPool`: a semaphore
//! bounds in-flight work while each task gets its own provider view rather
//! than sharing one mutable engine across threads.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use common::{error::AppError, retry::RetryPolicy};
use provider::ModelProvider;

pub struct Embedder {
    provider: Arc<dyn ModelProvider>,
    semaphore: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Embedder {
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

    /// Embeds every chunk text, preserving input order in the result. A
    /// chunk whose embedding call hits `MaxTokensExceeded` or fails all
    /// retries yields `None` at its index rather than failing the batch —
    /// the caller drops it from the upsert with a warning.
    pub async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let mut tasks = Vec::with_capacity(texts.len());

        for (index, text) in texts.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let retry = self.retry;
            let text = text.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = retry.run(|| provider.embed(std::slice::from_ref(&text))).await;
                (index, result)
            }));
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for task in tasks {
            match task.await {
                Ok((index, Ok(Some(mut vectors)))) => {
                    results[index] = vectors.pop();
                }
                Ok((index, Ok(None))) => {
                    warn!(chunk_index = index, "embedding dropped after retry policy gave up");
                }
                Ok((index, Err(err))) => {
                    warn!(chunk_index = index, error = %err, "embedding failed, dropping chunk");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "embedding worker task panicked");
                }
            }
        }

        results
    }
}
