//! Local, non-OpenAI-shaped HTTP provider (Ollama-style). Grounded in the
//! teacher's direct `reqwest` dependency, used here instead of
//! `async-openai` since this variant's wire format isn't OpenAI-compatible.

use async_trait::async_trait;
use common::error::AppError;
use serde::Deserialize;
use serde_json::json;

use crate::{ChunkDecision, ModelProvider, ProviderParams, QueryResult, RerankResult, VisionResult};

pub struct LocalHttpProvider {
    client: reqwest::Client,
    base_url: String,
    params: ProviderParams,
}

impl LocalHttpProvider {
    pub fn new(base_url: impl Into<String>, params: ProviderParams) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            params,
        }
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(url).json(&body).send().await?;
        let response = response.error_for_status()?;
        response.json::<T>().await.map_err(AppError::Reqwest)
    }
}

#[async_trait]
impl ModelProvider for LocalHttpProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        #[derive(Deserialize)]
        struct Response {
            embeddings: Vec<Vec<f32>>,
        }
        let body = json!({"model": self.params.model_embed, "input": texts});
        let response: Response = self.post_json("/api/embed", body).await?;
        Ok(response.embeddings)
    }

    async fn chunk(&self, block_text: &str) -> Result<ChunkDecision, AppError> {
        let body = json!({
            "model": self.params.model_chunk,
            "block": block_text,
        });
        self.post_json("/api/chunk", body).await
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<RerankResult, AppError> {
        let body = json!({
            "model": self.params.model_rerank,
            "query": query,
            "documents": documents,
        });
        self.post_json("/api/rerank", body).await
    }

    async fn query(&self, prompt: &str, context: &str) -> Result<QueryResult, AppError> {
        let body = json!({
            "model": self.params.model_query,
            "temperature": self.params.temperature_query,
            "prompt": prompt,
            "context": context,
        });
        self.post_json("/api/generate", body).await
    }

    async fn vision(&self, image_base64: &str, mime: &str) -> Result<VisionResult, AppError> {
        if self.params.model_vision.is_empty() {
            return Ok(VisionResult {
                entities: Vec::new(),
                relations: Vec::new(),
                answer: String::new(),
                is_rejected: true,
                rejection_reason: Some("vision model not configured".into()),
            });
        }
        let body = json!({
            "model": self.params.model_vision,
            "image_base64": image_base64,
            "mime": mime,
        });
        self.post_json("/api/vision", body).await
    }
}
