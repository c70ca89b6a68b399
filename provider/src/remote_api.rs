//! OpenAI-compatible provider. Used both for the hosted OpenAI API
//! (`RemoteApiProvider`) and for a local OpenAI-compatible server such as
//! LM Studio or vLLM (`LocalOpenAiCompatibleProvider`) — the two are the
//! same implementation with a different `api_base`, mirroring
//! `common/src/utils/config.rs::openai_base_url` in the teacher.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        ChatCompletionRequestUserMessageContentPartImage, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs, ImageUrl, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use serde_json::json;

use crate::{AnswerItem, ChunkDecision, ModelProvider, ProviderParams, QueryResult, RerankResult, VisionResult};

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    params: ProviderParams,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, api_base: &str, params: ProviderParams) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: Client::with_config(config),
            params,
        }
    }

    fn chunk_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "boundaries": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "next_chunk_start": {"type": "integer"}
                        },
                        "required": ["next_chunk_start"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["boundaries"],
            "additionalProperties": false
        })
    }

    fn rerank_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "reranked_indices": {
                    "type": "array",
                    "items": {"type": "integer"}
                },
                "is_rejected": {"type": "boolean"},
                "rejection_reason": {"type": ["string", "null"]}
            },
            "required": ["reranked_indices", "is_rejected", "rejection_reason"],
            "additionalProperties": false
        })
    }

    fn query_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "question_rephrased": {"type": "string"},
                "answer_list": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "answer": {"type": "string"},
                            "chunk_ref_list": {
                                "type": "array",
                                "items": {"type": "string"}
                            }
                        },
                        "required": ["answer", "chunk_ref_list"],
                        "additionalProperties": false
                    }
                },
                "answer_conclusion": {"type": "string"},
                "follow_up_questions_list": {
                    "type": "array",
                    "items": {"type": "string"}
                },
                "is_rejected": {"type": "boolean"},
                "rejection_reason": {"type": ["string", "null"]}
            },
            "required": [
                "question_rephrased",
                "answer_list",
                "answer_conclusion",
                "follow_up_questions_list",
                "is_rejected",
                "rejection_reason"
            ],
            "additionalProperties": false
        })
    }

    fn vision_schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "entities": {
                    "type": "array",
                    "items": {"type": "string"}
                },
                "relations": {
                    "type": "array",
                    "items": {"type": "string"}
                },
                "answer": {"type": "string"},
                "is_rejected": {"type": "boolean"},
                "rejection_reason": {"type": ["string", "null"]}
            },
            "required": ["entities", "relations", "answer", "is_rejected", "rejection_reason"],
            "additionalProperties": false
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.params.model_embed)
            .input(texts.to_vec())
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.embeddings().create(request).await?;
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn chunk(&self, block_text: &str) -> Result<ChunkDecision, AppError> {
        let system = "Return JSON naming the 1-based sentence index, within the numbered block below, at which each semantic chunk boundary starts. Any lines carried over from a previous block are already numbered in at the start of this same block.";
        let user = format!("Block:\n{block_text}");

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Chunk boundary decision".into()),
                name: "chunk_decision".into(),
                schema: Some(Self::chunk_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.params.model_chunk)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::Truncation("no content in chunk response".into()))?;

        let boundaries: ChunkDecision = serde_json::from_str(content).map_err(|e| {
            tracing::warn!(error = %e, "chunk response failed schema validation");
            AppError::SchemaInvalid(format!("chunk response: {e}"))
        })?;

        Ok(boundaries)
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<RerankResult, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Relevance-reordered document indices".into()),
                name: "rerank_result".into(),
                schema: Some(Self::rerank_schema()),
                strict: Some(true),
            },
        };

        let user = format!(
            "Query:\n{query}\n\nReorder these document indices from most to least relevant (same count, a permutation of the input indices):\n{}",
            documents
                .iter()
                .enumerate()
                .map(|(i, d)| format!("[{i}] {d}"))
                .collect::<Vec<_>>()
                .join("\n")
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.params.model_rerank)
            .messages([ChatCompletionRequestUserMessage::from(user).into()])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::Truncation("no content in rerank response".into()))?;

        let result: RerankResult = serde_json::from_str(content).map_err(|e| {
            tracing::warn!(error = %e, "rerank response failed schema validation");
            AppError::SchemaInvalid(format!("rerank response: {e}"))
        })?;

        Ok(result)
    }

    async fn query(&self, prompt: &str, context: &str) -> Result<QueryResult, AppError> {
        let system = "Answer using only the provided context. Each context block is prefixed with a <<< hash >>> provenance token; cite every chunk an answer draws on by including its token verbatim in that answer's chunk_ref_list. If the context cannot answer the question, set is_rejected and leave the other fields blank.";
        let user = format!("{prompt}\n\nContext:\n{context}");

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Synthesised answer with citations".into()),
                name: "query_result".into(),
                schema: Some(Self::query_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.params.model_query)
            .temperature(self.params.temperature_query)
            .messages([
                ChatCompletionRequestSystemMessage::from(system).into(),
                ChatCompletionRequestUserMessage::from(user).into(),
            ])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::Truncation("no content in query response".into()))?;

        let result: QueryResult = serde_json::from_str(content).map_err(|e| {
            tracing::warn!(error = %e, "query response failed schema validation");
            AppError::SchemaInvalid(format!("query response: {e}"))
        })?;

        Ok(result)
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

        let data_url = format!("data:{mime};base64,{image_base64}");
        let content = ChatCompletionRequestUserMessageContent::Array(vec![
            ChatCompletionRequestUserMessageContentPart::Image(
                ChatCompletionRequestUserMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_url,
                        detail: None,
                    },
                },
            ),
        ]);

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Structured image description".into()),
                name: "vision_result".into(),
                schema: Some(Self::vision_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.params.model_vision)
            .messages([ChatCompletionRequestUserMessage {
                content,
                name: None,
            }
            .into()])
            .response_format(response_format)
            .build()
            .map_err(AppError::OpenAI)?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .ok_or_else(|| AppError::Truncation("no content in vision response".into()))?;

        let result: VisionResult = serde_json::from_str(content).map_err(|e| {
            tracing::warn!(error = %e, "vision response failed schema validation");
            AppError::SchemaInvalid(format!("vision response: {e}"))
        })?;

        Ok(result)
    }
}
