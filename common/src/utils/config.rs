use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// OCR strategy for page decoding, per-page resolved when set to `Auto`.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OcrStrategy {
    Strict,
    Relaxed,
    Auto,
}

fn default_ocr_strategy() -> OcrStrategy {
    OcrStrategy::Auto
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,

    // Provider model identity (feeds provider::ProviderParams).
    pub model_chunk: String,
    pub model_embed: String,
    pub model_rerank: String,
    pub model_query: String,
    #[serde(default)]
    pub model_vision: String,
    #[serde(default = "default_temperature_query")]
    pub temperature_query: f32,

    // Chunking.
    #[serde(default = "default_chunk_lines_block")]
    pub chunk_lines_block: usize,

    // Retrieval.
    #[serde(default = "default_retrieve_score_min")]
    pub retrieve_score_min: f32,
    #[serde(default = "default_retrieve_chunks_max")]
    pub retrieve_chunks_max: usize,
    #[serde(default = "default_true")]
    pub retrieve_knee_enable: bool,
    #[serde(default = "default_knee_sensitivity")]
    pub retrieve_knee_sensitivity: f64,
    #[serde(default = "default_knee_min_chunks")]
    pub retrieve_knee_min_chunks: usize,

    // Reranking.
    #[serde(default = "default_rerank_chunks_max")]
    pub rerank_chunks_max: usize,

    // Expansion.
    #[serde(default = "default_expand_radius")]
    pub expand_chunks_radius: usize,

    // Decoding / OCR.
    #[serde(default = "default_ocr_strategy")]
    pub ocr_strategy: OcrStrategy,
    #[serde(default = "default_ocr_auto_threshold")]
    pub ocr_auto_threshold: usize,

    // Caching.
    #[serde(default)]
    pub invalidate_cache: bool,

    // Concurrency.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    // Retry policy.
    #[serde(default = "default_retry_predelay")]
    pub retry_predelay: f64,
    #[serde(default = "default_retry_delay_min")]
    pub retry_delay_min: f64,
    #[serde(default = "default_retry_delay_max")]
    pub retry_delay_max: f64,
    #[serde(default = "default_retry_backoff_exponent")]
    pub retry_backoff_exponent: f64,
    #[serde(default = "default_retry_retries")]
    pub retry_retries: u32,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature_query() -> f32 {
    0.2
}

fn default_chunk_lines_block() -> usize {
    24
}

fn default_retrieve_score_min() -> f32 {
    0.0
}

fn default_retrieve_chunks_max() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_knee_sensitivity() -> f64 {
    1.0
}

fn default_knee_min_chunks() -> usize {
    1
}

fn default_rerank_chunks_max() -> usize {
    16
}

fn default_expand_radius() -> usize {
    1
}

fn default_ocr_auto_threshold() -> usize {
    500
}

fn default_max_workers() -> usize {
    4
}

fn default_retry_predelay() -> f64 {
    0.0
}

fn default_retry_delay_min() -> f64 {
    1.0
}

fn default_retry_delay_max() -> f64 {
    30.0
}

fn default_retry_backoff_exponent() -> f64 {
    2.0
}

fn default_retry_retries() -> u32 {
    5
}

impl AppConfig {
    pub fn vision_enabled(&self) -> bool {
        !self.model_vision.is_empty()
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
