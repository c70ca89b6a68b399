//! Grounded in `archive_agent/ai_provider/AiProviderParams.py`.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Identifies which concrete models back each capability. Two `ProviderParams`
/// with the same [`ProviderParams::static_cache_key`] are interchangeable for
/// caching purposes — query-time fields (`model_query`, `temperature_query`)
/// are deliberately excluded since query responses are never cached.
#[derive(Debug, Clone)]
pub struct ProviderParams {
    pub model_chunk: String,
    pub model_embed: String,
    pub model_rerank: String,
    pub model_query: String,
    pub model_vision: String,
    pub temperature_query: f32,
}

/// The subset of fields that feed the static cache key. Field order in the
/// struct is irrelevant: `serde_json` serializes struct fields in
/// declaration order, and we sort keys explicitly below so the digest is
/// stable regardless of how this type evolves.
#[derive(Serialize)]
struct StaticCacheFields<'a> {
    model_chunk: &'a str,
    model_embed: &'a str,
    model_rerank: &'a str,
    model_vision: &'a str,
}

impl ProviderParams {
    /// SHA-256 hex digest over the sorted-JSON encoding of the
    /// cache-relevant fields. Used to key the on-disk response cache so a
    /// model swap invalidates previously cached chunk/embed/rerank/vision
    /// responses without touching query-time caching (queries are never
    /// cached at all).
    pub fn static_cache_key(&self) -> String {
        let fields = StaticCacheFields {
            model_chunk: &self.model_chunk,
            model_embed: &self.model_embed,
            model_rerank: &self.model_rerank,
            model_vision: &self.model_vision,
        };
        let value = serde_json::to_value(&fields).unwrap_or(serde_json::Value::Null);
        let sorted = sort_json(&value);
        let canonical = sorted.to_string();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Recursively sorts object keys so the JSON string representation is
/// canonical regardless of field declaration order.
fn sort_json(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.clone(), sort_json(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_json).collect())
        }
        other => other.clone(),
    }
}
