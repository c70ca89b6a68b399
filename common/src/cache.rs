//! Content-addressed, disk-persistent response cache.
//!
//! Grounded in `archive_agent/core/CacheManager.py`: a `diskcache.Cache`
//! keyed by a SHA-256 hex digest of the request payload, with a
//! "pop the most recently touched entry" escape hatch used to defensively
//! discard a cache entry immediately after its response was rejected, so a
//! retry re-samples instead of replaying the same rejected answer.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

pub struct ResponseCache {
    db: sled::Db,
    last_touched: std::sync::Mutex<Option<String>>,
}

impl ResponseCache {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let db = sled::open(dir).map_err(|e| AppError::InternalError(e.to_string()))?;
        Ok(Self {
            db,
            last_touched: std::sync::Mutex::new(None),
        })
    }

    /// Derives the content-addressed key for an arbitrary serializable
    /// request payload.
    pub fn key_for<T: Serialize>(payload: &T) -> Result<String, AppError> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| AppError::SchemaInvalid(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.db.contains_key(key).unwrap_or(false)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let Some(bytes) = self
            .db
            .get(key)
            .map_err(|e| AppError::InternalError(e.to_string()))?
        else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::SchemaInvalid(e.to_string()))?;
        Ok(Some(value))
    }

    /// Writes `value` under `key` and records it as the most recently
    /// touched entry. Bypassed entirely when `invalidate` is set — the
    /// write still lands (write-through) but a caller configured to
    /// invalidate the cache never reads it back via `get`.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let bytes = serde_json::to_vec(value).map_err(|e| AppError::SchemaInvalid(e.to_string()))?;
        self.db
            .insert(key, bytes)
            .map_err(|e| AppError::InternalError(e.to_string()))?;
        *self.last_touched.lock().expect("lock poisoned") = Some(key.to_string());
        Ok(())
    }

    /// Removes the most-recently-written entry, if any, and clears the
    /// marker. Used after a response is rejected downstream so the next
    /// attempt cannot replay the cached (rejected) answer.
    pub fn pop_last_touched(&self) -> Result<(), AppError> {
        let mut guard = self.last_touched.lock().expect("lock poisoned");
        if let Some(key) = guard.take() {
            self.db
                .remove(&key)
                .map_err(|e| AppError::InternalError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Minimal hex encoding so `cache` doesn't need to pull in a dedicated
/// hex crate purely for this one call site.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.as_ref().len() * 2);
        for byte in bytes.as_ref() {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        value: String,
    }

    fn open_tmp() -> ResponseCache {
        let dir = tempfile::tempdir().expect("tempdir");
        ResponseCache::open(dir.into_path()).expect("open cache")
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = open_tmp();
        let payload = Payload {
            value: "hello".into(),
        };
        let key = ResponseCache::key_for(&payload).unwrap();
        cache.put(&key, &payload).unwrap();
        assert!(cache.contains(&key));
        let fetched: Payload = cache.get(&key).unwrap().unwrap();
        assert_eq!(fetched, payload);
    }

    #[test]
    fn pop_last_touched_removes_most_recent_write_only() {
        let cache = open_tmp();
        let a = Payload { value: "a".into() };
        let b = Payload { value: "b".into() };
        let key_a = ResponseCache::key_for(&a).unwrap();
        let key_b = ResponseCache::key_for(&b).unwrap();

        cache.put(&key_a, &a).unwrap();
        cache.put(&key_b, &b).unwrap();
        cache.pop_last_touched().unwrap();

        assert!(cache.contains(&key_a));
        assert!(!cache.contains(&key_b));
    }

    #[test]
    fn same_payload_hashes_to_same_key() {
        let payload = Payload {
            value: "deterministic".into(),
        };
        let k1 = ResponseCache::key_for(&payload).unwrap();
        let k2 = ResponseCache::key_for(&payload).unwrap();
        assert_eq!(k1, k2);
    }
}
