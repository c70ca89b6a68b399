//! Point/payload schema. Grounded in `archive_agent/db/QdrantSchema.py`'s
//! `QdrantPayload` Pydantic model: mandatory identity fields, an optional
//! `version`, and exactly one of `page_range`/`line_range` — the original
//! enforces this with a Pydantic validator and `extra = "forbid"`; here the
//! equivalent is [`PointPayload::validate`], called before every upsert.

use common::error::AppError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointPayload {
    pub file_path: String,
    pub file_mtime: i64,
    pub chunk_index: usize,
    pub chunks_total: usize,
    pub chunk_text: String,
    pub version: Option<String>,
    pub line_range: Option<Range>,
    pub page_range: Option<Range>,
}

impl PointPayload {
    /// Normalizes an empty range (`start == end == 0`) to `None` and then
    /// checks mutual exclusivity of `line_range`/`page_range`.
    pub fn validate(&mut self) -> Result<(), AppError> {
        normalize_empty(&mut self.line_range);
        normalize_empty(&mut self.page_range);

        if self.line_range.is_some() && self.page_range.is_some() {
            return Err(AppError::SchemaInvalid(
                "a point payload cannot have both line_range and page_range".into(),
            ));
        }
        Ok(())
    }
}

fn normalize_empty(range: &mut Option<Range>) {
    if matches!(range, Some(Range { start: 0, end: 0 })) {
        *range = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub id: String,
    pub embedding: Vec<f32>,
    pub payload: PointPayload,
}

/// Payload-field predicate accepted by `VectorStore::count`/`fetch_where`.
/// Only `file_path` is filterable today; the two-shape `{equals, any_of}`
/// split mirrors `archive_agent/db/QdrantManager.py`'s scroll filter, which
/// narrows by exact match or by a batch of candidate values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    FilePathEquals(String),
    FilePathAnyOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub point: Point,
    pub score: f32,
}
