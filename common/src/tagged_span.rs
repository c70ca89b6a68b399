//! Per-file / per-query log prefixing as a decorator, not a global logger.
//!
//! Per-call context (which file is being ingested, which query is running)
//! should travel with the `tracing::Span` that wraps the call, not live in
//! a thread-local or a process-wide logger instance.

use tracing::Span;

/// Wraps an operation's `tracing::Span` with a short display tag so log
/// lines naturally carry `[tag]` without every call site formatting it by
/// hand.
pub struct TaggedSpan {
    span: Span,
}

impl TaggedSpan {
    pub fn file(path: &str) -> Self {
        Self {
            span: tracing::info_span!("file", path = %path),
        }
    }

    pub fn query(query_id: &str) -> Self {
        Self {
            span: tracing::info_span!("query", id = %query_id),
        }
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_span_can_be_entered() {
        let tagged = TaggedSpan::file("notes.md");
        let _guard = tagged.enter();
    }
}
