pub mod chunk;
pub mod legacy;
pub mod segment;

pub use chunk::{ChunkWithRange, Chunker};
pub use segment::{RuleBasedSegmenter, Segmenter, SentenceSpan};
