pub mod context;
pub mod knee;
pub mod pipeline;
pub mod reference;
pub mod stage;
pub mod stages;

pub use context::PipelineContext;
pub use pipeline::{QueryOutcome, QueryPipeline, QueryRunOutput};
pub use stage::{PipelineStage, PipelineStageTimings, StageKind};
