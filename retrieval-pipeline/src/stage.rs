//! Staged-driver scaffolding. Grounded in `retrieval-pipeline/src/pipeline/mod.rs`'s
//! `PipelineStage` trait, `StageKind` enum, and sequential stage execution
//! with per-stage timing capture (teacher), reused verbatim as the shape
//! for this pipeline's eight steps.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::error::AppError;

use crate::context::PipelineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Embed,
    Retrieve,
    Knee,
    Rerank,
    Expand,
    Dedup,
    Synthesize,
    Repair,
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;
    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), AppError>;
}

pub type BoxedStage = Box<dyn PipelineStage>;

#[derive(Debug, Default, Clone)]
pub struct PipelineStageTimings {
    timings: Vec<(StageKind, Duration)>,
}

impl PipelineStageTimings {
    pub fn record(&mut self, kind: StageKind, duration: Duration) {
        self.timings.push((kind, duration));
    }

    pub fn into_vec(self) -> Vec<(StageKind, Duration)> {
        self.timings
    }
}

pub async fn run_stages(stages: Vec<BoxedStage>, ctx: &mut PipelineContext) -> Result<(), AppError> {
    for stage in stages {
        let start = Instant::now();
        stage.execute(ctx).await?;
        ctx.stage_timings.record(stage.kind(), start.elapsed());
    }
    Ok(())
}
