//! Reorient step - aligns and scales the rectified model.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::stages;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

pub struct ReorientStep;

impl ReorientStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReorientStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ReorientStep {
    fn name(&self) -> &str {
        "Reorient"
    }

    fn description(&self) -> &str {
        "Reorient and scale model"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.rectified.is_none() {
            return Err(StepError::invalid_input("Images have not been undistorted"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        ctx.run_stage(state, stages::auto_reorient(&ctx.config, &ctx.layout))?;
        state.aligned_model = Some(ctx.layout.aligned_sparse_dir.clone());
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
        Ok(())
    }
}
