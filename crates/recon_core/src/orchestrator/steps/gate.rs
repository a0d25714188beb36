//! Gate that ends the run after the unrectified model unless
//! rectification was requested.

use crate::orchestrator::errors::StepResult;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

pub struct UnrectifiedGateStep;

impl UnrectifiedGateStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnrectifiedGateStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for UnrectifiedGateStep {
    fn name(&self) -> &str {
        "UnrectifiedGate"
    }

    fn description(&self) -> &str {
        "Check rectification"
    }

    fn validate_input(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
        Ok(())
    }

    fn execute(&self, ctx: &Context, _state: &mut RunState) -> StepResult<StepOutcome> {
        if ctx.config.undistort.rectify {
            return Ok(StepOutcome::Success);
        }
        Ok(StepOutcome::Halt(format!(
            "unrectified model ready in {}",
            ctx.layout.unrectified_dir.display()
        )))
    }

    fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
        Ok(())
    }
}
