//! Map step - reconstructs the unrectified sparse model.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::stages;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, MapOutput, RunState, StepOutcome};

/// Hierarchical mapping followed by image simplification, or the flat
/// incremental mapper.
pub struct MapStep;

impl MapStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MapStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for MapStep {
    fn name(&self) -> &str {
        "Map"
    }

    fn description(&self) -> &str {
        "Reconstruct sparse model"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.matching.is_none() {
            return Err(StepError::invalid_input("Features have not been matched"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let hierarchical = ctx.config.mapper.hierarchical;

        if hierarchical {
            ctx.run_stage(state, stages::hierarchical_mapper(&ctx.config, &ctx.layout))?;
            ctx.run_stage(state, stages::simplify_images(&ctx.config, &ctx.layout))?;
        } else {
            ctx.run_stage(state, stages::mapper(&ctx.config, &ctx.layout))?;
        }

        state.mapping = Some(MapOutput {
            hierarchical,
            model_dir: ctx.layout.sparse_model_dir.clone(),
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if !state.has_model() {
            return Err(StepError::invalid_output("Sparse model not recorded"));
        }
        Ok(())
    }
}
