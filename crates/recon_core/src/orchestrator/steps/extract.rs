//! Extract step - stamps ego masks and runs feature extraction.

use crate::config::ConfigurationError;
use crate::masks::{materialize, MaskTree};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::stages;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, EgoMaskOutput, RunState, StepOutcome};

/// Feature extraction into the run database.
///
/// When ego masks are enabled, a mask tree is stamped from the library
/// before extraction and removed afterwards, whether the engine succeeded
/// or not.
pub struct ExtractFeaturesStep;

impl ExtractFeaturesStep {
    pub fn new() -> Self {
        Self
    }

    fn prepare_masks(&self, ctx: &Context, state: &mut RunState) -> StepResult<Option<MaskTree>> {
        let masks = &ctx.config.masks;
        if !masks.ego_masks {
            ctx.logger.info("Ego masks disabled");
            return Ok(None);
        }

        let library = masks
            .mask_library
            .as_deref()
            .ok_or(ConfigurationError::MissingSetting("masks.mask_library"))?;

        let tree = materialize(
            &ctx.config.images_dir(),
            library,
            &ctx.layout.ego_mask_dir,
            &masks.cameras,
        )?;

        let summary = tree.summary();
        ctx.logger.info(&format!(
            "Stamped {} ego masks for {} cameras",
            summary.total(),
            summary.stamped.len()
        ));
        for camera in &summary.skipped {
            ctx.logger
                .warn(&format!("No ego mask for camera '{}', left unmasked", camera));
        }

        state.ego_masks = Some(EgoMaskOutput {
            stamped: summary.stamped.clone(),
            skipped: summary.skipped.clone(),
        });
        Ok(Some(tree))
    }
}

impl Default for ExtractFeaturesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ExtractFeaturesStep {
    fn name(&self) -> &str {
        "ExtractFeatures"
    }

    fn description(&self) -> &str {
        "Extract features"
    }

    fn validate_input(&self, ctx: &Context, _state: &RunState) -> StepResult<()> {
        let images_dir = ctx.config.images_dir();
        if !images_dir.is_dir() {
            return Err(StepError::invalid_input(format!(
                "Images directory not found: {}",
                images_dir.display()
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let mask_tree = self.prepare_masks(ctx, state)?;

        let stage = stages::feature_extractor(
            &ctx.config,
            &ctx.layout,
            mask_tree.as_ref().map(|t| t.path()),
        );
        let extracted = ctx.run_stage(state, stage);

        if let Some(tree) = mask_tree {
            match tree.teardown() {
                Ok(()) => ctx.logger.debug("Ego mask tree removed"),
                // The engine error is the one worth reporting.
                Err(e) if extracted.is_err() => ctx.logger.warn(&e.to_string()),
                Err(e) => return Err(e.into()),
            }
        }

        extracted?;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
        Ok(())
    }
}
