//! Match step - fills the database with image pairs.

use std::path::{Path, PathBuf};

use crate::gps::{generate_image_gps, load_bus_signals, GpsError};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::stages;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, MatchMode, MatchOutput, RunState, StepOutcome};

/// Sequential matching, or a generated match list imported into the
/// database.
pub struct MatchStep;

impl MatchStep {
    pub fn new() -> Self {
        Self
    }

    /// Write the per-image GPS artifact when bus signals are configured.
    ///
    /// GPS only enriches the match list, so failures are logged and the
    /// generator runs without an artifact.
    fn prepare_gps(&self, ctx: &Context) -> Option<PathBuf> {
        let Some((bus_signals, meta_dir)) = ctx.config.gps.sources() else {
            ctx.logger
                .info("No bus signals configured, match list generator uses its own GPS lookup");
            return None;
        };

        let out = &ctx.layout.gps_path;
        match write_gps_artifact(bus_signals, meta_dir, out) {
            Ok((written, skipped)) => {
                ctx.logger.info(&format!(
                    "Interpolated GPS for {} images ({} skipped) into {}",
                    written,
                    skipped,
                    out.display()
                ));
                Some(out.clone())
            }
            Err(e) => {
                ctx.logger
                    .warn(&format!("GPS generation failed, continuing without: {}", e));
                None
            }
        }
    }
}

impl Default for MatchStep {
    fn default() -> Self {
        Self::new()
    }
}

fn write_gps_artifact(
    bus_signals: &Path,
    meta_dir: &Path,
    out: &Path,
) -> Result<(usize, usize), GpsError> {
    let track = load_bus_signals(bus_signals)?;
    let generation = generate_image_gps(&track, meta_dir)?;
    generation.artifact.write(out)?;
    Ok((generation.artifact.data.len(), generation.skipped.len()))
}

impl PipelineStep for MatchStep {
    fn name(&self) -> &str {
        "Match"
    }

    fn description(&self) -> &str {
        "Match features"
    }

    fn validate_input(&self, ctx: &Context, _state: &RunState) -> StepResult<()> {
        let matching = &ctx.config.matching;
        if matching.sequential && matching.loop_detection && matching.vocab_tree_path.is_none() {
            return Err(StepError::invalid_input(
                "Loop detection needs a vocabulary tree",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let matching = &ctx.config.matching;

        let output = if matching.sequential {
            ctx.run_stage(state, stages::sequential_matcher(&ctx.config, &ctx.layout))?;
            MatchOutput {
                mode: MatchMode::Sequential {
                    loop_detection: matching.loop_detection,
                },
                match_list: None,
                gps_artifact: None,
            }
        } else {
            let gps_artifact = if matching.use_gps {
                self.prepare_gps(ctx)
            } else {
                None
            };

            let generator =
                stages::custom_matcher(&ctx.config, &ctx.layout, gps_artifact.as_deref());
            ctx.run_stage(state, generator)?;
            ctx.run_stage(state, stages::matches_importer(&ctx.config, &ctx.layout))?;

            MatchOutput {
                mode: MatchMode::Custom {
                    gps: matching.use_gps,
                },
                match_list: Some(ctx.layout.match_list_path.clone()),
                gps_artifact,
            }
        };

        state.matching = Some(output);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.matching.is_none() {
            return Err(StepError::invalid_output("Matching output not recorded"));
        }
        Ok(())
    }
}
