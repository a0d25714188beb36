//! Undistortion steps - rectified images, then rectified masks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::write_mask_model;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::stages;
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RectifiedOutput, RunState, StepOutcome};

/// Undistorts the images with the unrectified model.
pub struct UndistortImagesStep;

impl UndistortImagesStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UndistortImagesStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for UndistortImagesStep {
    fn name(&self) -> &str {
        "UndistortImages"
    }

    fn description(&self) -> &str {
        "Undistort images"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if !state.has_model() {
            return Err(StepError::invalid_input("No sparse model to undistort with"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        ctx.run_stage(state, stages::image_undistorter(&ctx.config, &ctx.layout))?;
        state.rectified = Some(RectifiedOutput {
            workspace: ctx.layout.rectified_dir.clone(),
            masks: None,
        });
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.rectified.is_none() {
            return Err(StepError::invalid_output("Rectified workspace not recorded"));
        }
        Ok(())
    }
}

/// Undistorts the masks exactly like the images they belong to.
///
/// A copy of the model whose image records name the masks is undistorted
/// over the masks directory; the result is binarized into the rectified
/// workspace. Both intermediate directories are removed on every path.
pub struct UndistortMasksStep;

impl UndistortMasksStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UndistortMasksStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for UndistortMasksStep {
    fn name(&self) -> &str {
        "UndistortMasks"
    }

    fn description(&self) -> &str {
        "Undistort masks"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.rectified.is_none() {
            return Err(StepError::invalid_input("Images have not been undistorted"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let Some(masks_dir) = ctx.config.masks_dir() else {
            return Ok(StepOutcome::Skipped("no masks directory".to_string()));
        };
        let layout = &ctx.layout;

        let model_copy = ScratchDir::new(&layout.mask_model_dir);
        let undistorted = ScratchDir::new(&layout.undistort_tmp_dir);

        let count = write_mask_model(&layout.sparse_model_dir, model_copy.path())?;
        ctx.logger
            .info(&format!("Rewrote {} image records to name masks", count));

        ctx.run_stage(
            state,
            stages::mask_undistorter(&ctx.config, layout, &masks_dir),
        )?;
        ctx.run_stage(state, stages::make_mask_uint8(&ctx.config, layout))?;

        model_copy
            .remove()
            .map_err(|e| StepError::io_error("removing mask model copy", e))?;
        undistorted
            .remove()
            .map_err(|e| StepError::io_error("removing undistorted masks", e))?;

        if let Some(rectified) = state.rectified.as_mut() {
            rectified.masks = Some(layout.rectified_masks_dir.clone());
        }
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, _state: &RunState) -> StepResult<()> {
        Ok(())
    }
}

/// Intermediate directory removed when dropped.
struct ScratchDir {
    path: PathBuf,
    armed: bool,
}

impl ScratchDir {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Remove now and report errors.
    fn remove(mut self) -> io::Result<()> {
        self.armed = false;
        remove_if_exists(&self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = remove_if_exists(&self.path) {
            tracing::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
