//! Pipeline orchestrator for coordinating a reconstruction run.
//!
//! A run is planned once (configuration validated, layout derived and
//! created) and then executed as a sequence of steps. Each step validates
//! its inputs, invokes one or more external stages and records its results.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (plan)
//!     └── Pipeline
//!         ├── Step: ExtractFeatures   (ego masks stamped and torn down)
//!         ├── Step: Match             (sequential, or generated list + import)
//!         ├── Step: Map               (hierarchical + simplify, or flat)
//!         ├── Step: UnrectifiedGate   (halts unless rectification is on)
//!         ├── Step: UndistortImages
//!         ├── Step: UndistortMasks    (skipped without a masks directory)
//!         └── Step: Reorient
//! ```
//!
//! # Example
//!
//! ```ignore
//! use recon_core::config::PipelineConfig;
//! use recon_core::orchestrator::Orchestrator;
//!
//! let config = PipelineConfig::for_project("/data/drive");
//! let report = Orchestrator::new(config).run()?;
//! println!("{:?}: {:?}", report.outcome, report.steps_completed);
//! ```

mod errors;
mod pipeline;
mod reconstruction;
pub mod stages;
mod step;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use reconstruction::{Orchestrator, RUN_CONFIG_FILE};
pub use step::PipelineStep;
pub use steps::{
    ExtractFeaturesStep, MapStep, MatchStep, ReorientStep, UndistortImagesStep,
    UndistortMasksStep, UnrectifiedGateStep,
};
pub use types::{
    Context, EgoMaskOutput, MapOutput, MatchMode, MatchOutput, RectifiedOutput, RunOutcome,
    RunReport, RunState, StepOutcome,
};

/// Create a standard pipeline with all steps in the correct order.
///
/// The standard pipeline executes these steps:
/// 1. ExtractFeatures - stamp ego masks, extract features into the database
/// 2. Match - sequential matching, or generate and import a match list
/// 3. Map - build the unrectified sparse model
/// 4. UnrectifiedGate - stop here unless rectification is enabled
/// 5. UndistortImages - rectified images and model
/// 6. UndistortMasks - rectified, binarized masks
/// 7. Reorient - align and scale the rectified model
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(ExtractFeaturesStep::new())
        .with_step(MatchStep::new())
        .with_step(MapStep::new())
        .with_step(UnrectifiedGateStep::new())
        .with_step(UndistortImagesStep::new())
        .with_step(UndistortMasksStep::new())
        .with_step(ReorientStep::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_pipeline_order() {
        assert_eq!(
            create_standard_pipeline().step_names(),
            vec![
                "ExtractFeatures",
                "Match",
                "Map",
                "UnrectifiedGate",
                "UndistortImages",
                "UndistortMasks",
                "Reorient"
            ]
        );
    }
}
