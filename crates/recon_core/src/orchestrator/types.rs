//! Core types for the orchestrator pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::StepResult;
use crate::config::PipelineConfig;
use crate::layout::ProjectLayout;
use crate::logging::RunLogger;
use crate::runner::{Stage, StageRunner};

/// Read-only context passed to pipeline steps.
///
/// Contains the run configuration and shared resources that steps can read
/// but not modify. Mutable state goes in `RunState`.
pub struct Context {
    /// Run configuration.
    pub config: PipelineConfig,
    /// Derived directory layout.
    pub layout: ProjectLayout,
    /// Run name (the derived project directory name).
    pub run_name: String,
    /// Per-run logger.
    pub logger: Arc<RunLogger>,
    runner: Arc<dyn StageRunner>,
}

impl Context {
    pub fn new(
        config: PipelineConfig,
        layout: ProjectLayout,
        run_name: impl Into<String>,
        logger: Arc<RunLogger>,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        Self {
            config,
            layout,
            run_name: run_name.into(),
            logger,
            runner,
        }
    }

    /// Run one external stage and record it in the state.
    pub fn run_stage(&self, state: &mut RunState, stage: Stage) -> StepResult<()> {
        self.logger.info(&format!("Running {}", stage.name()));
        state.stages_run.push(stage.name().to_string());
        self.runner.run(&stage)?;
        Ok(())
    }
}

/// Mutable run state that accumulates results from pipeline steps.
///
/// Steps add their own section and leave the others alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run identifier.
    pub run_id: String,
    /// When the run started.
    pub started_at: Option<String>,
    /// External stages invoked so far, in order.
    pub stages_run: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ego_masks: Option<EgoMaskOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MapOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rectified: Option<RectifiedOutput>,
    /// Final aligned sparse model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aligned_model: Option<PathBuf>,
}

impl RunState {
    /// Create a new run state with the given ID.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        }
    }

    /// Check if a sparse model has been produced.
    pub fn has_model(&self) -> bool {
        self.mapping.is_some()
    }
}

/// Ego masks stamped for feature extraction (already torn down).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EgoMaskOutput {
    /// Camera folder → masks written.
    pub stamped: BTreeMap<String, usize>,
    /// Cameras with no library mask.
    pub skipped: Vec<String>,
}

/// Matcher used to fill the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    Sequential { loop_detection: bool },
    Custom { gps: bool },
}

/// Output from the Match step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutput {
    pub mode: MatchMode,
    /// Imported match list (custom mode).
    pub match_list: Option<PathBuf>,
    /// Per-image GPS artifact handed to the match list generator.
    pub gps_artifact: Option<PathBuf>,
}

/// Output from the Map step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapOutput {
    pub hierarchical: bool,
    /// Model consumed by the rectified stage.
    pub model_dir: PathBuf,
}

/// Output from the undistortion steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RectifiedOutput {
    pub workspace: PathBuf,
    /// Binarized undistorted masks, when a masks directory was supplied.
    pub masks: Option<PathBuf>,
}

/// Result of executing a pipeline step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step was skipped (its guard did not hold, not an error).
    Skipped(String),
    /// Step completed and no later step should run.
    Halt(String),
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every configured step ran.
    Completed,
    /// Stopped after the unrectified sparse model, as configured.
    StoppedAfterUnrectified,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub layout: ProjectLayout,
    pub state: RunState,
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    /// Elapsed wall-clock time in minutes.
    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_secs_f64() / 60.0
    }
}
