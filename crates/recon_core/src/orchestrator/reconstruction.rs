//! Reconstruction driver: plans a run and feeds it through the pipeline.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{atomic_write, render_with_comments, validate, PipelineConfig};
use crate::layout::plan;
use crate::logging::{LogCallback, LogConfig, RunLogger};
use crate::runner::{ProcessRunner, StageRunner};

use super::errors::{PipelineError, PipelineResult};
use super::pipeline::{CancelHandle, Pipeline};
use super::types::{Context, RunOutcome, RunReport, RunState};
use super::create_standard_pipeline;

/// Effective configuration written into every derived project root.
pub const RUN_CONFIG_FILE: &str = "run_config.toml";

/// Runs one reconstruction for one configuration.
///
/// Before the first stage the orchestrator validates the configuration,
/// derives and creates the project layout, records the effective
/// configuration and opens the run log. Any failure after that point is
/// logged and returned with the failing step named.
///
/// # Example
///
/// ```ignore
/// let report = Orchestrator::new(config)
///     .with_log_callback(Box::new(|line| println!("{}", line)))
///     .run()?;
/// println!("Done in {:.1} minutes", report.elapsed_minutes());
/// ```
pub struct Orchestrator {
    config: PipelineConfig,
    pipeline: Pipeline,
    log_callback: Option<LogCallback>,
}

impl Orchestrator {
    /// Orchestrator running the standard pipeline.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_pipeline(config, create_standard_pipeline())
    }

    /// Orchestrator running a custom pipeline.
    pub fn with_pipeline(config: PipelineConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline,
            log_callback: None,
        }
    }

    /// Forward every log line to `callback` as well as the log file.
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.log_callback = Some(callback);
        self
    }

    /// Handle that stops the run at the next step boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.pipeline.cancel_handle()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage as a child process.
    pub fn run(self) -> PipelineResult<RunReport> {
        self.execute(|logger| Arc::new(ProcessRunner::new(logger)) as Arc<dyn StageRunner>)
    }

    /// Run with a caller-supplied stage runner.
    pub fn run_with(self, runner: Arc<dyn StageRunner>) -> PipelineResult<RunReport> {
        self.execute(move |_| runner)
    }

    fn execute<F>(self, make_runner: F) -> PipelineResult<RunReport>
    where
        F: FnOnce(Arc<RunLogger>) -> Arc<dyn StageRunner>,
    {
        let started = Instant::now();

        validate(&self.config)?;

        let layout = plan(&self.config);
        let run_name = layout
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reconstruction".to_string());

        layout.create_dirs().map_err(|e| {
            PipelineError::setup_failed(
                &run_name,
                format!("creating {}: {}", layout.root.display(), e),
            )
        })?;

        let rendered = render_with_comments(&self.config)
            .map_err(|e| PipelineError::setup_failed(&run_name, e.to_string()))?;
        let config_path = layout.root.join(RUN_CONFIG_FILE);
        atomic_write(&config_path, &rendered).map_err(|e| {
            PipelineError::setup_failed(
                &run_name,
                format!("writing {}: {}", config_path.display(), e),
            )
        })?;

        let logger = RunLogger::new(
            &run_name,
            &layout.logs_dir,
            LogConfig::from(&self.config.logging),
            self.log_callback,
        )
        .map(Arc::new)
        .map_err(|e| PipelineError::setup_failed(&run_name, format!("opening log: {}", e)))?;

        logger.info(&format!("Project root: {}", layout.root.display()));
        logger.info(&format!("Images: {}", self.config.images_dir().display()));
        logger.debug(&format!("Configuration written to {}", config_path.display()));

        let runner = make_runner(Arc::clone(&logger));
        let ctx = Context::new(
            self.config,
            layout.clone(),
            &run_name,
            Arc::clone(&logger),
            runner,
        );
        let mut state = RunState::new(&run_name);

        let result = self.pipeline.run(&ctx, &mut state);
        let elapsed = started.elapsed();

        match result {
            Ok(run_result) => {
                let outcome = if run_result.halted() {
                    RunOutcome::StoppedAfterUnrectified
                } else {
                    RunOutcome::Completed
                };
                let report = RunReport {
                    outcome,
                    layout,
                    state,
                    steps_completed: run_result.steps_completed,
                    steps_skipped: run_result.steps_skipped,
                    elapsed,
                };
                logger.success(&format!(
                    "Run finished ({:?}) in {:.2} minutes",
                    report.outcome,
                    report.elapsed_minutes()
                ));
                logger.flush();
                Ok(report)
            }
            Err(e) => {
                logger.error(&format!("Run failed: {}", e));
                logger.flush();
                Err(e)
            }
        }
    }
}
