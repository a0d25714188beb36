//! In-memory runner for exercising the orchestrator without an engine.

use parking_lot::Mutex;

use super::{Stage, StageError, StageResult, StageRunner};

/// Records every stage it is asked to run.
///
/// Optionally fails the first stage with a given name, so abort paths can
/// be exercised.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Stage>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail when a stage with this name runs.
    pub fn failing_on(name: impl Into<String>) -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            fail_on: Some(name.into()),
        }
    }

    /// Stages run so far, in order.
    pub fn invocations(&self) -> Vec<Stage> {
        self.invocations.lock().clone()
    }

    /// Names of the stages run so far, in order.
    pub fn stage_names(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }
}

impl StageRunner for RecordingRunner {
    fn run(&self, stage: &Stage) -> StageResult<()> {
        self.invocations.lock().push(stage.clone());
        if self.fail_on.as_deref() == Some(stage.name()) {
            return Err(StageError::command_failed(stage.name(), 1, "simulated failure"));
        }
        Ok(())
    }
}
