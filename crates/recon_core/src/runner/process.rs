//! Runs stages as child processes.

use std::process::Command;
use std::sync::Arc;

use super::{Stage, StageError, StageResult, StageRunner};
use crate::logging::RunLogger;

/// Runs each stage as a child process and waits for it to exit.
///
/// Tool output is fed into the run logger's tail buffer and shown when a
/// stage fails. Declared inputs are checked before spawning and declared
/// outputs after a successful exit.
pub struct ProcessRunner {
    logger: Arc<RunLogger>,
}

impl ProcessRunner {
    pub fn new(logger: Arc<RunLogger>) -> Self {
        Self { logger }
    }
}

impl StageRunner for ProcessRunner {
    fn run(&self, stage: &Stage) -> StageResult<()> {
        if let Some(missing) = stage.required_paths().iter().find(|p| !p.exists()) {
            return Err(StageError::MissingInput {
                tool: stage.name().to_string(),
                path: missing.clone(),
            });
        }

        self.logger.command(&stage.command_line());
        self.logger.clear_tail();

        let output = Command::new(stage.program())
            .args(stage.args())
            .output()
            .map_err(|e| StageError::Spawn {
                tool: stage.name().to_string(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.lines() {
            self.logger.output_line(line, false);
        }
        for line in stderr.lines() {
            self.logger.output_line(line, true);
        }

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            self.logger.show_tail(stage.name());
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output")
                .to_string();
            return Err(StageError::command_failed(stage.name(), exit_code, message));
        }

        if let Some(missing) = stage.produced_paths().iter().find(|p| !p.exists()) {
            return Err(StageError::MissingOutput {
                tool: stage.name().to_string(),
                path: missing.clone(),
            });
        }

        tracing::debug!("{} finished", stage.name());
        Ok(())
    }
}
