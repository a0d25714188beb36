//! External stage execution.
//!
//! A [`Stage`] is one invocation of an external tool: a program, an ordered
//! argument list, the paths it needs and the paths it promises to leave
//! behind. A [`StageRunner`] executes stages one at a time. Production code
//! uses [`ProcessRunner`]; tests drive the orchestrator with
//! [`RecordingRunner`] so no engine binary is needed.

mod process;
mod recording;
mod stage;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use process::ProcessRunner;
pub use recording::RecordingRunner;
pub use stage::Stage;

/// Failure of a single external stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// The tool ran and exited unsuccessfully.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The tool could not be started.
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// A declared input was missing before the stage ran.
    #[error("{tool} requires {} which does not exist", path.display())]
    MissingInput { tool: String, path: PathBuf },

    /// The tool succeeded but a declared output is missing.
    #[error("{tool} reported success but {} is missing", path.display())]
    MissingOutput { tool: String, path: PathBuf },
}

impl StageError {
    /// Create a command failed error.
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Name of the stage that failed.
    pub fn tool(&self) -> &str {
        match self {
            StageError::CommandFailed { tool, .. }
            | StageError::Spawn { tool, .. }
            | StageError::MissingInput { tool, .. }
            | StageError::MissingOutput { tool, .. } => tool,
        }
    }
}

/// Result type for stage execution.
pub type StageResult<T> = Result<T, StageError>;

/// Executes external stages.
///
/// Implementations must not return before the stage has fully terminated
/// and must not retry: a returned `Ok` means the stage ran once and
/// succeeded.
pub trait StageRunner: Send + Sync {
    fn run(&self, stage: &Stage) -> StageResult<()>;
}
