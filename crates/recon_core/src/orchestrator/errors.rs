//! Error types for the orchestrator pipeline.
//!
//! Errors carry context that chains through layers:
//! Run → Step → Stage → Detail

use std::io;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::gps::GpsError;
use crate::masks::MaskError;
use crate::model::ModelError;
use crate::runner::StageError;

/// Top-level pipeline error with run context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A step failed during execution.
    #[error("Run '{run_name}' failed at step '{step_name}': {source}")]
    StepFailed {
        run_name: String,
        step_name: String,
        #[source]
        source: StepError,
    },

    /// The configuration was rejected before any stage ran.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Pipeline was cancelled.
    #[error("Run '{run_name}' was cancelled")]
    Cancelled { run_name: String },

    /// Failed to set up the run (create directories, open the log, etc.).
    #[error("Run '{run_name}' setup failed: {message}")]
    SetupFailed { run_name: String, message: String },
}

impl PipelineError {
    /// Create a step failed error.
    pub fn step_failed(
        run_name: impl Into<String>,
        step_name: impl Into<String>,
        source: StepError,
    ) -> Self {
        Self::StepFailed {
            run_name: run_name.into(),
            step_name: step_name.into(),
            source,
        }
    }

    /// Create a setup failed error.
    pub fn setup_failed(run_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            run_name: run_name.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(run_name: impl Into<String>) -> Self {
        Self::Cancelled {
            run_name: run_name.into(),
        }
    }

    /// Name of the pipeline step that failed, if a step failed.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            PipelineError::StepFailed { step_name, .. } => Some(step_name),
            _ => None,
        }
    }

    /// The external stage failure behind this error, if any.
    pub fn stage_failure(&self) -> Option<&StageError> {
        match self {
            PipelineError::StepFailed {
                source: StepError::Stage(e),
                ..
            } => Some(e),
            _ => None,
        }
    }

    /// Whether the run failed because of its configuration.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            PipelineError::Configuration(_) => true,
            PipelineError::StepFailed { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }
}

/// Error from a pipeline step with operation context.
#[derive(Error, Debug)]
pub enum StepError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// An external stage failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Mask provisioning failed: {0}")]
    Mask(#[from] MaskError),

    #[error("Sparse model rewrite failed: {0}")]
    Model(#[from] ModelError),

    #[error("GPS generation failed: {0}")]
    Gps(#[from] GpsError),

    /// File I/O error.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create an I/O error with context.
    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    /// Whether this error stems from configuration rather than execution.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            StepError::Configuration(_) | StepError::Mask(MaskError::Configuration(_))
        )
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pipeline_error_chains_context() {
        let step_err = StepError::from(StageError::command_failed("matches_importer", 1, "boom"));
        let pipeline_err = PipelineError::step_failed("proj_wo-hier", "Match", step_err);

        let msg = pipeline_err.to_string();
        assert!(msg.contains("proj_wo-hier"));
        assert!(msg.contains("Match"));
        assert!(msg.contains("matches_importer"));
        assert_eq!(pipeline_err.failed_step(), Some("Match"));
        assert_eq!(
            pipeline_err.stage_failure().map(|e| e.tool()),
            Some("matches_importer")
        );
        assert!(!pipeline_err.is_configuration_error());
    }

    #[test]
    fn unknown_camera_counts_as_configuration() {
        let mask_err = MaskError::from(ConfigurationError::UnknownCamera {
            name: "dashcam".to_string(),
            dir: PathBuf::from("images"),
        });
        let err = PipelineError::step_failed("run", "ExtractFeatures", mask_err.into());
        assert!(err.is_configuration_error());
        assert!(err.stage_failure().is_none());
    }
}
