//! Pipeline configuration.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Up-front validation that runs before any external stage
//!
//! # Example
//!
//! ```no_run
//! use recon_core::config::{validate, ConfigManager};
//!
//! let mut manager = ConfigManager::new("pipeline.toml");
//! manager.load().unwrap();
//!
//! let config = manager.into_config();
//! validate(&config).unwrap();
//! println!("Images: {}", config.images_dir().display());
//! ```

mod manager;
mod settings;
mod validation;

pub use manager::{atomic_write, render_with_comments, ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, EngineSettings, FeatureSettings, GpsSettings, LoggingSettings, MapperSettings,
    MaskSettings, MatchingSettings, PathSettings, PipelineConfig, UndistortSettings,
};
pub use validation::{validate, ConfigurationError};
