//! Up-front checks that turn bad configuration into errors before any
//! stage runs.

use std::path::PathBuf;

use thiserror::Error;

use super::settings::PipelineConfig;

/// Configuration problems that make a run impossible.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A camera folder in the image tree is not a recognised camera.
    #[error("Unexpected camera name '{name}' in {}", dir.display())]
    UnknownCamera { name: String, dir: PathBuf },

    /// A path the run depends on does not exist.
    #[error("Required {what} not found: {}", path.display())]
    MissingPath { what: &'static str, path: PathBuf },

    /// A setting the selected mode depends on was left empty.
    #[error("Missing setting '{0}'")]
    MissingSetting(&'static str),

    /// A value the run configuration cannot carry.
    #[error("Setting '{setting}' is out of range: {value} (at most {max})")]
    OutOfRange {
        setting: &'static str,
        value: String,
        max: String,
    },
}

impl ConfigurationError {
    /// Create a missing path error.
    pub fn missing_path(what: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingPath {
            what,
            path: path.into(),
        }
    }
}

/// Check everything that can be checked without touching the engine.
///
/// Camera folder names are checked later, by the mask provisioner, because
/// they only matter when ego masks are stamped.
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigurationError> {
    if config.paths.project_dir.as_os_str().is_empty() {
        return Err(ConfigurationError::MissingSetting("paths.project_dir"));
    }

    // TOML integers are signed 64-bit; the seed is written to run_config.toml.
    if i64::try_from(config.features.random_seed).is_err() {
        return Err(ConfigurationError::OutOfRange {
            setting: "features.random_seed",
            value: config.features.random_seed.to_string(),
            max: i64::MAX.to_string(),
        });
    }

    let images_dir = config.images_dir();
    if !images_dir.is_dir() {
        return Err(ConfigurationError::missing_path("images directory", images_dir));
    }

    if let Some(ref masks_dir) = config.paths.masks_dir {
        if !masks_dir.is_dir() {
            return Err(ConfigurationError::missing_path("masks directory", masks_dir));
        }
    }

    if config.masks.ego_masks {
        let library = config
            .masks
            .mask_library
            .as_ref()
            .ok_or(ConfigurationError::MissingSetting("masks.mask_library"))?;
        if !library.is_dir() {
            return Err(ConfigurationError::missing_path("mask library", library));
        }
    }

    if config.matching.sequential && config.matching.loop_detection {
        let vocab = config
            .matching
            .vocab_tree_path
            .as_ref()
            .ok_or(ConfigurationError::MissingSetting("matching.vocab_tree_path"))?;
        if !vocab.is_file() {
            return Err(ConfigurationError::missing_path("vocabulary tree", vocab));
        }
    }

    if !config.matching.sequential && config.matching.use_gps {
        if let Some((bus, meta)) = config.gps.sources() {
            if !bus.is_file() {
                return Err(ConfigurationError::missing_path("bus signal file", bus));
            }
            if !meta.is_dir() {
                return Err(ConfigurationError::missing_path("image meta directory", meta));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config_with_images(root: &std::path::Path) -> PipelineConfig {
        fs::create_dir_all(root.join("inputs/images")).unwrap();
        let mut config = PipelineConfig::for_project(root);
        config.masks.ego_masks = false;
        config
    }

    #[test]
    fn accepts_minimal_config() {
        let dir = tempdir().unwrap();
        let config = config_with_images(dir.path());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_empty_project_dir() {
        let config = PipelineConfig::default();
        assert!(matches!(
            validate(&config),
            Err(ConfigurationError::MissingSetting("paths.project_dir"))
        ));
    }

    #[test]
    fn seed_must_fit_run_config() {
        let dir = tempdir().unwrap();
        let mut config = config_with_images(dir.path());

        config.features.random_seed = i64::MAX as u64;
        assert!(validate(&config).is_ok());

        config.features.random_seed = i64::MAX as u64 + 1;
        assert!(matches!(
            validate(&config),
            Err(ConfigurationError::OutOfRange {
                setting: "features.random_seed",
                ..
            })
        ));
    }

    #[test]
    fn rejects_missing_images_dir() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::for_project(dir.path());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("images directory"));
    }

    #[test]
    fn ego_masks_need_library() {
        let dir = tempdir().unwrap();
        let mut config = config_with_images(dir.path());
        config.masks.ego_masks = true;
        assert!(matches!(
            validate(&config),
            Err(ConfigurationError::MissingSetting("masks.mask_library"))
        ));

        config.masks.mask_library = Some(dir.path().join("nowhere"));
        assert!(matches!(
            validate(&config),
            Err(ConfigurationError::MissingPath { what: "mask library", .. })
        ));
    }

    #[test]
    fn loop_detection_needs_vocab_tree() {
        let dir = tempdir().unwrap();
        let mut config = config_with_images(dir.path());
        config.matching.sequential = true;
        assert!(validate(&config).is_err());

        config.matching.loop_detection = false;
        assert!(validate(&config).is_ok());
    }
}
