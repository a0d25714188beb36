//! Config manager for loading and saving pipeline configuration files.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Unknown top-level sections are reported, not fatal
//! - Generated files carry a comment above each section

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::DocumentMut;

use super::settings::{ConfigSection, PipelineConfig};

/// Errors that can occur during config file operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads and saves a [`PipelineConfig`] at a fixed path.
pub struct ConfigManager {
    config_path: PathBuf,
    config: PipelineConfig,
    unknown_sections: Vec<String>,
}

impl ConfigManager {
    /// Create a manager for the given file. Nothing is read until `load()`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            config: PipelineConfig::default(),
            unknown_sections: Vec::new(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get the loaded config.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get a mutable reference to the loaded config.
    pub fn config_mut(&mut self) -> &mut PipelineConfig {
        &mut self.config
    }

    /// Consume the manager, returning the config.
    pub fn into_config(self) -> PipelineConfig {
        self.config
    }

    /// Top-level tables found in the file that no section claims.
    pub fn unknown_sections(&self) -> &[String] {
        &self.unknown_sections
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (config, unknown) = parse_and_validate(&content)?;

        for section in &unknown {
            tracing::warn!(
                "Ignoring unknown section [{}] in {}",
                section,
                self.config_path.display()
            );
        }

        self.config = config;
        self.unknown_sections = unknown;
        Ok(())
    }

    /// Save the entire config atomically, with section comments.
    pub fn save(&self) -> ConfigResult<()> {
        let content = render_with_comments(&self.config)?;
        atomic_write(&self.config_path, &content)?;
        Ok(())
    }
}

/// Parse config content and list the unknown top-level sections.
fn parse_and_validate(content: &str) -> ConfigResult<(PipelineConfig, Vec<String>)> {
    let doc: DocumentMut = content.parse()?;
    let config: PipelineConfig = toml::from_str(content)?;

    let known: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
    let unknown = doc
        .iter()
        .map(|(key, _)| key)
        .filter(|key| !known.contains(key))
        .map(str::to_string)
        .collect();

    Ok((config, unknown))
}

/// Render a config file with a comment above every section.
pub fn render_with_comments(config: &PipelineConfig) -> ConfigResult<String> {
    let full = toml::to_string_pretty(config)?;
    let mut doc: DocumentMut = full.parse()?;

    for section in ConfigSection::ALL {
        if let Some(table) = doc
            .get_mut(section.table_name())
            .and_then(|item| item.as_table_mut())
        {
            table
                .decor_mut()
                .set_prefix(format!("\n# {}\n", section.comment()));
        }
    }

    let mut output = String::new();
    output.push_str("# SfM preprocessing pipeline configuration\n");
    output.push_str("# Command-line flags override the values below.\n");
    output.push_str(&doc.to_string());
    Ok(output)
}

/// Write content to a file atomically.
///
/// Writes to a temp file next to the target first, then renames.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = path.with_extension("toml.tmp");

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)?;

    Ok(())
}
