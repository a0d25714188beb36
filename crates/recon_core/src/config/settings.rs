//! Pipeline configuration with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field carries a serde default so partial files load cleanly; the
//! CLI layers explicit flags on top of whatever a file provides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Root configuration for one reconstruction run.
///
/// Once a run starts this record is treated as immutable: the project
/// root is derived from it (see [`crate::layout::plan`]) and every stage
/// argument comes from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input and output locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Feature extraction options.
    #[serde(default)]
    pub features: FeatureSettings,

    /// Matcher selection.
    #[serde(default)]
    pub matching: MatchingSettings,

    /// Sparse mapper selection and hierarchical parameters.
    #[serde(default)]
    pub mapper: MapperSettings,

    /// Undistortion (rectified stage) options.
    #[serde(default)]
    pub undistort: UndistortSettings,

    /// Ego-mask provisioning.
    #[serde(default)]
    pub masks: MaskSettings,

    /// GPS-assisted matching inputs.
    #[serde(default)]
    pub gps: GpsSettings,

    /// External tool locations.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Per-run logging.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl PipelineConfig {
    /// Create a config for the given project directory with all defaults.
    pub fn for_project(project_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.project_dir = project_dir.into();
        config
    }

    /// Directory holding the source images (one subfolder per camera).
    ///
    /// Falls back to `<project_dir>/inputs/images`.
    pub fn images_dir(&self) -> PathBuf {
        self.paths
            .images_dir
            .clone()
            .unwrap_or_else(|| self.paths.project_dir.join("inputs").join("images"))
    }

    /// Directory of static masks to undistort alongside the images, if any.
    ///
    /// Falls back to `<project_dir>/inputs/masks` only when that directory
    /// exists.
    pub fn masks_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.paths.masks_dir {
            return Some(dir.clone());
        }
        let fallback = self.paths.project_dir.join("inputs").join("masks");
        fallback.is_dir().then_some(fallback)
    }
}

/// Named sections of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Features,
    Matching,
    Mapper,
    Undistort,
    Masks,
    Gps,
    Engine,
    Logging,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 9] = [
        ConfigSection::Paths,
        ConfigSection::Features,
        ConfigSection::Matching,
        ConfigSection::Mapper,
        ConfigSection::Undistort,
        ConfigSection::Masks,
        ConfigSection::Gps,
        ConfigSection::Engine,
        ConfigSection::Logging,
    ];

    /// TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Features => "features",
            ConfigSection::Matching => "matching",
            ConfigSection::Mapper => "mapper",
            ConfigSection::Undistort => "undistort",
            ConfigSection::Masks => "masks",
            ConfigSection::Gps => "gps",
            ConfigSection::Engine => "engine",
            ConfigSection::Logging => "logging",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Project, image and mask locations",
            ConfigSection::Features => "Feature extraction",
            ConfigSection::Matching => "Feature matching",
            ConfigSection::Mapper => "Sparse reconstruction",
            ConfigSection::Undistort => "Rectified stage (undistortion and re-orientation)",
            ConfigSection::Masks => "Ego-vehicle masks",
            ConfigSection::Gps => "GPS-assisted matching",
            ConfigSection::Engine => "External tools",
            ConfigSection::Logging => "Logging configuration",
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Base project directory. The derived project root is a sibling of it.
    #[serde(default)]
    pub project_dir: PathBuf,

    /// Image tree; defaults to `<project_dir>/inputs/images`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_dir: Option<PathBuf>,

    /// Static masks to undistort; defaults to `<project_dir>/inputs/masks` if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masks_dir: Option<PathBuf>,

    /// Run log folder; defaults to `<project root>/logs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
}

/// Feature extraction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Random seed forwarded to every engine verb.
    #[serde(default)]
    pub random_seed: u64,

    /// Share one camera across all images instead of one per folder.
    #[serde(default)]
    pub single_camera: bool,

    /// Camera model passed to the image reader.
    #[serde(default = "default_camera_model")]
    pub camera_model: String,

    /// Focal length guess as a factor of the image size.
    #[serde(default = "default_focal_length_factor")]
    pub default_focal_length_factor: f64,
}

fn default_camera_model() -> String {
    "PINHOLE".to_string()
}

fn default_focal_length_factor() -> f64 {
    0.5
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            random_seed: 0,
            single_camera: false,
            camera_model: default_camera_model(),
            default_focal_length_factor: default_focal_length_factor(),
        }
    }
}

/// Matcher selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Use the sequential matcher instead of a custom match list.
    #[serde(default)]
    pub sequential: bool,

    /// Enable loop detection in the sequential matcher.
    #[serde(default = "default_true")]
    pub loop_detection: bool,

    /// Vocabulary tree for loop detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_tree_path: Option<PathBuf>,

    /// Build the custom match list with GPS proximity.
    #[serde(default)]
    pub use_gps: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            sequential: false,
            loop_detection: true,
            vocab_tree_path: None,
            use_gps: false,
        }
    }
}

/// Mapper selection and hierarchical parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperSettings {
    /// Use the hierarchical mapper instead of the flat one.
    #[serde(default = "default_true")]
    pub hierarchical: bool,

    /// Overlap between images of neighbouring leaf clusters.
    #[serde(default = "default_image_overlap")]
    pub image_overlap: u32,

    /// Maximum images per leaf cluster.
    #[serde(default = "default_leaf_max_num_images")]
    pub leaf_max_num_images: u32,

    /// Maximum overlap between merged models.
    #[serde(default = "default_max_model_overlap")]
    pub max_model_overlap: u32,

    /// Trials for the initial image pair.
    #[serde(default = "default_init_num_trials")]
    pub init_num_trials: u32,

    /// Global bundle adjustment function tolerance.
    #[serde(default = "default_ba_tolerance")]
    pub ba_global_function_tolerance: f64,
}

fn default_image_overlap() -> u32 {
    50
}

fn default_leaf_max_num_images() -> u32 {
    500
}

fn default_max_model_overlap() -> u32 {
    20
}

fn default_init_num_trials() -> u32 {
    200
}

fn default_ba_tolerance() -> f64 {
    0.000001
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            hierarchical: true,
            image_overlap: default_image_overlap(),
            leaf_max_num_images: default_leaf_max_num_images(),
            max_model_overlap: default_max_model_overlap(),
            init_num_trials: default_init_num_trials(),
            ba_global_function_tolerance: default_ba_tolerance(),
        }
    }
}

/// Rectified stage options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndistortSettings {
    /// Continue past the unrectified stage (undistort, masks, re-orient).
    #[serde(default)]
    pub rectify: bool,

    /// Longest side of undistorted images.
    #[serde(default = "default_max_image_size")]
    pub max_image_size: u32,
}

fn default_max_image_size() -> u32 {
    2048
}

impl Default for UndistortSettings {
    fn default() -> Self {
        Self {
            rectify: false,
            max_image_size: default_max_image_size(),
        }
    }
}

/// Ego-mask provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSettings {
    /// Stamp per-camera ego masks for feature extraction.
    #[serde(default = "default_true")]
    pub ego_masks: bool,

    /// Folder holding one `<camera>.png` per camera.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_library: Option<PathBuf>,

    /// Camera folder names accepted in the image tree.
    #[serde(default = "default_cameras")]
    pub cameras: Vec<String>,
}

fn default_cameras() -> Vec<String> {
    [
        "cam_front_center",
        "cam_front_left",
        "cam_front_right",
        "cam_rear_center",
        "cam_side_left",
        "cam_side_right",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            ego_masks: true,
            mask_library: None,
            cameras: default_cameras(),
        }
    }
}

/// GPS inputs for the custom matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsSettings {
    /// Vehicle bus-signal JSON with latitude/longitude series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus_signal_path: Option<PathBuf>,

    /// Per-camera folders of image meta JSON files (`cam_tstamp`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_meta_path: Option<PathBuf>,
}

impl GpsSettings {
    /// Both inputs needed to generate the per-image GPS artifact.
    pub fn sources(&self) -> Option<(&Path, &Path)> {
        match (&self.bus_signal_path, &self.images_meta_path) {
            (Some(bus), Some(meta)) => Some((bus.as_path(), meta.as_path())),
            _ => None,
        }
    }
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// COLMAP executable.
    #[serde(default = "default_colmap")]
    pub colmap: String,

    /// Interpreter for the helper scripts.
    #[serde(default = "default_python")]
    pub python: String,

    /// Custom match list generator.
    #[serde(default = "default_custom_matcher_script")]
    pub custom_matcher_script: PathBuf,

    /// Sparse model image simplifier.
    #[serde(default = "default_simplify_images_script")]
    pub simplify_images_script: PathBuf,

    /// Undistorted mask binarizer.
    #[serde(default = "default_make_mask_uint8_script")]
    pub make_mask_uint8_script: PathBuf,

    /// Scene re-orientation and scaling.
    #[serde(default = "default_auto_reorient_script")]
    pub auto_reorient_script: PathBuf,
}

fn default_colmap() -> String {
    if cfg!(windows) {
        "colmap.bat".to_string()
    } else {
        "colmap".to_string()
    }
}

fn default_python() -> String {
    "python".to_string()
}

fn default_custom_matcher_script() -> PathBuf {
    PathBuf::from("czg_preprocess/make_colmap_custom_matcher_modified.py")
}

fn default_simplify_images_script() -> PathBuf {
    PathBuf::from("preprocess/simplify_images.py")
}

fn default_make_mask_uint8_script() -> PathBuf {
    PathBuf::from("preprocess/make_mask_uint8.py")
}

fn default_auto_reorient_script() -> PathBuf {
    PathBuf::from("preprocess/auto_reorient.py")
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            colmap: default_colmap(),
            python: default_python(),
            custom_matcher_script: default_custom_matcher_script(),
            simplify_images_script: default_simplify_images_script(),
            make_mask_uint8_script: default_make_mask_uint8_script(),
            auto_reorient_script: default_auto_reorient_script(),
        }
    }
}

/// Per-run logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to the run log.
    #[serde(default)]
    pub level: LogLevel,

    /// Hide raw tool output (still kept in the tail buffer).
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines shown after a failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,

    /// Prefix lines with a wall-clock timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_error_tail() -> usize {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let config = PipelineConfig::default();
        assert!(config.mapper.hierarchical);
        assert_eq!(config.mapper.image_overlap, 50);
        assert_eq!(config.mapper.leaf_max_num_images, 500);
        assert_eq!(config.mapper.max_model_overlap, 20);
        assert_eq!(config.mapper.init_num_trials, 200);
        assert!(config.masks.ego_masks);
        assert!(!config.undistort.rectify);
        assert_eq!(config.masks.cameras.len(), 6);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: PipelineConfig = toml::from_str(
            "[paths]\nproject_dir = \"data/run\"\n\n[mapper]\nhierarchical = false\n",
        )
        .unwrap();

        assert_eq!(config.paths.project_dir, PathBuf::from("data/run"));
        assert!(!config.mapper.hierarchical);
        assert_eq!(config.mapper.init_num_trials, 200);
        assert_eq!(config.features.camera_model, "PINHOLE");
    }

    #[test]
    fn images_dir_falls_back_to_inputs() {
        let config = PipelineConfig::for_project("/data/run");
        assert_eq!(config.images_dir(), PathBuf::from("/data/run/inputs/images"));
    }

    #[test]
    fn masks_dir_absent_without_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::for_project(dir.path());
        assert!(config.masks_dir().is_none());

        std::fs::create_dir_all(dir.path().join("inputs/masks")).unwrap();
        assert_eq!(config.masks_dir(), Some(dir.path().join("inputs/masks")));
    }

    #[test]
    fn gps_sources_need_both_paths() {
        let mut gps = GpsSettings::default();
        assert!(gps.sources().is_none());
        gps.bus_signal_path = Some(PathBuf::from("bus.json"));
        assert!(gps.sources().is_none());
        gps.images_meta_path = Some(PathBuf::from("meta"));
        assert!(gps.sources().is_some());
    }
}
