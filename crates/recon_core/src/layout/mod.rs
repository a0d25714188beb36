//! Project layout planning.
//!
//! The derived project root is a pure function of the configuration: the
//! base project directory name is suffixed with tags for the mapping mode,
//! the camera mode and the seed. Distinct configurations therefore land in
//! distinct directories, and a directory name alone tells which settings
//! produced it.
//!
//! ```text
//! <root>/
//!     camera_calibration/
//!         unrectified/  database.db, matching.txt, sparse/0/
//!         rectified/    images/, sparse/, masks/
//!         aligned/      sparse/0/
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;

/// Directory name under the root holding every calibration output.
const CALIBRATION_DIR: &str = "camera_calibration";

/// Concrete on-disk paths for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    /// Derived project root.
    pub root: PathBuf,
    pub calibration_dir: PathBuf,
    /// Unrectified workspace (database, match list, sparse model).
    pub unrectified_dir: PathBuf,
    pub database_path: PathBuf,
    pub match_list_path: PathBuf,
    /// Per-image GPS artifact consumed by the custom matcher.
    pub gps_path: PathBuf,
    /// Mapper output directory (models are written as numbered children).
    pub sparse_dir: PathBuf,
    /// The model the rectified stage reads (`sparse/0`).
    pub sparse_model_dir: PathBuf,
    /// Temporary copy of the model with image names pointing at masks.
    pub mask_model_dir: PathBuf,
    /// Rectified workspace.
    pub rectified_dir: PathBuf,
    pub rectified_sparse_dir: PathBuf,
    pub rectified_masks_dir: PathBuf,
    /// Temporary undistorted masks before binarization.
    pub undistort_tmp_dir: PathBuf,
    /// Aligned workspace.
    pub aligned_dir: PathBuf,
    pub aligned_sparse_dir: PathBuf,
    /// Generated per-image ego-mask tree.
    pub ego_mask_dir: PathBuf,
    /// Run logs.
    pub logs_dir: PathBuf,
}

impl ProjectLayout {
    /// Build every path from a derived root.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let calibration_dir = root.join(CALIBRATION_DIR);
        let unrectified_dir = calibration_dir.join("unrectified");
        let sparse_dir = unrectified_dir.join("sparse");
        let sparse_model_dir = sparse_dir.join("0");
        let rectified_dir = calibration_dir.join("rectified");
        let aligned_dir = calibration_dir.join("aligned");

        Self {
            database_path: unrectified_dir.join("database.db"),
            match_list_path: unrectified_dir.join("matching.txt"),
            gps_path: unrectified_dir.join("imgs_gps.json"),
            mask_model_dir: sparse_model_dir.join("masks"),
            rectified_sparse_dir: rectified_dir.join("sparse"),
            rectified_masks_dir: rectified_dir.join("masks"),
            undistort_tmp_dir: calibration_dir.join("tmp"),
            aligned_sparse_dir: aligned_dir.join("sparse").join("0"),
            ego_mask_dir: calibration_dir.join("ego_masks"),
            logs_dir: root.join("logs"),
            sparse_dir,
            sparse_model_dir,
            unrectified_dir,
            rectified_dir,
            aligned_dir,
            calibration_dir,
            root,
        }
    }

    /// Create the directories every run writes into.
    ///
    /// Idempotent: existing directories are left untouched. The ego-mask
    /// tree and the undistortion temporaries are not created here; their
    /// owners create and remove them.
    pub fn create_dirs(&self) -> io::Result<()> {
        for dir in self.required_dirs() {
            if !dir.is_dir() {
                tracing::debug!("Creating {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// Directories that must exist before the first stage runs.
    pub fn required_dirs(&self) -> [&Path; 3] {
        [
            self.sparse_dir.as_path(),
            self.rectified_dir.as_path(),
            self.aligned_sparse_dir.as_path(),
        ]
    }
}

/// Tag appended to the project directory name for this configuration.
pub fn root_suffix(config: &PipelineConfig) -> String {
    let mapper = &config.mapper;
    let mut suffix = if mapper.hierarchical {
        format!(
            "_imgoverlap{}_leaf{}_modeloverlap{}_inittrial{}",
            mapper.image_overlap,
            mapper.leaf_max_num_images,
            mapper.max_model_overlap,
            mapper.init_num_trials
        )
    } else {
        "_wo-hier".to_string()
    };

    if config.features.single_camera {
        suffix.push_str("_single_camera");
    }

    if config.features.random_seed != 0 {
        suffix.push_str(&format!("_seed{}", config.features.random_seed));
    }

    suffix
}

/// Derive the project layout for a configuration.
///
/// Pure: nothing is touched on disk. Call [`ProjectLayout::create_dirs`]
/// to materialize it.
pub fn plan(config: &PipelineConfig) -> ProjectLayout {
    let base = &config.paths.project_dir;
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root = base.with_file_name(format!("{}{}", name, root_suffix(config)));

    let mut layout = ProjectLayout::under(root);
    if let Some(ref logs_dir) = config.paths.logs_dir {
        layout.logs_dir = logs_dir.clone();
    }
    layout
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn flat_config(base: &str) -> PipelineConfig {
        let mut config = PipelineConfig::for_project(base);
        config.mapper.hierarchical = false;
        config
    }

    #[test]
    fn flat_root_uses_wo_hier_tag() {
        let layout = plan(&flat_config("data/ingolstadt"));
        assert_eq!(layout.root, PathBuf::from("data/ingolstadt_wo-hier"));
        assert_eq!(
            layout.database_path,
            PathBuf::from("data/ingolstadt_wo-hier/camera_calibration/unrectified/database.db")
        );
    }

    #[test]
    fn hierarchical_root_embeds_parameters() {
        let mut config = PipelineConfig::for_project("data/munich");
        config.features.single_camera = true;
        config.features.random_seed = 7;

        let layout = plan(&config);
        assert_eq!(
            layout.root,
            PathBuf::from(
                "data/munich_imgoverlap50_leaf500_modeloverlap20_inittrial200_single_camera_seed7"
            )
        );
    }

    #[test]
    fn trailing_separator_is_ignored() {
        let layout = plan(&flat_config("data/ingolstadt/"));
        assert_eq!(layout.root, PathBuf::from("data/ingolstadt_wo-hier"));
    }

    #[test]
    fn distinct_configs_get_distinct_roots() {
        let base = PipelineConfig::for_project("data/run");
        let mut variants = vec![base.clone()];

        let mut c = base.clone();
        c.mapper.hierarchical = false;
        variants.push(c);
        let mut c = base.clone();
        c.mapper.image_overlap = 51;
        variants.push(c);
        let mut c = base.clone();
        c.mapper.leaf_max_num_images = 501;
        variants.push(c);
        let mut c = base.clone();
        c.mapper.max_model_overlap = 21;
        variants.push(c);
        let mut c = base.clone();
        c.mapper.init_num_trials = 201;
        variants.push(c);
        let mut c = base.clone();
        c.features.single_camera = true;
        variants.push(c);
        let mut c = base.clone();
        c.features.random_seed = 1;
        variants.push(c);

        let roots: Vec<PathBuf> = variants.iter().map(|c| plan(c).root).collect();
        for (i, a) in roots.iter().enumerate() {
            for b in roots.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn same_config_same_root() {
        let config = PipelineConfig::for_project("data/run");
        assert_eq!(plan(&config), plan(&config.clone()));
    }

    #[test]
    fn logs_dir_override() {
        let mut config = flat_config("data/run");
        config.paths.logs_dir = Some(PathBuf::from("/var/log/recon"));
        assert_eq!(plan(&config).logs_dir, PathBuf::from("/var/log/recon"));
    }

    #[test]
    fn create_dirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = plan(&flat_config(dir.path().join("proj").to_str().unwrap()));

        layout.create_dirs().unwrap();
        for required in layout.required_dirs() {
            assert!(required.is_dir());
        }
        assert!(!layout.ego_mask_dir.exists());
        assert!(!layout.undistort_tmp_dir.exists());

        let marker = layout.sparse_dir.join("keep.txt");
        std::fs::write(&marker, "x").unwrap();

        layout.create_dirs().unwrap();
        assert!(marker.exists());
    }
}
