use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::ConfigurationError;

/// Image extensions that receive a mask.
const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Errors from building or removing a mask tree.
#[derive(Error, Debug)]
pub enum MaskError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl MaskError {
    fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// What was stamped for each camera.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionSummary {
    /// Camera folder → number of masks written.
    pub stamped: BTreeMap<String, usize>,
    /// Camera folders with no mask in the library.
    pub skipped: Vec<String>,
}

impl ProvisionSummary {
    /// Total masks written across cameras.
    pub fn total(&self) -> usize {
        self.stamped.values().sum()
    }
}

/// A generated mask tree on disk.
///
/// Owns the directory: `teardown` removes it and reports errors; dropping
/// without teardown removes it silently.
#[derive(Debug)]
pub struct MaskTree {
    path: PathBuf,
    summary: ProvisionSummary,
    removed: bool,
}

impl MaskTree {
    /// Root of the generated tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Per-camera stamping result.
    pub fn summary(&self) -> &ProvisionSummary {
        &self.summary
    }

    /// Remove the generated tree.
    pub fn teardown(mut self) -> Result<(), MaskError> {
        self.removed = true;
        remove_tree(&self.path)
    }
}

impl Drop for MaskTree {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            tracing::warn!("Failed to remove mask tree {}: {}", self.path.display(), e);
        }
    }
}

fn remove_tree(path: &Path) -> Result<(), MaskError> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir_all(path)
        .map_err(|e| MaskError::io(format!("removing {}", path.display()), e))?;
    tracing::debug!("Removed mask tree {}", path.display());
    Ok(())
}

/// Whether a file name has one of the image extensions that get a mask.
pub fn is_image_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Build a mask tree mirroring `images_dir` under `output_dir`.
///
/// Every directory directly under `images_dir` is a camera folder and must
/// be one of `cameras`. For each camera with a `<camera>.png` in
/// `mask_library`, every image in its folder gets a copy of that mask named
/// `<image filename>.png`. Cameras without a library mask are skipped with
/// a warning.
pub fn materialize(
    images_dir: &Path,
    mask_library: &Path,
    output_dir: &Path,
    cameras: &[String],
) -> Result<MaskTree, MaskError> {
    let camera_dirs = list_camera_dirs(images_dir)?;

    // Reject unknown cameras before writing anything.
    if let Some(name) = camera_dirs
        .iter()
        .map(|(name, _)| name)
        .find(|name| !cameras.contains(name))
    {
        return Err(ConfigurationError::UnknownCamera {
            name: name.clone(),
            dir: images_dir.to_path_buf(),
        }
        .into());
    }

    fs::create_dir_all(output_dir)
        .map_err(|e| MaskError::io(format!("creating {}", output_dir.display()), e))?;

    // From here on the guard owns the directory, so errors clean up.
    let mut tree = MaskTree {
        path: output_dir.to_path_buf(),
        summary: ProvisionSummary::default(),
        removed: false,
    };

    for (camera, camera_dir) in camera_dirs {
        let library_mask = mask_library.join(format!("{}.png", camera));
        if !library_mask.is_file() {
            tracing::warn!("{} doesn't have an ego mask, skipping", camera);
            tree.summary.skipped.push(camera);
            continue;
        }

        let count = stamp_camera(&camera_dir, &library_mask, &output_dir.join(&camera))?;
        tracing::info!("Stamped {} ego masks for {}", count, camera);
        tree.summary.stamped.insert(camera, count);
    }

    Ok(tree)
}

/// Camera folders under the images root, sorted by name.
fn list_camera_dirs(images_dir: &Path) -> Result<Vec<(String, PathBuf)>, MaskError> {
    if !images_dir.is_dir() {
        return Err(ConfigurationError::missing_path("images directory", images_dir).into());
    }

    let entries = fs::read_dir(images_dir)
        .map_err(|e| MaskError::io(format!("listing {}", images_dir.display()), e))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| MaskError::io("reading directory entry", e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
    }
    dirs.sort();
    Ok(dirs)
}

/// Copy `library_mask` once per image in `camera_dir`.
fn stamp_camera(
    camera_dir: &Path,
    library_mask: &Path,
    output_dir: &Path,
) -> Result<usize, MaskError> {
    fs::create_dir_all(output_dir)
        .map_err(|e| MaskError::io(format!("creating {}", output_dir.display()), e))?;

    let entries = fs::read_dir(camera_dir)
        .map_err(|e| MaskError::io(format!("listing {}", camera_dir.display()), e))?;

    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| MaskError::io("reading directory entry", e))?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_file() || !is_image_file(&filename) {
            continue;
        }

        let target = output_dir.join(format!("{}.png", filename));
        fs::copy(library_mask, &target).map_err(|e| {
            MaskError::io(
                format!("copying {} to {}", library_mask.display(), target.display()),
                e,
            )
        })?;
        count += 1;
    }

    Ok(count)
}
