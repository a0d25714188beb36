//! Sparse model files.
//!
//! The engine owns the model format; this module only reads and rewrites
//! the image records so masks can be undistorted with the same poses and
//! intrinsics as the images they belong to.

mod images;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use images::{
    parse_images, read_images_binary, rename_to_masks, write_images_binary, write_images_to,
    ModelImage, ModelImages, Point2d,
};

/// Files of a binary sparse model.
pub const CAMERAS_BIN: &str = "cameras.bin";
pub const IMAGES_BIN: &str = "images.bin";
pub const POINTS3D_BIN: &str = "points3D.bin";

/// Errors from reading or writing model files.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Model data ends early at byte {offset}")]
    Truncated { offset: usize },

    #[error("Image name at byte {offset} is not valid UTF-8")]
    InvalidName { offset: usize },

    #[error("Invalid model file {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

impl ModelError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach the file a decoding error came from.
    fn at(self, path: &Path) -> Self {
        match self {
            ModelError::Truncated { .. } | ModelError::InvalidName { .. } => ModelError::Invalid {
                path: path.to_path_buf(),
                message: self.to_string(),
            },
            other => other,
        }
    }
}

/// Write a copy of `model_dir` whose image records name masks.
///
/// `cameras.bin` and `points3D.bin` are copied unchanged; `images.bin` is
/// rewritten by [`rename_to_masks`]. Returns the number of image records.
pub fn write_mask_model(model_dir: &Path, out_dir: &Path) -> Result<usize, ModelError> {
    fs::create_dir_all(out_dir).map_err(|e| ModelError::io(out_dir, e))?;

    for file in [CAMERAS_BIN, POINTS3D_BIN] {
        let src = model_dir.join(file);
        fs::copy(&src, out_dir.join(file)).map_err(|e| ModelError::io(&src, e))?;
    }

    let images = read_images_binary(&model_dir.join(IMAGES_BIN))?;
    let masked = rename_to_masks(&images);
    write_images_binary(&masked, &out_dir.join(IMAGES_BIN))?;

    Ok(masked.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mask_model_copies_and_renames() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("sparse/0");
        let out = model.join("masks");
        fs::create_dir_all(&model).unwrap();
        fs::write(model.join(CAMERAS_BIN), b"cams").unwrap();
        fs::write(model.join(POINTS3D_BIN), b"pts").unwrap();

        let mut images = ModelImages::new();
        images.insert(
            1,
            ModelImage {
                image_id: 1,
                rotation: [1.0, 0.0, 0.0, 0.0],
                translation: [0.0; 3],
                camera_id: 1,
                name: "cam_front_left/0001.jpg".to_string(),
                points2d: Vec::new(),
            },
        );
        write_images_binary(&images, &model.join(IMAGES_BIN)).unwrap();

        assert_eq!(write_mask_model(&model, &out).unwrap(), 1);
        assert_eq!(fs::read(out.join(CAMERAS_BIN)).unwrap(), b"cams");
        assert_eq!(fs::read(out.join(POINTS3D_BIN)).unwrap(), b"pts");
        let rewritten = read_images_binary(&out.join(IMAGES_BIN)).unwrap();
        assert_eq!(rewritten[&1].name, "cam_front_left/0001.png");
    }

    #[test]
    fn missing_model_is_io_error() {
        let dir = tempdir().unwrap();
        let err = write_mask_model(&dir.path().join("absent"), &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }

    #[test]
    fn corrupt_file_names_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(IMAGES_BIN);
        fs::write(&path, [1u8, 0, 0]).unwrap();

        let err = read_images_binary(&path).unwrap_err();
        assert!(matches!(err, ModelError::Invalid { .. }));
        assert!(err.to_string().contains("images.bin"));
    }
}
