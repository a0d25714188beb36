//! COLMAP `images.bin` reader and writer.
//!
//! Little-endian layout:
//!
//! ```text
//! u64 num_images
//! per image:
//!     i32 image_id
//!     f64 qw qx qy qz
//!     f64 tx ty tz
//!     i32 camera_id
//!     name bytes, NUL-terminated
//!     u64 num_points2d
//!     per point: f64 x, f64 y, i64 point3d_id   (-1 = unobserved)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::ModelError;

/// One registered image of a sparse model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelImage {
    pub image_id: i32,
    /// Rotation quaternion (qw, qx, qy, qz).
    pub rotation: [f64; 4],
    /// Translation (x, y, z).
    pub translation: [f64; 3],
    pub camera_id: i32,
    pub name: String,
    /// Observed keypoints and the 3D point each one belongs to.
    pub points2d: Vec<Point2d>,
}

/// A keypoint observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2d {
    pub x: f64,
    pub y: f64,
    pub point3d_id: i64,
}

/// Images keyed by id.
pub type ModelImages = BTreeMap<i32, ModelImage>;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], ModelError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(ModelError::Truncated { offset: self.pos })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u64(&mut self) -> Result<u64, ModelError> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> Result<i64, ModelError> {
        self.take::<8>().map(i64::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, ModelError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, ModelError> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    fn c_string(&mut self) -> Result<String, ModelError> {
        let rest = &self.bytes[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ModelError::Truncated { offset: self.pos })?;
        let name = String::from_utf8(rest[..len].to_vec())
            .map_err(|_| ModelError::InvalidName { offset: self.pos })?;
        self.pos += len + 1;
        Ok(name)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decode `images.bin` content.
pub fn parse_images(bytes: &[u8]) -> Result<ModelImages, ModelError> {
    let mut r = Reader { bytes, pos: 0 };
    let count = r.u64()?;
    let mut images = ModelImages::new();

    for _ in 0..count {
        let image_id = r.i32()?;
        let rotation = [r.f64()?, r.f64()?, r.f64()?, r.f64()?];
        let translation = [r.f64()?, r.f64()?, r.f64()?];
        let camera_id = r.i32()?;
        let name = r.c_string()?;

        let num_points = r.u64()? as usize;
        // Each point is 24 bytes; reject counts the buffer cannot hold.
        if num_points > r.remaining() / 24 {
            return Err(ModelError::Truncated { offset: r.pos });
        }
        let mut points2d = Vec::with_capacity(num_points);
        for _ in 0..num_points {
            points2d.push(Point2d {
                x: r.f64()?,
                y: r.f64()?,
                point3d_id: r.i64()?,
            });
        }

        images.insert(
            image_id,
            ModelImage {
                image_id,
                rotation,
                translation,
                camera_id,
                name,
                points2d,
            },
        );
    }

    Ok(images)
}

/// Encode images in ascending id order.
pub fn write_images_to<W: Write>(images: &ModelImages, mut w: W) -> io::Result<()> {
    w.write_all(&(images.len() as u64).to_le_bytes())?;
    for image in images.values() {
        w.write_all(&image.image_id.to_le_bytes())?;
        for q in image.rotation {
            w.write_all(&q.to_le_bytes())?;
        }
        for t in image.translation {
            w.write_all(&t.to_le_bytes())?;
        }
        w.write_all(&image.camera_id.to_le_bytes())?;
        w.write_all(image.name.as_bytes())?;
        w.write_all(&[0])?;
        w.write_all(&(image.points2d.len() as u64).to_le_bytes())?;
        for p in &image.points2d {
            w.write_all(&p.x.to_le_bytes())?;
            w.write_all(&p.y.to_le_bytes())?;
            w.write_all(&p.point3d_id.to_le_bytes())?;
        }
    }
    w.flush()
}

/// Read an `images.bin` file.
pub fn read_images_binary(path: &Path) -> Result<ModelImages, ModelError> {
    let bytes = fs::read(path).map_err(|e| ModelError::io(path, e))?;
    parse_images(&bytes).map_err(|e| e.at(path))
}

/// Write an `images.bin` file.
pub fn write_images_binary(images: &ModelImages, path: &Path) -> Result<(), ModelError> {
    let file = fs::File::create(path).map_err(|e| ModelError::io(path, e))?;
    write_images_to(images, BufWriter::new(file)).map_err(|e| ModelError::io(path, e))
}

/// Point every image record at its mask instead of the source image.
///
/// The source extension of each name is swapped for `png`
/// (`frame.jpeg` → `frame.png`); poses, cameras and observations are kept.
pub fn rename_to_masks(images: &ModelImages) -> ModelImages {
    images
        .iter()
        .map(|(id, image)| {
            let mut masked = image.clone();
            masked.name = mask_name(&image.name);
            (*id, masked)
        })
        .collect()
}

fn mask_name(name: &str) -> String {
    // Record names always use `/`, whatever the host separator.
    let file_start = name.rfind('/').map_or(0, |i| i + 1);
    let stem_end = match name[file_start..].rfind('.') {
        Some(dot) if dot > 0 => file_start + dot,
        _ => name.len(),
    };
    format!("{}.png", &name[..stem_end])
}
