//! GPS interpolation for GPS-assisted matching.
//!
//! Vehicle bus signals carry a sparse latitude/longitude series; images
//! carry a capture timestamp. Each image position is linearly interpolated
//! between the two bus samples that bracket its timestamp. Images outside
//! the series, or whose bracket crosses a hemisphere change, get no
//! position: GPS only enriches the match list, so such records are skipped
//! rather than failing the run.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use recon_core::gps::{generate_image_gps, load_bus_signals};
//!
//! let track = load_bus_signals(Path::new("bus_signals.json")).unwrap();
//! let generation = generate_image_gps(&track, Path::new("meta_infos")).unwrap();
//! generation.artifact.write(Path::new("imgs_gps.json")).unwrap();
//! ```

mod interpolate;
mod signals;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use interpolate::{interpolate, nearest_bracket, GpsFix, GpsTrack, LatRef, LonRef};
pub use signals::{generate_image_gps, load_bus_signals, GpsGeneration, ImageGpsArtifact};

/// Errors from GPS loading and interpolation.
#[derive(Error, Debug)]
pub enum GpsError {
    /// The two bracketing fixes lie in different hemispheres.
    #[error("GPS reference flags differ between t={t1} and t={t2}")]
    ReferenceMismatch { t1: i64, t2: i64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl GpsError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}
