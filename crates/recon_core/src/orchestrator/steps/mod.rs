//! Pipeline step implementations.
//!
//! Each step handles one phase of the reconstruction.

mod extract;
mod gate;
mod map;
mod matching;
mod reorient;
mod undistort;

pub use extract::ExtractFeaturesStep;
pub use gate::UnrectifiedGateStep;
pub use map::MapStep;
pub use matching::MatchStep;
pub use reorient::ReorientStep;
pub use undistort::{UndistortImagesStep, UndistortMasksStep};
