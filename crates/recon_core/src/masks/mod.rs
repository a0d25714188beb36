//! Ego-mask provisioning.
//!
//! Feature extraction reads one mask per image, named `<image>.png`, from a
//! tree that mirrors the image tree. The vehicle body is static per camera,
//! so every mask of a camera is a copy of the same library image
//! `<library>/<camera>.png`. The tree only lives for the duration of the
//! feature extraction stage; [`MaskTree`] removes it when torn down or
//! dropped.

mod provisioner;

pub use provisioner::{is_image_file, materialize, MaskError, MaskTree, ProvisionSummary};
