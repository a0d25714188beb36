//! Recon Core - SfM preprocessing and COLMAP reconstruction orchestration.
//!
//! This crate contains all run logic with no command-line dependencies.
//! It plans the project layout for a configuration, stamps ego masks,
//! interpolates per-image GPS, rewrites sparse models for mask
//! undistortion and drives the external engine stage by stage.

pub mod config;
pub mod gps;
pub mod layout;
pub mod logging;
pub mod masks;
pub mod model;
pub mod orchestrator;
pub mod runner;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
