//! Command lines for every external stage.
//!
//! Pure builders: each takes the configuration and layout and returns the
//! stage to run, with the paths it needs and the paths it must produce.
//! Engine verbs receive `--random_seed` except the mask undistortion pass.

use std::path::Path;

use crate::config::PipelineConfig;
use crate::layout::ProjectLayout;
use crate::runner::Stage;

/// Stage names, as they appear in logs and errors.
pub mod names {
    pub const FEATURE_EXTRACTOR: &str = "feature_extractor";
    pub const SEQUENTIAL_MATCHER: &str = "sequential_matcher";
    pub const CUSTOM_MATCHER: &str = "custom_matcher";
    pub const MATCHES_IMPORTER: &str = "matches_importer";
    pub const HIERARCHICAL_MAPPER: &str = "hierarchical_mapper";
    pub const SIMPLIFY_IMAGES: &str = "simplify_images";
    pub const MAPPER: &str = "mapper";
    pub const IMAGE_UNDISTORTER: &str = "image_undistorter";
    pub const MASK_UNDISTORTER: &str = "mask_undistorter";
    pub const MAKE_MASK_UINT8: &str = "make_mask_uint8";
    pub const AUTO_REORIENT: &str = "auto_reorient";
}

/// Engine verb with the shared seed argument.
fn colmap(config: &PipelineConfig, name: &str, verb: &str) -> Stage {
    Stage::new(name, &config.engine.colmap)
        .arg(verb)
        .opt("--random_seed", config.features.random_seed)
}

/// Python helper script.
fn script(config: &PipelineConfig, name: &str, script: &Path) -> Stage {
    Stage::new(name, &config.engine.python).arg(script.display().to_string())
}

/// Mapper tolerance rendered the way the engine expects it.
/// `f64` display never uses exponent notation.
fn tolerance(value: f64) -> String {
    value.to_string()
}

pub fn feature_extractor(
    config: &PipelineConfig,
    layout: &ProjectLayout,
    mask_dir: Option<&Path>,
) -> Stage {
    let images_dir = config.images_dir();
    let features = &config.features;

    let mut stage = colmap(config, names::FEATURE_EXTRACTOR, "feature_extractor")
        .path_opt("--database_path", &layout.database_path)
        .path_opt("--image_path", &images_dir)
        .requires(&images_dir)
        .produces(&layout.database_path);

    if let Some(mask_dir) = mask_dir {
        stage = stage
            .path_opt("--ImageReader.mask_path", mask_dir)
            .requires(mask_dir);
    }

    stage = stage
        .opt(
            "--ImageReader.default_focal_length_factor",
            features.default_focal_length_factor,
        )
        .opt("--ImageReader.camera_model", &features.camera_model);

    if features.single_camera {
        stage.opt("--ImageReader.single_camera", 1)
    } else {
        stage.opt("--ImageReader.single_camera_per_folder", 1)
    }
}

pub fn sequential_matcher(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    let stage = colmap(config, names::SEQUENTIAL_MATCHER, "sequential_matcher")
        .path_opt("--database_path", &layout.database_path)
        .requires(&layout.database_path);

    match (config.matching.loop_detection, &config.matching.vocab_tree_path) {
        (true, Some(vocab_tree)) => stage
            .opt("--SequentialMatching.loop_detection", 1)
            .path_opt("--SequentialMatching.vocab_tree_path", vocab_tree)
            .requires(vocab_tree),
        _ => stage,
    }
}

/// Match list generator; `gps_path` is passed only when an artifact exists.
pub fn custom_matcher(
    config: &PipelineConfig,
    layout: &ProjectLayout,
    gps_path: Option<&Path>,
) -> Stage {
    let images_dir = config.images_dir();
    let mut stage = script(
        config,
        names::CUSTOM_MATCHER,
        &config.engine.custom_matcher_script,
    )
    .path_opt("--image_path", &images_dir)
    .path_opt("--output_path", &layout.match_list_path)
    .requires(&images_dir)
    .produces(&layout.match_list_path);

    if config.matching.use_gps {
        stage = stage.arg("--use_gps");
        if let Some(gps_path) = gps_path {
            stage = stage.path_opt("--gps_path", gps_path).requires(gps_path);
        }
    }
    stage
}

pub fn matches_importer(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    colmap(config, names::MATCHES_IMPORTER, "matches_importer")
        .path_opt("--database_path", &layout.database_path)
        .path_opt("--match_list_path", &layout.match_list_path)
        .requires(&layout.database_path)
        .requires(&layout.match_list_path)
}

pub fn hierarchical_mapper(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    let mapper = &config.mapper;
    colmap(config, names::HIERARCHICAL_MAPPER, "hierarchical_mapper")
        .path_opt("--database_path", &layout.database_path)
        .path_opt("--image_path", &config.images_dir())
        .path_opt("--output_path", &layout.sparse_dir)
        .opt("--image_overlap", mapper.image_overlap)
        .opt("--leaf_max_num_images", mapper.leaf_max_num_images)
        .opt(
            "--Mapper.ba_global_function_tolerance",
            tolerance(mapper.ba_global_function_tolerance),
        )
        .opt("--Mapper.max_model_overlap", mapper.max_model_overlap)
        .opt("--Mapper.init_num_trials", mapper.init_num_trials)
        .requires(&layout.database_path)
        .produces(&layout.sparse_model_dir)
}

pub fn simplify_images(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    script(
        config,
        names::SIMPLIFY_IMAGES,
        &config.engine.simplify_images_script,
    )
    .path_opt("--base_dir", &layout.sparse_model_dir)
    .requires(&layout.sparse_model_dir)
}

pub fn mapper(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    colmap(config, names::MAPPER, "mapper")
        .path_opt("--database_path", &layout.database_path)
        .path_opt("--image_path", &config.images_dir())
        .path_opt("--output_path", &layout.sparse_dir)
        .opt(
            "--Mapper.ba_global_function_tolerance",
            tolerance(config.mapper.ba_global_function_tolerance),
        )
        .requires(&layout.database_path)
        .produces(&layout.sparse_model_dir)
}

pub fn image_undistorter(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    colmap(config, names::IMAGE_UNDISTORTER, "image_undistorter")
        .path_opt("--image_path", &config.images_dir())
        .path_opt("--input_path", &layout.sparse_model_dir)
        .path_opt("--output_path", &layout.rectified_dir)
        .opt("--output_type", "COLMAP")
        .opt("--max_image_size", config.undistort.max_image_size)
        .requires(&layout.sparse_model_dir)
        .produces(&layout.rectified_sparse_dir)
}

/// Undistorts masks through the mask-named copy of the model.
pub fn mask_undistorter(
    config: &PipelineConfig,
    layout: &ProjectLayout,
    masks_dir: &Path,
) -> Stage {
    Stage::new(names::MASK_UNDISTORTER, &config.engine.colmap)
        .arg("image_undistorter")
        .path_opt("--image_path", masks_dir)
        .path_opt("--input_path", &layout.mask_model_dir)
        .path_opt("--output_path", &layout.undistort_tmp_dir)
        .opt("--output_type", "COLMAP")
        .opt("--max_image_size", config.undistort.max_image_size)
        .requires(masks_dir)
        .requires(&layout.mask_model_dir)
        .produces(layout.undistort_tmp_dir.join("images"))
}

pub fn make_mask_uint8(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    let undistorted = layout.undistort_tmp_dir.join("images");
    script(
        config,
        names::MAKE_MASK_UINT8,
        &config.engine.make_mask_uint8_script,
    )
    .path_opt("--in_dir", &undistorted)
    .path_opt("--out_dir", &layout.rectified_masks_dir)
    .requires(undistorted)
    .produces(&layout.rectified_masks_dir)
}

pub fn auto_reorient(config: &PipelineConfig, layout: &ProjectLayout) -> Stage {
    script(
        config,
        names::AUTO_REORIENT,
        &config.engine.auto_reorient_script,
    )
    .path_opt("--input_path", &layout.rectified_sparse_dir)
    .path_opt("--output_path", &layout.aligned_sparse_dir)
    .requires(&layout.rectified_sparse_dir)
    .produces(&layout.aligned_sparse_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::plan;
    use std::path::PathBuf;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::for_project("/data/run");
        config.paths.images_dir = Some(PathBuf::from("/data/run/inputs/images"));
        config.mapper.hierarchical = false;
        config
    }

    #[test]
    fn extractor_per_folder_cameras_without_masks() {
        let config = config();
        let layout = plan(&config);
        let stage = feature_extractor(&config, &layout, None);

        assert_eq!(stage.args()[0], "feature_extractor");
        assert_eq!(stage.arg_value("--random_seed"), Some("0"));
        assert_eq!(
            stage.arg_value("--database_path"),
            Some("/data/run_wo-hier/camera_calibration/unrectified/database.db")
        );
        assert_eq!(stage.arg_value("--ImageReader.camera_model"), Some("PINHOLE"));
        assert_eq!(
            stage.arg_value("--ImageReader.default_focal_length_factor"),
            Some("0.5")
        );
        assert_eq!(
            stage.arg_value("--ImageReader.single_camera_per_folder"),
            Some("1")
        );
        assert!(!stage.has_arg("--ImageReader.mask_path"));
        assert!(!stage.has_arg("--ImageReader.single_camera"));
    }

    #[test]
    fn extractor_single_camera_with_masks() {
        let mut config = config();
        config.features.single_camera = true;
        let layout = plan(&config);
        let stage = feature_extractor(&config, &layout, Some(&layout.ego_mask_dir));

        assert_eq!(stage.arg_value("--ImageReader.single_camera"), Some("1"));
        assert_eq!(
            stage.arg_value("--ImageReader.mask_path"),
            Some(layout.ego_mask_dir.to_str().unwrap())
        );
        assert!(stage.required_paths().contains(&layout.ego_mask_dir));
    }

    #[test]
    fn sequential_loop_needs_vocab_tree() {
        let mut config = config();
        config.matching.sequential = true;
        config.matching.vocab_tree_path = Some(PathBuf::from("/vocab/tree.bin"));
        let layout = plan(&config);

        let stage = sequential_matcher(&config, &layout);
        assert_eq!(stage.arg_value("--SequentialMatching.loop_detection"), Some("1"));
        assert_eq!(
            stage.arg_value("--SequentialMatching.vocab_tree_path"),
            Some("/vocab/tree.bin")
        );

        config.matching.loop_detection = false;
        let stage = sequential_matcher(&config, &layout);
        assert!(!stage.has_arg("--SequentialMatching.loop_detection"));
    }

    #[test]
    fn custom_matcher_gps_flags() {
        let mut config = config();
        let layout = plan(&config);

        let stage = custom_matcher(&config, &layout, None);
        assert_eq!(stage.program(), config.engine.python);
        assert!(!stage.has_arg("--use_gps"));
        assert_eq!(
            stage.arg_value("--output_path"),
            Some("/data/run_wo-hier/camera_calibration/unrectified/matching.txt")
        );

        config.matching.use_gps = true;
        let stage = custom_matcher(&config, &layout, None);
        assert!(stage.has_arg("--use_gps"));
        assert!(!stage.has_arg("--gps_path"));

        let stage = custom_matcher(&config, &layout, Some(&layout.gps_path));
        assert_eq!(
            stage.arg_value("--gps_path"),
            Some(layout.gps_path.to_str().unwrap())
        );
    }

    #[test]
    fn hierarchical_mapper_parameters() {
        let mut config = config();
        config.mapper.hierarchical = true;
        let layout = plan(&config);
        let stage = hierarchical_mapper(&config, &layout);

        assert_eq!(stage.arg_value("--image_overlap"), Some("50"));
        assert_eq!(stage.arg_value("--leaf_max_num_images"), Some("500"));
        assert_eq!(stage.arg_value("--Mapper.max_model_overlap"), Some("20"));
        assert_eq!(stage.arg_value("--Mapper.init_num_trials"), Some("200"));
        assert_eq!(
            stage.arg_value("--Mapper.ba_global_function_tolerance"),
            Some("0.000001")
        );
        assert_eq!(stage.produced_paths(), [layout.sparse_model_dir.clone()]);

        let simplify = simplify_images(&config, &layout);
        assert_eq!(
            simplify.arg_value("--base_dir"),
            Some(layout.sparse_model_dir.to_str().unwrap())
        );
    }

    #[test]
    fn undistortion_passes() {
        let config = config();
        let layout = plan(&config);

        let images = image_undistorter(&config, &layout);
        assert_eq!(images.arg_value("--output_type"), Some("COLMAP"));
        assert_eq!(images.arg_value("--max_image_size"), Some("2048"));
        assert!(images.has_arg("--random_seed"));

        let masks = mask_undistorter(&config, &layout, Path::new("/data/run/inputs/masks"));
        assert_eq!(masks.args()[0], "image_undistorter");
        assert!(!masks.has_arg("--random_seed"));
        assert_eq!(
            masks.arg_value("--input_path"),
            Some(layout.mask_model_dir.to_str().unwrap())
        );
    }

    #[test]
    fn tolerance_rendering() {
        assert_eq!(tolerance(1e-6), "0.000001");
        assert_eq!(tolerance(0.5), "0.5");
        assert_eq!(tolerance(1.0), "1");
        assert_eq!(tolerance(1e-13), "0.0000000000001");
    }
}
