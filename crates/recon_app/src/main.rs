//! recon-prep - SfM preprocessing and COLMAP reconstruction.
//!
//! Usage:
//!   recon-prep run --project-dir /data/drive --mask-library /data/ego_masks
//!   recon-prep gps --bus-signals bus.json --images-meta meta/ --output imgs_gps.json
//!   recon-prep init-config --output recon.toml

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};

use recon_core::config::{ConfigManager, PipelineConfig};
use recon_core::gps::{generate_image_gps, load_bus_signals};
use recon_core::logging::{init_tracing, LogLevel};
use recon_core::orchestrator::{Orchestrator, RunOutcome, RunReport};

/// SfM preprocessing and COLMAP reconstruction pipeline.
#[derive(Debug, Parser)]
#[command(author, version, about = "SfM preprocessing and COLMAP reconstruction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the reconstruction for one project.
    Run(RunArgs),
    /// Interpolate per-image GPS from vehicle bus signals.
    Gps(GpsArgs),
    /// Write a commented default configuration file.
    InitConfig(InitConfigArgs),
}

/// Flags override values loaded from `--config`.
#[derive(Debug, Args)]
struct RunArgs {
    /// TOML configuration file to start from.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project directory; the run writes into a sibling derived from it.
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Image tree, one folder per camera. Defaults to <project_dir>/inputs/images.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Masks to undistort with the images. Defaults to <project_dir>/inputs/masks if present.
    #[arg(long)]
    masks_dir: Option<PathBuf>,

    /// Directory for the run log. Defaults to <root>/logs.
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Random seed for the engine.
    #[arg(long)]
    random_seed: Option<u64>,

    /// Image overlap between hierarchical mapper leaves.
    #[arg(long)]
    image_overlap: Option<u32>,

    /// Maximum number of images in a hierarchical mapper leaf.
    #[arg(long)]
    leaf_max_num_images: Option<u32>,

    /// Maximum overlap between hierarchical mapper models.
    #[arg(long)]
    max_model_overlap: Option<u32>,

    /// Trials for the initial image pair.
    #[arg(long)]
    init_num_trials: Option<u32>,

    /// Use the flat incremental mapper.
    #[arg(long)]
    not_use_hierarchical: bool,

    /// One camera model for all images instead of one per folder.
    #[arg(long)]
    single_camera: bool,

    /// Use the sequential matcher instead of a generated match list.
    #[arg(long)]
    use_seq_matcher: bool,

    /// Disable loop detection in the sequential matcher.
    #[arg(long)]
    not_use_loop: bool,

    /// Vocabulary tree for sequential loop detection.
    #[arg(long)]
    vocab_tree_path: Option<PathBuf>,

    /// Use GPS to form matching image pairs.
    #[arg(long)]
    use_gps: bool,

    /// Vehicle bus-signal JSON for GPS interpolation.
    #[arg(long)]
    bus_signals: Option<PathBuf>,

    /// Per-camera image metadata for GPS interpolation.
    #[arg(long)]
    images_meta: Option<PathBuf>,

    /// Continue past the unrectified model: undistort and reorient.
    #[arg(long)]
    not_only_unrectified: bool,

    /// Do not stamp ego masks during feature extraction.
    #[arg(long)]
    not_use_ego_masks: bool,

    /// Folder of per-camera ego masks (<camera>.png).
    #[arg(long)]
    mask_library: Option<PathBuf>,

    /// Engine executable.
    #[arg(long)]
    colmap: Option<String>,

    /// Interpreter for the helper scripts.
    #[arg(long)]
    python: Option<String>,

    /// Log debug messages and raw tool output.
    #[arg(long, short)]
    verbose: bool,

    /// Print the final run state as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct GpsArgs {
    /// Vehicle bus-signal JSON.
    #[arg(long)]
    bus_signals: PathBuf,

    /// Per-camera image metadata directory.
    #[arg(long)]
    images_meta: PathBuf,

    /// Output artifact path.
    #[arg(long)]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// File to write.
    #[arg(long, default_value = "recon.toml")]
    output: PathBuf,

    /// Project directory to record in the file.
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

impl RunArgs {
    /// Build the effective configuration: file values, then flags.
    fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => PipelineConfig::default(),
        };
        self.apply(&mut config);

        if config.paths.project_dir.as_os_str().is_empty() {
            bail!("--project-dir is required (or set paths.project_dir in the config file)");
        }
        Ok(config)
    }

    fn apply(&self, config: &mut PipelineConfig) {
        let paths = &mut config.paths;
        set_if(&mut paths.project_dir, &self.project_dir);
        set_opt(&mut paths.images_dir, &self.images_dir);
        set_opt(&mut paths.masks_dir, &self.masks_dir);
        set_opt(&mut paths.logs_dir, &self.logs_dir);

        set_if(&mut config.features.random_seed, &self.random_seed);
        if self.single_camera {
            config.features.single_camera = true;
        }

        let mapper = &mut config.mapper;
        set_if(&mut mapper.image_overlap, &self.image_overlap);
        set_if(&mut mapper.leaf_max_num_images, &self.leaf_max_num_images);
        set_if(&mut mapper.max_model_overlap, &self.max_model_overlap);
        set_if(&mut mapper.init_num_trials, &self.init_num_trials);
        if self.not_use_hierarchical {
            mapper.hierarchical = false;
        }

        let matching = &mut config.matching;
        if self.use_seq_matcher {
            matching.sequential = true;
        }
        if self.not_use_loop {
            matching.loop_detection = false;
        }
        if self.use_gps {
            matching.use_gps = true;
        }
        set_opt(&mut matching.vocab_tree_path, &self.vocab_tree_path);

        set_opt(&mut config.gps.bus_signal_path, &self.bus_signals);
        set_opt(&mut config.gps.images_meta_path, &self.images_meta);

        if self.not_only_unrectified {
            config.undistort.rectify = true;
        }

        if self.not_use_ego_masks {
            config.masks.ego_masks = false;
        }
        set_opt(&mut config.masks.mask_library, &self.mask_library);

        set_if(&mut config.engine.colmap, &self.colmap);
        set_if(&mut config.engine.python, &self.python);

        if self.verbose {
            config.logging.level = LogLevel::Debug;
            config.logging.compact = false;
        }
    }
}

fn set_if<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *target = value.clone();
    }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
    let mut manager = ConfigManager::new(path);
    manager
        .load()
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(manager.into_config())
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(&args),
        Command::Gps(args) => gps(&args),
        Command::InitConfig(args) => init_config(&args),
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let config = args.to_config()?;
    init_tracing(config.logging.level);

    // Progress goes to stderr; stdout carries only the result.
    let report = Orchestrator::new(config)
        .with_log_callback(Box::new(|line| eprintln!("{}", line)))
        .run()?;

    println!("{}", render_report(&report, args.json)?);
    Ok(())
}

fn render_report(report: &RunReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(&report.state)?);
    }
    let what = match report.outcome {
        RunOutcome::Completed => "Reconstruction",
        RunOutcome::StoppedAfterUnrectified => "Unrectified reconstruction",
    };
    Ok(format!(
        "{} done in {:.2} minutes: {}",
        what,
        report.elapsed_minutes(),
        report.layout.root.display()
    ))
}

fn gps(args: &GpsArgs) -> Result<()> {
    init_tracing(LogLevel::Info);

    let track = load_bus_signals(&args.bus_signals)?;
    let generation = generate_image_gps(&track, &args.images_meta)?;
    generation.artifact.write(&args.output)?;

    if !generation.skipped.is_empty() {
        tracing::warn!("{} images had no GPS position", generation.skipped.len());
    }
    println!(
        "Wrote GPS for {} images to {}",
        generation.artifact.data.len(),
        args.output.display()
    );
    Ok(())
}

fn init_config(args: &InitConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }

    let mut manager = ConfigManager::new(&args.output);
    if let Some(ref project_dir) = args.project_dir {
        manager.config_mut().paths.project_dir = project_dir.clone();
    }
    manager
        .save()
        .with_context(|| format!("writing {}", args.output.display()))?;

    println!("Wrote {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_core::layout::plan;
    use recon_core::orchestrator::RunState;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Run(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn flags_select_pipeline_branches() {
        let args = parse(&[
            "recon-prep",
            "run",
            "--project-dir",
            "/data/drive",
            "--not-use-hierarchical",
            "--use-seq-matcher",
            "--not-use-loop",
            "--not-only-unrectified",
            "--not-use-ego-masks",
            "--random-seed",
            "7",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.paths.project_dir, PathBuf::from("/data/drive"));
        assert!(!config.mapper.hierarchical);
        assert!(config.matching.sequential);
        assert!(!config.matching.loop_detection);
        assert!(config.undistort.rectify);
        assert!(!config.masks.ego_masks);
        assert_eq!(config.features.random_seed, 7);
    }

    #[test]
    fn defaults_match_library_defaults() {
        let config = parse(&["recon-prep", "run", "--project-dir", "p"])
            .to_config()
            .unwrap();
        assert_eq!(config, PipelineConfig::for_project("p"));
    }

    #[test]
    fn project_dir_required() {
        let err = parse(&["recon-prep", "run"]).to_config().unwrap_err();
        assert!(err.to_string().contains("--project-dir"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recon.toml");

        let mut manager = ConfigManager::new(&path);
        manager.config_mut().paths.project_dir = PathBuf::from("/from/file");
        manager.config_mut().mapper.image_overlap = 30;
        manager.config_mut().mapper.leaf_max_num_images = 250;
        manager.save().unwrap();

        let args = parse(&[
            "recon-prep",
            "run",
            "--config",
            path.to_str().unwrap(),
            "--image-overlap",
            "80",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.paths.project_dir, PathBuf::from("/from/file"));
        assert_eq!(config.mapper.image_overlap, 80);
        assert_eq!(config.mapper.leaf_max_num_images, 250);
    }

    fn sample_report() -> RunReport {
        let config = PipelineConfig::for_project("/data/drive");
        let mut state = RunState::new("drive");
        state.stages_run.push("feature_extractor".to_string());
        RunReport {
            outcome: RunOutcome::StoppedAfterUnrectified,
            layout: plan(&config),
            state,
            steps_completed: vec!["ExtractFeatures".to_string()],
            steps_skipped: Vec::new(),
            elapsed: Duration::from_secs(90),
        }
    }

    #[test]
    fn json_report_is_only_the_run_state() {
        let report = sample_report();
        let rendered = render_report(&report, true).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["run_id"], "drive");
        assert_eq!(parsed["stages_run"][0], "feature_extractor");
    }

    #[test]
    fn text_report_names_outcome_and_root() {
        let report = sample_report();
        let rendered = render_report(&report, false).unwrap();

        assert!(rendered.starts_with("Unrectified reconstruction done in 1.50 minutes"));
        assert!(rendered.ends_with(&report.layout.root.display().to_string()));
    }

    #[test]
    fn init_config_refuses_overwrite() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("recon.toml");
        fs::write(&output, "# mine").unwrap();

        let args = InitConfigArgs {
            output: output.clone(),
            project_dir: None,
            force: false,
        };
        assert!(init_config(&args).is_err());
        assert_eq!(fs::read_to_string(&output).unwrap(), "# mine");

        let args = InitConfigArgs {
            force: true,
            ..args
        };
        init_config(&args).unwrap();
        assert!(load_config(&output).is_ok());
    }
}
