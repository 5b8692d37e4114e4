use anyhow::{bail, Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use log::info;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::detector::DetectorConfig;
use crate::layer_creator::LayerCreatorConfig;
use crate::navigator::NavigatorConfig;
use crate::propagator::PropagatorOptions;
use crate::scan::ScanConfig;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn default_config_file_loads() {
        let settings = load_default_config().unwrap();
        assert!(settings.navigator.resolve_sensitive);
        assert_eq!(settings.navigator.on_surface_tolerance, 1e-4);
        assert_eq!(settings.detector.barrel.layer_radii.len(), 4);
        assert_eq!(settings.layer_creator, LayerCreatorConfig::default());
    }

    #[test]
    fn cli_overrides() {
        let mut settings = Settings::default();
        let args = CliArgs::try_parse_from([
            "tracknav", "-n", "25", "--seed", "3", "--eta-max", "2.0", "--passive", "--endcaps", "-d", "scan_out",
        ])
        .unwrap();
        apply_args(&mut settings, &args);
        assert_eq!(settings.scan.num_tracks, 25);
        assert_eq!(settings.scan.seed, Some(3));
        assert_eq!(settings.scan.eta_max, 2.0);
        assert!(settings.navigator.resolve_passive);
        assert!(settings.detector.endcap.enabled);
        assert_eq!(settings.directory, PathBuf::from("scan_out"));
        assert!(validate_config(&settings).is_ok());
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut settings = Settings::default();
        settings.scan.eta_min = 1.0;
        settings.scan.eta_max = -1.0;
        assert!(validate_config(&settings).is_err());

        let mut settings = Settings::default();
        settings.navigator.on_surface_tolerance = 0.0;
        assert!(validate_config(&settings).is_err());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub layer_creator: LayerCreatorConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub propagation: PropagatorOptions,
    #[serde(default)]
    pub scan: ScanConfig,
    /// Output directory.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_directory() -> PathBuf {
    PathBuf::from("tracknav_run")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            navigator: NavigatorConfig::default(),
            layer_creator: LayerCreatorConfig::default(),
            detector: DetectorConfig::default(),
            propagation: PropagatorOptions::default(),
            scan: ScanConfig::default(),
            directory: default_directory(),
        }
    }
}

fn read_config(file: &Path) -> Result<Settings> {
    let settings = Config::builder()
        .add_source(File::from(file).required(true))
        .add_source(
            Environment::with_prefix("tracknav")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("loading configuration from {}", file.display()))?;

    settings
        .try_deserialize()
        .with_context(|| format!("deserializing configuration from {}", file.display()))
}

/// Settings from `config/default.toml` only, without command-line overrides.
pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let config = read_config(&root.join("config/default.toml"))?;
    validate_config(&config)?;
    Ok(config)
}

/// Settings from `config/local.toml` (or `config/default.toml` when there is
/// no local file), then `TRACKNAV_*` environment variables, then the command line.
pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    let config_file = if local_config.exists() {
        info!("using local configuration: {:?}", local_config);
        local_config
    } else {
        info!("using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let mut config = read_config(&config_file)?;

    let args = CliArgs::parse();
    apply_args(&mut config, &args);

    validate_config(&config)?;

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the TRACKNAV_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("TRACKNAV_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("locating the current executable")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .context("could not find a project root directory containing config/")
}

fn validate_config(config: &Settings) -> Result<()> {
    if !(config.navigator.on_surface_tolerance > 0.0) {
        bail!(
            "on-surface tolerance must be positive, got {}",
            config.navigator.on_surface_tolerance
        );
    }
    config.scan.check()?;
    if config.propagation.max_steps == 0 {
        bail!("maximum number of steps must be at least 1");
    }
    if !(config.propagation.max_step_size > 0.0) {
        bail!(
            "maximum step size must be positive, got {}",
            config.propagation.max_step_size
        );
    }
    Ok(())
}

fn apply_args(config: &mut Settings, args: &CliArgs) {
    if let Some(n) = args.tracks {
        config.scan.num_tracks = n;
    }
    if let Some(eta) = args.eta_min {
        config.scan.eta_min = eta;
    }
    if let Some(eta) = args.eta_max {
        config.scan.eta_max = eta;
    }
    if args.seed.is_some() {
        config.scan.seed = args.seed;
    }
    if args.progress {
        config.scan.progress = true;
    }
    if let Some(tol) = args.tolerance {
        config.navigator.on_surface_tolerance = tol;
    }
    if args.passive {
        config.navigator.resolve_passive = true;
    }
    if args.no_sensitive {
        config.navigator.resolve_sensitive = false;
    }
    if args.no_material {
        config.navigator.resolve_material = false;
    }
    if let Some(steps) = args.max_steps {
        config.propagation.max_steps = steps;
    }
    if args.endcaps {
        config.detector.endcap.enabled = true;
    }
    if let Some(dir) = &args.dir {
        config.directory = dir.clone();
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "tracknav - navigate straight tracks through a tracking detector geometry")]
pub struct CliArgs {
    /// Number of tracks to scan.
    #[arg(short = 'n', long)]
    tracks: Option<usize>,

    /// Lower edge of the pseudorapidity range.
    #[arg(long, allow_negative_numbers = true)]
    eta_min: Option<f64>,

    /// Upper edge of the pseudorapidity range.
    #[arg(long, allow_negative_numbers = true)]
    eta_max: Option<f64>,

    /// Random seed for the track directions.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Show a progress bar while scanning.
    #[arg(long)]
    progress: bool,

    /// Distance (mm) within which a surface counts as reached.
    #[arg(long)]
    tolerance: Option<f64>,

    /// Also stop on passive surfaces.
    #[arg(long)]
    passive: bool,

    /// Do not stop on sensitive surfaces.
    #[arg(long)]
    no_sensitive: bool,

    /// Do not stop on material surfaces.
    #[arg(long)]
    no_material: bool,

    /// Maximum number of steps per track.
    #[arg(long)]
    max_steps: Option<usize>,

    /// Add the endcap discs to the detector.
    #[arg(long)]
    endcaps: bool,

    /// Directory for the output files.
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Resolve Sensitive/Material/Passive: {}/{}/{}
  - On-Surface Tolerance: {:e}
  - Barrel Layers: {:?}
  - Endcaps: {}
  - Max Steps: {}
  - Tracks: {}
  - Eta Range: [{:.3}, {:.3}]
  - Seed: {:?}
  - Output Directory: {}
  ",
            self.navigator.resolve_sensitive,
            self.navigator.resolve_material,
            self.navigator.resolve_passive,
            self.navigator.on_surface_tolerance,
            self.detector.barrel.layer_radii,
            self.detector.endcap.enabled,
            self.propagation.max_steps,
            self.scan.num_tracks,
            self.scan.eta_min,
            self.scan.eta_max,
            self.scan.seed,
            self.directory.display(),
        )
    }
}
