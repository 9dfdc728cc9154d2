use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectorKind;

const DEFAULT_INPUT_BASE_DIR: &str = "output/image";
const DEFAULT_MAP: &str = "Town01_Opt";
const DEFAULT_CAMERAS: [&str; 3] = ["front", "left_1", "right_1"];
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_MODEL_DIR: &str = "models";
const DEFAULT_SIM_HOST: &str = "localhost";
const DEFAULT_SIM_PORT: u16 = 2000;
const DEFAULT_SIM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FIXED_DELTA_SECONDS: f64 = 0.05;
const DEFAULT_CAR_RATIO: f64 = 0.3;
const DEFAULT_NUM_WALKERS: usize = 30;

pub const ENV_CONFIG: &str = "CARLA_PERCEPTION_CONFIG";
pub const ENV_INPUT_DIR: &str = "CARLA_PERCEPTION_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "CARLA_PERCEPTION_OUTPUT_DIR";
pub const ENV_MAP: &str = "CARLA_PERCEPTION_MAP";
pub const ENV_CAMERAS: &str = "CARLA_PERCEPTION_CAMERAS";
pub const ENV_DETECTOR: &str = "CARLA_PERCEPTION_DETECTOR";
pub const ENV_THRESHOLD: &str = "CARLA_PERCEPTION_THRESHOLD";
pub const ENV_MODEL_PATH: &str = "CARLA_PERCEPTION_MODEL_PATH";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PerceptionConfigFile {
    input_base_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    map: Option<String>,
    cameras: Option<Vec<String>>,
    detector: Option<DetectorConfigFile>,
    simulation: Option<SimulationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    kind: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SimulationConfigFile {
    host: Option<String>,
    port: Option<u16>,
    timeout_secs: Option<u64>,
    synchronous_mode: Option<bool>,
    fixed_delta_seconds: Option<f64>,
    car_ratio: Option<f64>,
    num_walkers: Option<usize>,
}

/// Everything a run needs: where saved images live, which cameras of which
/// map to process, which detector to use and how to drive the simulator.
#[derive(Debug, Clone)]
pub struct PerceptionConfig {
    pub input_base_dir: PathBuf,
    /// Root for detector results; defaults to `input_base_dir`.
    pub output_dir: PathBuf,
    pub map: String,
    pub cameras: Vec<String>,
    pub detector: DetectorSettings,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub model_path: Option<PathBuf>,
    pub input_width: Option<u32>,
    pub input_height: Option<u32>,
    pub confidence_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            model_path: None,
            input_width: None,
            input_height: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl DetectorSettings {
    /// Configured model path, or `models/<default file>` for the variant.
    pub fn resolved_model_path(&self) -> PathBuf {
        match (&self.model_path, self.kind.default_model_file()) {
            (Some(path), _) => path.clone(),
            (None, Some(file)) => Path::new(DEFAULT_MODEL_DIR).join(file),
            (None, None) => PathBuf::new(),
        }
    }

    pub fn resolved_input_size(&self) -> (u32, u32) {
        let (default_w, default_h) = self.kind.default_input_size().unwrap_or((640, 640));
        (
            self.input_width.unwrap_or(default_w),
            self.input_height.unwrap_or(default_h),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub synchronous_mode: bool,
    pub fixed_delta_seconds: f64,
    pub car_ratio: f64,
    pub num_walkers: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SIM_HOST.to_string(),
            port: DEFAULT_SIM_PORT,
            timeout: Duration::from_secs(DEFAULT_SIM_TIMEOUT_SECS),
            synchronous_mode: true,
            fixed_delta_seconds: DEFAULT_FIXED_DELTA_SECONDS,
            car_ratio: DEFAULT_CAR_RATIO,
            num_walkers: DEFAULT_NUM_WALKERS,
        }
    }
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            input_base_dir: PathBuf::from(DEFAULT_INPUT_BASE_DIR),
            output_dir: PathBuf::from(DEFAULT_INPUT_BASE_DIR),
            map: DEFAULT_MAP.to_string(),
            cameras: DEFAULT_CAMERAS.iter().map(|c| c.to_string()).collect(),
            detector: DetectorSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl PerceptionConfig {
    /// Load from `path` (or `CARLA_PERCEPTION_CONFIG`), then apply environment
    /// overrides. Callers apply CLI overrides and then call `validate`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);
        let config_path = path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// `load` followed by `validate`.
    pub fn load_validated(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::load(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PerceptionConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let input_base_dir = file.input_base_dir.unwrap_or(defaults.input_base_dir);
        let output_dir = file.output_dir.unwrap_or_else(|| input_base_dir.clone());
        let map = file.map.unwrap_or(defaults.map);
        let cameras = file.cameras.unwrap_or(defaults.cameras);

        let detector_file = file.detector.unwrap_or_default();
        let kind = match detector_file.kind.as_deref() {
            Some(kind) => kind.parse()?,
            None => DetectorKind::default(),
        };
        let detector = DetectorSettings {
            kind,
            model_path: detector_file.model_path,
            input_width: detector_file.input_width,
            input_height: detector_file.input_height,
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        };

        let sim_file = file.simulation.unwrap_or_default();
        let sim_defaults = defaults.simulation;
        let simulation = SimulationSettings {
            host: sim_file.host.unwrap_or(sim_defaults.host),
            port: sim_file.port.unwrap_or(sim_defaults.port),
            timeout: sim_file
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(sim_defaults.timeout),
            synchronous_mode: sim_file
                .synchronous_mode
                .unwrap_or(sim_defaults.synchronous_mode),
            fixed_delta_seconds: sim_file
                .fixed_delta_seconds
                .unwrap_or(sim_defaults.fixed_delta_seconds),
            car_ratio: sim_file.car_ratio.unwrap_or(sim_defaults.car_ratio),
            num_walkers: sim_file.num_walkers.unwrap_or(sim_defaults.num_walkers),
        };

        Ok(Self {
            input_base_dir,
            output_dir,
            map,
            cameras,
            detector,
            simulation,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env(ENV_INPUT_DIR) {
            // Results follow the input tree unless pinned separately.
            if self.output_dir == self.input_base_dir {
                self.output_dir = PathBuf::from(&dir);
            }
            self.input_base_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(map) = non_empty_env(ENV_MAP) {
            self.map = map;
        }
        if let Some(cameras) = non_empty_env(ENV_CAMERAS) {
            let parsed = split_csv(&cameras);
            if !parsed.is_empty() {
                self.cameras = parsed;
            }
        }
        if let Some(kind) = non_empty_env(ENV_DETECTOR) {
            self.detector.kind = kind.parse()?;
        }
        if let Some(threshold) = non_empty_env(ENV_THRESHOLD) {
            self.detector.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("{} must be a number between 0 and 1", ENV_THRESHOLD))?;
        }
        if let Some(path) = non_empty_env(ENV_MODEL_PATH) {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let threshold = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if self.map.trim().is_empty() {
            return Err(anyhow!("map name must not be empty"));
        }
        validate_path_component("map", &self.map)?;
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one camera must be configured"));
        }
        for camera in &self.cameras {
            validate_path_component("camera role name", camera)?;
        }
        let mut seen = std::collections::HashSet::new();
        self.cameras.retain(|camera| seen.insert(camera.clone()));

        if let (Some(0), _) | (_, Some(0)) = (self.detector.input_width, self.detector.input_height)
        {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let sim = &self.simulation;
        if !(sim.fixed_delta_seconds.is_finite() && sim.fixed_delta_seconds > 0.0) {
            return Err(anyhow!("fixed_delta_seconds must be a finite number greater than zero"));
        }
        if !(0.0..=1.0).contains(&sim.car_ratio) {
            return Err(anyhow!("car_ratio must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Role names and map names become directory names.
pub fn validate_path_component(what: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !value.trim().is_empty() => Ok(()),
        _ => Err(anyhow!(
            "{} '{}' must be a single directory name",
            what,
            value
        )),
    }
}

fn read_config_file(path: &Path) -> Result<PerceptionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_run() {
        let mut cfg = PerceptionConfig::from_file(PerceptionConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.map, "Town01_Opt");
        assert_eq!(cfg.cameras, vec!["front", "left_1", "right_1"]);
        assert_eq!(cfg.detector.kind, DetectorKind::Yolov8n);
        assert_eq!(cfg.detector.confidence_threshold, 0.5);
        assert_eq!(cfg.output_dir, cfg.input_base_dir);
        assert_eq!(cfg.simulation.port, 2000);
    }

    #[test]
    fn resolves_model_defaults_per_variant() {
        let settings = DetectorSettings {
            kind: DetectorKind::Ssd,
            ..DetectorSettings::default()
        };
        assert_eq!(settings.resolved_model_path(), Path::new("models/ssd-10.onnx"));
        assert_eq!(settings.resolved_input_size(), (1200, 1200));

        let settings = DetectorSettings {
            kind: DetectorKind::FasterRcnn,
            input_height: Some(608),
            ..DetectorSettings::default()
        };
        assert_eq!(settings.resolved_input_size(), (1088, 608));
    }

    #[test]
    fn rejects_nested_role_names_and_bad_thresholds() {
        let mut cfg = PerceptionConfig {
            cameras: vec!["front/../../etc".to_string()],
            ..PerceptionConfig::default()
        };
        assert!(cfg.validate().is_err());

        let mut cfg = PerceptionConfig::default();
        cfg.detector.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PerceptionConfig {
            cameras: Vec::new(),
            ..PerceptionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_or_non_positive_fixed_delta() {
        for delta in [0.0, -0.05, f64::NAN, f64::INFINITY] {
            let mut cfg = PerceptionConfig::default();
            cfg.simulation.fixed_delta_seconds = delta;
            assert!(cfg.validate().is_err(), "fixed delta {delta} accepted");
        }
        let mut cfg = PerceptionConfig::default();
        cfg.simulation.fixed_delta_seconds = 0.1;
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_dedups_cameras_in_order() {
        let mut cfg = PerceptionConfig {
            cameras: vec!["front".into(), "left_1".into(), "front".into()],
            ..PerceptionConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.cameras, vec!["front", "left_1"]);
    }

    #[test]
    fn split_csv_drops_blanks() {
        assert_eq!(split_csv(" front, ,left_1,"), vec!["front", "left_1"]);
    }
}
