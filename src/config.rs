use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::detect::DevicePreference;
use crate::fps::FpsTiming;
use crate::input_size::{InputSize, SizeWarning};

const DEFAULT_MODEL_PATH: &str = "yolo11n.onnx";
const DEFAULT_CAMERA: &str = "0";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_STOP_KEY: char = 'q';
const DEFAULT_WINDOW_TITLE: &str = "Real-time Object Detection";

pub const CONFIG_ENV: &str = "LIVE_DETECT_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct RunConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    inference: Option<InferenceConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    labels: Option<PathBuf>,
    backend: Option<String>,
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    input_size: Option<i64>,
    confidence: Option<f32>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    fps_timing: Option<String>,
    stop_key: Option<String>,
    window_title: Option<String>,
}

/// Which detector implementation to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Model-free detector that boxes bright regions. For tests and demos.
    Stub,
    /// ONNX model executed with tract.
    #[default]
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown backend '{}'; expected stub or tract",
                other
            )),
        }
    }
}

/// Values supplied on the command line. They take precedence over the config
/// file and the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub camera: Option<String>,
    pub input_size: Option<i64>,
    pub confidence: Option<f32>,
    pub device: Option<DevicePreference>,
    pub fps_timing: Option<FpsTiming>,
    pub stop_key: Option<char>,
    pub window_title: Option<String>,
    pub verbose: bool,
}

/// Run parameters, fixed once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub backend: BackendKind,
    pub camera: String,
    pub input_size: InputSize,
    /// False when the input size is the built-in default rather than configured.
    pub input_size_explicit: bool,
    pub confidence: f32,
    pub device: DevicePreference,
    pub fps_timing: FpsTiming,
    pub stop_key: char,
    pub window_title: String,
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            labels_path: None,
            backend: BackendKind::default(),
            camera: DEFAULT_CAMERA.to_string(),
            input_size: InputSize::default(),
            input_size_explicit: false,
            confidence: DEFAULT_CONFIDENCE,
            device: DevicePreference::default(),
            fps_timing: FpsTiming::default(),
            stop_key: DEFAULT_STOP_KEY,
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Loads defaults, then the config file (`--config` or `LIVE_DETECT_CONFIG`),
    /// then `LIVE_DETECT_*` variables, then CLI overrides. Size corrections are
    /// logged as warnings.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let config_path = overrides
            .config_path
            .clone()
            .or_else(|| env_value(CONFIG_ENV).map(PathBuf::from));
        let (cfg, warnings) = Self::resolve(config_path.as_deref(), overrides)?;
        for warning in warnings {
            log::warn!("{}", warning);
        }
        Ok(cfg)
    }

    /// Like [`RunConfig::load`] but with an explicit file and the size
    /// corrections returned instead of logged.
    pub fn resolve(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<(Self, Vec<SizeWarning>)> {
        let file_cfg = match file {
            Some(path) => read_config_file(path)?,
            None => RunConfigFile::default(),
        };
        let mut draft = Draft::from_file(file_cfg)?;
        draft.apply_env()?;
        draft.apply_overrides(overrides);
        draft.validate()
    }

    /// Copy with a different input size, used when the size is picked
    /// interactively after the rest of the config is known.
    pub fn with_input_size(self, input_size: InputSize) -> Self {
        Self {
            input_size,
            input_size_explicit: true,
            ..self
        }
    }
}

/// Config values before validation; the input size is still raw user input.
struct Draft {
    cfg: RunConfig,
    input_size: Option<i64>,
}

impl Draft {
    fn from_file(file: RunConfigFile) -> Result<Self> {
        let mut cfg = RunConfig::default();
        if let Some(model) = file.model {
            if let Some(path) = model.path {
                cfg.model_path = path;
            }
            cfg.labels_path = model.labels;
            if let Some(backend) = model.backend {
                cfg.backend = backend.parse()?;
            }
            if let Some(device) = model.device {
                cfg.device = device.parse()?;
            }
        }
        if let Some(source) = file.camera.and_then(|camera| camera.source) {
            cfg.camera = source;
        }
        let inference = file.inference.unwrap_or_default();
        if let Some(confidence) = inference.confidence {
            cfg.confidence = confidence;
        }
        cfg.verbose = inference.verbose.unwrap_or(false);
        if let Some(display) = file.display {
            if let Some(timing) = display.fps_timing {
                cfg.fps_timing = timing.parse()?;
            }
            if let Some(key) = display.stop_key {
                cfg.stop_key = parse_stop_key(&key)?;
            }
            if let Some(title) = display.window_title {
                cfg.window_title = title;
            }
        }
        Ok(Self {
            cfg,
            input_size: inference.input_size,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("LIVE_DETECT_MODEL") {
            self.cfg.model_path = PathBuf::from(path);
        }
        if let Some(backend) = env_value("LIVE_DETECT_BACKEND") {
            self.cfg.backend = backend.parse()?;
        }
        if let Some(camera) = env_value("LIVE_DETECT_CAMERA") {
            self.cfg.camera = camera;
        }
        if let Some(device) = env_value("LIVE_DETECT_DEVICE") {
            self.cfg.device = device.parse()?;
        }
        if let Some(size) = env_value("LIVE_DETECT_INPUT_SIZE") {
            let size: i64 = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_INPUT_SIZE must be an integer"))?;
            self.input_size = Some(size);
        }
        if let Some(confidence) = env_value("LIVE_DETECT_CONFIDENCE") {
            self.cfg.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_CONFIDENCE must be a number"))?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let cfg = &mut self.cfg;
        if let Some(path) = &overrides.model_path {
            cfg.model_path = path.clone();
        }
        if let Some(path) = &overrides.labels_path {
            cfg.labels_path = Some(path.clone());
        }
        if let Some(backend) = overrides.backend {
            cfg.backend = backend;
        }
        if let Some(camera) = &overrides.camera {
            cfg.camera = camera.clone();
        }
        if let Some(size) = overrides.input_size {
            self.input_size = Some(size);
        }
        if let Some(confidence) = overrides.confidence {
            cfg.confidence = confidence;
        }
        if let Some(device) = overrides.device {
            cfg.device = device;
        }
        if let Some(timing) = overrides.fps_timing {
            cfg.fps_timing = timing;
        }
        if let Some(key) = overrides.stop_key {
            cfg.stop_key = key;
        }
        if let Some(title) = &overrides.window_title {
            cfg.window_title = title.clone();
        }
        cfg.verbose |= overrides.verbose;
    }

    fn validate(self) -> Result<(RunConfig, Vec<SizeWarning>)> {
        let Self { mut cfg, input_size } = self;

        if !cfg.confidence.is_finite() || !(0.0..=1.0).contains(&cfg.confidence) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                cfg.confidence
            ));
        }
        if cfg.camera.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        if !cfg.stop_key.is_ascii_graphic() {
            return Err(anyhow!("stop key must be a printable ASCII character"));
        }

        let mut warnings = Vec::new();
        if let Some(requested) = input_size {
            let (size, warning) = InputSize::normalize(requested)?;
            warnings.extend(warning);
            cfg.input_size = size;
            cfg.input_size_explicit = true;
        }
        Ok((cfg, warnings))
    }
}

fn read_config_file(path: &Path) -> Result<RunConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_stop_key(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(key), None) => Ok(key),
        _ => Err(anyhow!("stop key must be a single character, got {:?}", value)),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
