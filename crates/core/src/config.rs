//! Process-wide and per-step configuration

use crate::error::ConfigError;
use media_pipeline_common::{Args, DownloadProvider, DownloadScope};
use media_pipeline_content_analyser::AnalyserOptions;
use media_pipeline_inference::{ExecutionProvider, SessionOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Config file read when `--config-path` is not given and the file exists
pub const DEFAULT_CONFIG_PATH: &str = "media-pipeline.yaml";

pub const ENV_THREADS: &str = "MEDIA_PIPELINE_THREADS";
pub const ENV_JOBS_PATH: &str = "MEDIA_PIPELINE_JOBS_PATH";

pub const OUTPUT_VIDEO_ENCODERS: &[&str] = &[
    "libx264",
    "libx265",
    "libvpx-vp9",
    "h264_nvenc",
    "hevc_nvenc",
    "h264_amf",
    "hevc_amf",
    "h264_qsv",
    "hevc_qsv",
    "h264_videotoolbox",
    "hevc_videotoolbox",
    "rawvideo",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            other => Err(format!("Unknown log level '{}'", other)),
        }
    }
}

/// Settings shared by every command and step of one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub jobs_path: PathBuf,
    pub models_path: PathBuf,
    pub execution_providers: Vec<ExecutionProvider>,
    pub execution_device_id: i32,
    pub execution_thread_count: usize,
    pub download_providers: Vec<DownloadProvider>,
    pub download_scope: DownloadScope,
    pub log_level: LogLevel,
    pub halt_on_error: bool,
    pub benchmark_cycle_count: usize,

    /// Step defaults; a step's own arguments take precedence
    pub processors: Vec<String>,
    pub output_image_quality: u8,
    pub output_video_encoder: String,
    pub output_video_quality: u8,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            jobs_path: PathBuf::from(".jobs"),
            models_path: PathBuf::from(".assets/models"),
            execution_providers: vec![ExecutionProvider::Cpu],
            execution_device_id: 0,
            execution_thread_count: num_cpus::get_physical(),
            download_providers: vec![DownloadProvider::Github, DownloadProvider::Huggingface],
            download_scope: DownloadScope::Lite,
            log_level: LogLevel::Info,
            halt_on_error: false,
            benchmark_cycle_count: 5,
            processors: Vec::new(),
            output_image_quality: 80,
            output_video_encoder: "libx264".to_string(),
            output_video_quality: 80,
        }
    }
}

impl ProcessConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Defaults, overlaid with `path` or else `media-pipeline.yaml` when present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `MEDIA_PIPELINE_THREADS` and `MEDIA_PIPELINE_JOBS_PATH`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threads) = lookup(ENV_THREADS) {
            self.execution_thread_count = threads.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a positive integer, got '{}'", ENV_THREADS, threads))
            })?;
        }
        if let Some(jobs_path) = lookup(ENV_JOBS_PATH) {
            self.jobs_path = PathBuf::from(jobs_path);
        }
        Ok(())
    }

    /// Reject values outside their ranges and choice sets
    pub fn validate(&self, available_processors: &[String]) -> Result<(), ConfigError> {
        if self.execution_thread_count == 0 {
            return Err(ConfigError::Invalid("execution_thread_count must be at least 1".into()));
        }
        if self.execution_providers.is_empty() {
            return Err(ConfigError::Invalid("execution_providers must not be empty".into()));
        }
        if self.download_providers.is_empty() {
            return Err(ConfigError::Invalid("download_providers must not be empty".into()));
        }
        if self.benchmark_cycle_count == 0 {
            return Err(ConfigError::Invalid("benchmark_cycle_count must be at least 1".into()));
        }
        for (name, quality) in [
            ("output_image_quality", self.output_image_quality),
            ("output_video_quality", self.output_video_quality),
        ] {
            if quality > 100 {
                return Err(ConfigError::Invalid(format!("{} must be within 0..=100", name)));
            }
        }
        if !OUTPUT_VIDEO_ENCODERS.contains(&self.output_video_encoder.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown output_video_encoder '{}'",
                self.output_video_encoder
            )));
        }
        if let Some(unknown) = self
            .processors
            .iter()
            .find(|name| !available_processors.contains(name))
        {
            return Err(ConfigError::Invalid(format!("Unknown processor '{}'", unknown)));
        }
        Ok(())
    }

    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            execution_providers: self.execution_providers.clone(),
            execution_device_id: self.execution_device_id,
            execution_thread_count: self.execution_thread_count,
        }
    }

    #[must_use]
    pub fn analyser_options(&self) -> AnalyserOptions {
        AnalyserOptions {
            models_path: self.models_path.clone(),
            download_providers: self.download_providers.clone(),
            session_options: self.session_options(),
            show_progress: self.log_level >= LogLevel::Info,
        }
    }

    /// Step arguments implied by this configuration
    #[must_use]
    pub fn step_defaults(&self) -> Args {
        let mut args = Args::new();
        args.insert("processors".to_string(), serde_json::json!(self.processors));
        args.insert("output_image_quality".to_string(), serde_json::json!(self.output_image_quality));
        args.insert("output_video_encoder".to_string(), serde_json::json!(self.output_video_encoder));
        args.insert("output_video_quality".to_string(), serde_json::json!(self.output_video_quality));
        args
    }
}

fn default_image_quality() -> u8 {
    80
}

fn default_video_encoder() -> String {
    "libx264".to_string()
}

fn default_video_quality() -> u8 {
    80
}

/// Typed view of one step's merged argument mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub source_paths: Vec<PathBuf>,
    pub target_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub processors: Vec<String>,
    pub trim_frame_start: Option<u64>,
    pub trim_frame_end: Option<u64>,
    #[serde(default = "default_image_quality")]
    pub output_image_quality: u8,
    #[serde(default = "default_video_encoder")]
    pub output_video_encoder: String,
    #[serde(default = "default_video_quality")]
    pub output_video_quality: u8,
    pub output_video_fps: Option<f64>,
}

impl StepConfig {
    /// Parse a flat argument mapping; unrelated keys are ignored
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let object: serde_json::Map<String, serde_json::Value> = args
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(serde_json::from_value(serde_json::Value::Object(object))?)
    }

    pub fn to_args(&self) -> Result<Args, ConfigError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(object) => Ok(object
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect()),
            other => Err(ConfigError::Invalid(format!("Step arguments must be a mapping, got {}", other))),
        }
    }
}
