//! Argument groups shared between subcommands

use clap::Args;
use media_pipeline_common::{Args as StepArgMap, DownloadProvider, DownloadScope};
use media_pipeline_core::{LogLevel, ProcessConfig};
use media_pipeline_inference::ExecutionProvider;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::PathBuf;

/// Parse a lowercase choice through its serde name
pub fn parse_choice<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(json!(value.trim().to_lowercase())).map_err(|_| format!("invalid choice '{}'", value))
}

/// Process-wide options; each one given overrides the configuration file and environment
#[derive(Args, Debug, Default)]
pub struct ProcessArgs {
    /// YAML configuration file (defaults to media-pipeline.yaml when present)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Directory holding the job store
    #[arg(long, global = true)]
    pub jobs_path: Option<PathBuf>,

    /// Directory holding downloaded models
    #[arg(long, global = true)]
    pub models_path: Option<PathBuf>,

    /// Execution providers in preference order: cpu, cuda, coreml
    #[arg(long, global = true, value_delimiter = ',')]
    pub execution_providers: Vec<ExecutionProvider>,

    #[arg(long, global = true)]
    pub execution_device_id: Option<i32>,

    /// Worker threads for frame processing
    #[arg(long, global = true)]
    pub execution_thread_count: Option<usize>,

    /// Model download hosts in preference order: github, huggingface
    #[arg(long, global = true, value_delimiter = ',', value_parser = parse_choice::<DownloadProvider>)]
    pub download_providers: Vec<DownloadProvider>,

    /// lite or full
    #[arg(long, global = true, value_parser = parse_choice::<DownloadScope>)]
    pub download_scope: Option<DownloadScope>,

    /// error, warn, info or debug
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Stop the *-all job commands at the first failing job
    #[arg(long, global = true)]
    pub halt_on_error: bool,

    #[arg(long, global = true)]
    pub benchmark_cycle_count: Option<usize>,
}

impl ProcessArgs {
    pub fn apply(&self, config: &mut ProcessConfig) {
        if let Some(jobs_path) = &self.jobs_path {
            config.jobs_path = jobs_path.clone();
        }
        if let Some(models_path) = &self.models_path {
            config.models_path = models_path.clone();
        }
        if !self.execution_providers.is_empty() {
            config.execution_providers = self.execution_providers.clone();
        }
        if let Some(device_id) = self.execution_device_id {
            config.execution_device_id = device_id;
        }
        if let Some(thread_count) = self.execution_thread_count {
            config.execution_thread_count = thread_count;
        }
        if !self.download_providers.is_empty() {
            config.download_providers = self.download_providers.clone();
        }
        if let Some(scope) = self.download_scope {
            config.download_scope = scope;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.halt_on_error {
            config.halt_on_error = true;
        }
        if let Some(cycle_count) = self.benchmark_cycle_count {
            config.benchmark_cycle_count = cycle_count;
        }
    }
}

/// Per-step options stored with a job step
#[derive(Args, Debug, Default, Clone)]
pub struct StepArgs {
    /// Source media; repeat or list several
    #[arg(short = 's', long, num_args = 1..)]
    pub source_paths: Vec<PathBuf>,

    #[arg(short = 't', long)]
    pub target_path: Option<PathBuf>,

    #[arg(short = 'o', long)]
    pub output_path: Option<PathBuf>,

    /// Comma separated processor names
    #[arg(long, value_delimiter = ',')]
    pub processors: Vec<String>,

    #[arg(long)]
    pub trim_frame_start: Option<u64>,

    #[arg(long)]
    pub trim_frame_end: Option<u64>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub output_image_quality: Option<u8>,

    #[arg(long)]
    pub output_video_encoder: Option<String>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub output_video_quality: Option<u8>,

    #[arg(long)]
    pub output_video_fps: Option<f64>,
}

impl StepArgs {
    /// Keep only the options given, so stored steps fall back to the configured defaults
    pub fn into_args(self) -> StepArgMap {
        let mut args = StepArgMap::new();
        if !self.source_paths.is_empty() {
            let sources: Vec<String> = self
                .source_paths
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect();
            args.insert("source_paths".to_string(), json!(sources));
        }
        if let Some(target_path) = self.target_path {
            args.insert("target_path".to_string(), json!(target_path.to_string_lossy()));
        }
        if let Some(output_path) = self.output_path {
            args.insert("output_path".to_string(), json!(output_path.to_string_lossy()));
        }
        if !self.processors.is_empty() {
            args.insert("processors".to_string(), json!(self.processors));
        }
        if let Some(start) = self.trim_frame_start {
            args.insert("trim_frame_start".to_string(), json!(start));
        }
        if let Some(end) = self.trim_frame_end {
            args.insert("trim_frame_end".to_string(), json!(end));
        }
        if let Some(quality) = self.output_image_quality {
            args.insert("output_image_quality".to_string(), json!(quality));
        }
        if let Some(encoder) = self.output_video_encoder {
            args.insert("output_video_encoder".to_string(), json!(encoder));
        }
        if let Some(quality) = self.output_video_quality {
            args.insert("output_video_quality".to_string(), json!(quality));
        }
        if let Some(fps) = self.output_video_fps {
            args.insert("output_video_fps".to_string(), json!(fps));
        }
        args
    }
}
