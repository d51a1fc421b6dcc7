//! Error types for configuration and the processing pipeline

use media_pipeline_common::{ProcessingError, TemplateError};
use media_pipeline_content_analyser::AnalyserError;
use media_pipeline_jobs::JobError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid step arguments: {0}")]
    StepArgs(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown processor: {0}")]
    UnknownProcessor(String),

    #[error("Processor '{name}' failed: {reason}")]
    ProcessorFailed { name: String, reason: String },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Benchmark of {} failed", .0.display())]
    BenchmarkFailed(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output pattern error: {0}")]
    Template(#[from] TemplateError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Content analysis error: {0}")]
    Analyser(#[from] AnalyserError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
