/// Common types and utilities shared by the media pipeline crates
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod download;
pub mod fs;
pub mod template;

pub use download::{CurlDownloader, DownloadProvider, DownloadScope, DownloadSet, Downloader, ModelFile};
pub use template::{format_output_pattern, TemplateError};

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("Invalid file pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Flat argument mapping carried by steps and the process-wide configuration.
///
/// Keys are argument names (`target_path`, `output_path`, ...). A `BTreeMap`
/// keeps the persisted step files stable between writes.
pub type Args = BTreeMap<String, serde_json::Value>;

/// Merge `overrides` over `base`; keys present in both take the override value.
#[must_use]
pub fn merge_args(base: &Args, overrides: &Args) -> Args {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Outcome of a command or of the processing dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Success,
    /// Generic failure, including job-manager level validation failures
    Failure,
    /// Pre-check, environment or model failure
    PreCheckFailed,
    /// The content-safety gate rejected the target
    ContentRejected,
}

impl ErrorCode {
    /// Numeric process exit code
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::PreCheckFailed => 2,
            Self::ContentRejected => 3,
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<bool> for ErrorCode {
    fn from(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_args_override_wins() {
        let mut base = Args::new();
        base.insert("target_path".to_string(), json!("base.png"));
        base.insert("execution_thread_count".to_string(), json!(4));

        let mut overrides = Args::new();
        overrides.insert("target_path".to_string(), json!("step.png"));

        let merged = merge_args(&base, &overrides);
        assert_eq!(merged["target_path"], json!("step.png"));
        assert_eq!(merged["execution_thread_count"], json!(4));
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert_eq!(ErrorCode::Failure.code(), 1);
        assert_eq!(ErrorCode::PreCheckFailed.code(), 2);
        assert_eq!(ErrorCode::ContentRejected.code(), 3);
        assert_eq!(ErrorCode::from(true), ErrorCode::Success);
        assert!(!ErrorCode::from(false).is_success());
    }
}
