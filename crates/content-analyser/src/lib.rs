//! Content-safety ensemble analyser
//!
//! Three independently thresholded NSFW models vote on every frame; a frame is
//! rejected when at least two of them flag it. Videos are sampled once per
//! second of footage and rejected when more than 10% of the samples are
//! flagged. Image and video decisions are memoized per analyser instance.
//!
//! # Example
//! ```no_run
//! use media_pipeline_content_analyser::{AnalyserOptions, ContentAnalyser};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), media_pipeline_content_analyser::AnalyserError> {
//! let analyser = ContentAnalyser::from_options(AnalyserOptions::default());
//! if analyser.analyse_image(Path::new("target.jpg"))? {
//!     println!("target rejected");
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyser;
pub mod detector;
pub mod model;
pub mod preprocess;

pub use analyser::{AnalyserOptions, ContentAnalyser, VideoAnalysis};
pub use detector::{ensemble_vote, Detector, InferenceBackend, ModelDetector};
pub use model::{
    collect_model_downloads, pre_check, resolve_execution_providers, ModelDescriptor,
    ModelMetadata, NsfwModel, MODEL_CONTEXT,
};
pub use preprocess::prepare_detect_frame;

use media_pipeline_common::ProcessingError;
use media_pipeline_inference::InferenceError;
use thiserror::Error;

/// Errors raised while analysing content
#[derive(Debug, Error)]
pub enum AnalyserError {
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Media error: {0}")]
    Media(#[from] ProcessingError),

    #[error("Invalid output of {model}: {reason}")]
    InvalidOutput { model: &'static str, reason: String },
}

impl From<AnalyserError> for ProcessingError {
    fn from(err: AnalyserError) -> Self {
        match err {
            AnalyserError::Media(e) => e,
            other => ProcessingError::Other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyserError>;
