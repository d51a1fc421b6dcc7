//! Media Pipeline
//!
//! Job/step media processing gated by a content-safety ensemble. This crate
//! re-exports the workspace members under short module names.

pub use media_pipeline_common as common;
pub use media_pipeline_content_analyser as content_analyser;
pub use media_pipeline_core as core;
pub use media_pipeline_inference as inference;
pub use media_pipeline_jobs as jobs;
pub use media_pipeline_vision as vision;

pub use media_pipeline_common::ErrorCode;
pub use media_pipeline_core::{Command, Controller, ProcessConfig, ProcessorRegistry};
