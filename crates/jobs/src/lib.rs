//! Durable jobs and steps
//!
//! A job is a JSON file whose parent directory is its status
//! (`drafted`, `queued`, `completed`, `failed`). Steps are ordered argument
//! mappings addressed by index; negative indices count from the end.

pub mod helper;
pub mod list;
pub mod model;
pub mod runner;
pub mod store;

pub use helper::{get_step_output_path, suggest_job_id};
pub use list::{compose_job_list, render_table, JobListing};
pub use model::{Job, JobStatus, Step, StepStatus};
pub use runner::JobRunner;
pub use store::JobStore;

use media_pipeline_common::ProcessingError;
use thiserror::Error;

/// Job store and job runner errors
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),

    #[error("Job '{job_id}' is {actual}, expected {expected}")]
    InvalidStatus {
        job_id: String,
        expected: String,
        actual: JobStatus,
    },

    #[error("Job '{0}' has no steps")]
    NoSteps(String),

    #[error("Job '{job_id}' has no step {index}")]
    StepOutOfRange { job_id: String, index: i64 },

    #[error("Step {index} of job '{job_id}' has no usable output_path")]
    MissingOutputPath { job_id: String, index: usize },

    #[error("Step {index} of job '{job_id}' failed")]
    StepFailed { job_id: String, index: usize },

    #[error("No {0} jobs")]
    NoJobs(JobStatus),

    #[error("No jobs")]
    Empty,

    #[error("{failed} of {total} jobs failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),
}

pub type Result<T> = std::result::Result<T, JobError>;
