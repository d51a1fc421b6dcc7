//! Subcommand definitions and their mapping onto pipeline commands

use crate::args::StepArgs;
use clap::Subcommand;
use media_pipeline_core::{BatchPatterns, Command};
use media_pipeline_jobs::JobStatus;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every model the analyser and processors need
    ForceDownload,

    /// Time repeated processing of each target
    Benchmark {
        #[command(flatten)]
        step: StepArgs,

        /// Targets to benchmark
        #[arg(long = "benchmark-paths", num_args = 1.., required = true)]
        target_paths: Vec<PathBuf>,
    },

    /// List jobs with the given status: drafted, queued, completed, failed
    JobList { job_status: JobStatus },

    /// Create an empty drafted job
    JobCreate { job_id: String },

    /// Queue a drafted job
    JobSubmit { job_id: String },

    /// Queue every drafted job
    JobSubmitAll,

    JobDelete { job_id: String },

    JobDeleteAll,

    /// Append a step to a drafted job
    JobAddStep {
        job_id: String,

        #[command(flatten)]
        step: StepArgs,
    },

    /// Add a step whose target is the output of the step at the index
    JobRemixStep {
        job_id: String,

        #[arg(allow_negative_numbers = true)]
        step_index: i64,

        #[command(flatten)]
        step: StepArgs,
    },

    /// Insert a step before the index; negative indexes count from the end
    JobInsertStep {
        job_id: String,

        #[arg(allow_negative_numbers = true)]
        step_index: i64,

        #[command(flatten)]
        step: StepArgs,
    },

    JobRemoveStep {
        job_id: String,

        #[arg(allow_negative_numbers = true)]
        step_index: i64,
    },

    /// Interactive mode
    Run,

    /// Process a single step as a temporary job
    HeadlessRun {
        #[command(flatten)]
        step: StepArgs,
    },

    /// Expand file patterns into one job and run it
    BatchRun {
        #[command(flatten)]
        step: StepArgs,

        #[arg(long)]
        source_pattern: Option<String>,

        #[arg(long, required = true)]
        target_pattern: String,

        /// Template over {index}, {source_name}, {target_name} and {target_extension}
        #[arg(long, required = true)]
        output_pattern: String,
    },

    /// Run a queued job
    JobRun { job_id: String },

    JobRunAll,

    /// Requeue and run a failed or completed job
    JobRetry { job_id: String },

    JobRetryAll,
}

impl Commands {
    pub fn into_command(self) -> Command {
        match self {
            Self::ForceDownload => Command::ForceDownload,
            Self::Benchmark { step, target_paths } => Command::Benchmark {
                step_args: step.into_args(),
                target_paths,
            },
            Self::JobList { job_status } => Command::JobList { status: job_status },
            Self::JobCreate { job_id } => Command::JobCreate { job_id },
            Self::JobSubmit { job_id } => Command::JobSubmit { job_id },
            Self::JobSubmitAll => Command::JobSubmitAll,
            Self::JobDelete { job_id } => Command::JobDelete { job_id },
            Self::JobDeleteAll => Command::JobDeleteAll,
            Self::JobAddStep { job_id, step } => Command::JobAddStep {
                job_id,
                step_args: step.into_args(),
            },
            Self::JobRemixStep {
                job_id,
                step_index,
                step,
            } => Command::JobRemixStep {
                job_id,
                step_index,
                step_args: step.into_args(),
            },
            Self::JobInsertStep {
                job_id,
                step_index,
                step,
            } => Command::JobInsertStep {
                job_id,
                step_index,
                step_args: step.into_args(),
            },
            Self::JobRemoveStep { job_id, step_index } => Command::JobRemoveStep { job_id, step_index },
            Self::Run => Command::Run,
            Self::HeadlessRun { step } => Command::HeadlessRun {
                step_args: step.into_args(),
            },
            Self::BatchRun {
                step,
                source_pattern,
                target_pattern,
                output_pattern,
            } => Command::BatchRun {
                step_args: step.into_args(),
                patterns: BatchPatterns {
                    source_pattern,
                    target_pattern,
                    output_pattern,
                },
            },
            Self::JobRun { job_id } => Command::JobRun { job_id },
            Self::JobRunAll => Command::JobRunAll,
            Self::JobRetry { job_id } => Command::JobRetry { job_id },
            Self::JobRetryAll => Command::JobRetryAll,
        }
    }
}
