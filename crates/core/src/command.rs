//! The closed set of commands, decided once at entry

use media_pipeline_common::Args;
use media_pipeline_jobs::JobStatus;
use std::path::PathBuf;

/// File patterns that expand a batch into steps
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPatterns {
    /// Glob for source files; may be absent
    pub source_pattern: Option<String>,
    /// Glob for target files
    pub target_pattern: String,
    /// Output path template over `{index}`, `{source_name}`, `{target_name}`, `{target_extension}`
    pub output_pattern: String,
}

/// One variant per command, carrying only that command's arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ForceDownload,
    Benchmark { step_args: Args, target_paths: Vec<PathBuf> },
    JobList { status: JobStatus },
    JobCreate { job_id: String },
    JobSubmit { job_id: String },
    JobSubmitAll,
    JobDelete { job_id: String },
    JobDeleteAll,
    JobAddStep { job_id: String, step_args: Args },
    JobRemixStep { job_id: String, step_index: i64, step_args: Args },
    JobInsertStep { job_id: String, step_index: i64, step_args: Args },
    JobRemoveStep { job_id: String, step_index: i64 },
    /// Interactive UI; only the command slot exists
    Run,
    HeadlessRun { step_args: Args },
    BatchRun { step_args: Args, patterns: BatchPatterns },
    JobRun { job_id: String },
    JobRunAll,
    JobRetry { job_id: String },
    JobRetryAll,
}

impl Command {
    pub const NAMES: [&'static str; 19] = [
        "force-download",
        "benchmark",
        "job-list",
        "job-create",
        "job-submit",
        "job-submit-all",
        "job-delete",
        "job-delete-all",
        "job-add-step",
        "job-remix-step",
        "job-insert-step",
        "job-remove-step",
        "run",
        "headless-run",
        "batch-run",
        "job-run",
        "job-run-all",
        "job-retry",
        "job-retry-all",
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ForceDownload => "force-download",
            Self::Benchmark { .. } => "benchmark",
            Self::JobList { .. } => "job-list",
            Self::JobCreate { .. } => "job-create",
            Self::JobSubmit { .. } => "job-submit",
            Self::JobSubmitAll => "job-submit-all",
            Self::JobDelete { .. } => "job-delete",
            Self::JobDeleteAll => "job-delete-all",
            Self::JobAddStep { .. } => "job-add-step",
            Self::JobRemixStep { .. } => "job-remix-step",
            Self::JobInsertStep { .. } => "job-insert-step",
            Self::JobRemoveStep { .. } => "job-remove-step",
            Self::Run => "run",
            Self::HeadlessRun { .. } => "headless-run",
            Self::BatchRun { .. } => "batch-run",
            Self::JobRun { .. } => "job-run",
            Self::JobRunAll => "job-run-all",
            Self::JobRetry { .. } => "job-retry",
            Self::JobRetryAll => "job-retry-all",
        }
    }

    /// Commands that read or mutate job files without processing
    #[must_use]
    pub fn is_job_manager(&self) -> bool {
        matches!(
            self,
            Self::JobList { .. }
                | Self::JobCreate { .. }
                | Self::JobSubmit { .. }
                | Self::JobSubmitAll
                | Self::JobDelete { .. }
                | Self::JobDeleteAll
                | Self::JobAddStep { .. }
                | Self::JobRemixStep { .. }
                | Self::JobInsertStep { .. }
                | Self::JobRemoveStep { .. }
        )
    }

    /// Commands that run queued or failed jobs
    #[must_use]
    pub fn is_job_runner(&self) -> bool {
        matches!(
            self,
            Self::JobRun { .. } | Self::JobRunAll | Self::JobRetry { .. } | Self::JobRetryAll
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique_and_cover_variants() {
        let commands = [
            Command::ForceDownload,
            Command::Benchmark {
                step_args: Args::new(),
                target_paths: Vec::new(),
            },
            Command::JobList {
                status: JobStatus::Drafted,
            },
            Command::JobCreate { job_id: "a".into() },
            Command::JobSubmit { job_id: "a".into() },
            Command::JobSubmitAll,
            Command::JobDelete { job_id: "a".into() },
            Command::JobDeleteAll,
            Command::JobAddStep {
                job_id: "a".into(),
                step_args: Args::new(),
            },
            Command::JobRemixStep {
                job_id: "a".into(),
                step_index: 0,
                step_args: Args::new(),
            },
            Command::JobInsertStep {
                job_id: "a".into(),
                step_index: 0,
                step_args: Args::new(),
            },
            Command::JobRemoveStep {
                job_id: "a".into(),
                step_index: 0,
            },
            Command::Run,
            Command::HeadlessRun { step_args: Args::new() },
            Command::BatchRun {
                step_args: Args::new(),
                patterns: BatchPatterns {
                    source_pattern: None,
                    target_pattern: "*.png".into(),
                    output_pattern: "{index}.png".into(),
                },
            },
            Command::JobRun { job_id: "a".into() },
            Command::JobRunAll,
            Command::JobRetry { job_id: "a".into() },
            Command::JobRetryAll,
        ];

        let names: Vec<&str> = commands.iter().map(Command::name).collect();
        assert_eq!(names, Command::NAMES.to_vec());
        assert_eq!(commands.iter().filter(|c| c.is_job_manager()).count(), 10);
        assert_eq!(commands.iter().filter(|c| c.is_job_runner()).count(), 4);

        let direct: Vec<&str> = commands
            .iter()
            .filter(|c| !c.is_job_manager() && !c.is_job_runner())
            .map(Command::name)
            .collect();
        assert_eq!(direct, vec!["force-download", "benchmark", "run", "headless-run", "batch-run"]);
        assert!(commands.iter().all(|c| !(c.is_job_manager() && c.is_job_runner())));
    }
}
