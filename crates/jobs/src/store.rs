//! Filesystem job store

use crate::helper::{get_step_output_path, is_valid_job_id};
use crate::model::{Job, JobStatus, Step, StepStatus};
use crate::{JobError, Result};
use chrono::Local;
use media_pipeline_common::Args;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Jobs stored as `{jobs_path}/{status}/{job_id}.json`
#[derive(Debug, Clone)]
pub struct JobStore {
    jobs_path: PathBuf,
}

fn now() -> String {
    Local::now().to_rfc3339()
}

impl JobStore {
    pub fn new(jobs_path: impl Into<PathBuf>) -> Self {
        Self {
            jobs_path: jobs_path.into(),
        }
    }

    #[must_use]
    pub fn jobs_path(&self) -> &Path {
        &self.jobs_path
    }

    /// Create the status directories
    pub fn init_jobs(&self) -> Result<()> {
        for status in JobStatus::ALL {
            std::fs::create_dir_all(self.jobs_path.join(status.as_str()))?;
        }
        Ok(())
    }

    /// Remove every job and the store directory itself
    pub fn clear_jobs(&self) -> Result<()> {
        if self.jobs_path.exists() {
            std::fs::remove_dir_all(&self.jobs_path)?;
        }
        Ok(())
    }

    fn job_file_path(&self, job_id: &str, status: JobStatus) -> PathBuf {
        self.jobs_path
            .join(status.as_str())
            .join(format!("{}.json", job_id))
    }

    /// Current status of a job, `None` when it does not exist
    #[must_use]
    pub fn find_job_status(&self, job_id: &str) -> Option<JobStatus> {
        JobStatus::ALL
            .into_iter()
            .find(|status| self.job_file_path(job_id, *status).is_file())
    }

    pub(crate) fn require_status(&self, job_id: &str, expected: &[JobStatus]) -> Result<JobStatus> {
        let actual = self
            .find_job_status(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        if expected.contains(&actual) {
            return Ok(actual);
        }
        let expected = expected
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(JobError::InvalidStatus {
            job_id: job_id.to_string(),
            expected,
            actual,
        })
    }

    /// Read a job file regardless of its status
    pub fn read_job_file(&self, job_id: &str) -> Result<Job> {
        let status = self
            .find_job_status(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        let content = std::fs::read_to_string(self.job_file_path(job_id, status))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Atomically write `job` as `{status}/{job_id}.json`
    fn write_job_file(&self, job_id: &str, status: JobStatus, job: &Job) -> Result<()> {
        let path = self.job_file_path(job_id, status);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_string_pretty(job)?)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Rewrite an existing job in place, stamping `date_updated`
    fn update_job_file(&self, job_id: &str, mut job: Job) -> Result<()> {
        let status = self
            .find_job_status(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.date_updated = Some(now());
        self.write_job_file(job_id, status, &job)
    }

    /// Move a job file to another status directory
    pub fn move_job_file(&self, job_id: &str, status: JobStatus) -> Result<()> {
        let current = self
            .find_job_status(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        if current == status {
            return Ok(());
        }
        let target = self.job_file_path(job_id, status);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(self.job_file_path(job_id, current), target)?;
        debug!("Moved job {} from {} to {}", job_id, current, status);
        Ok(())
    }

    pub fn create_job(&self, job_id: &str) -> Result<()> {
        if !is_valid_job_id(job_id) {
            return Err(JobError::InvalidJobId(job_id.to_string()));
        }
        if self.find_job_status(job_id).is_some() {
            return Err(JobError::AlreadyExists(job_id.to_string()));
        }
        self.write_job_file(job_id, JobStatus::Drafted, &Job::new(now()))?;
        info!("Created job {}", job_id);
        Ok(())
    }

    /// Queue a drafted job that has at least one step
    pub fn submit_job(&self, job_id: &str) -> Result<()> {
        self.require_status(job_id, &[JobStatus::Drafted])?;
        let mut job = self.read_job_file(job_id)?;
        if job.steps.is_empty() {
            return Err(JobError::NoSteps(job_id.to_string()));
        }
        for step in &mut job.steps {
            step.status = StepStatus::Queued;
        }
        self.update_job_file(job_id, job)?;
        self.move_job_file(job_id, JobStatus::Queued)?;
        info!("Submitted job {}", job_id);
        Ok(())
    }

    /// Submit every drafted job
    pub fn submit_jobs(&self, halt_on_error: bool) -> Result<()> {
        let job_ids = self.find_job_ids(JobStatus::Drafted)?;
        for_each_job(&job_ids, Some(JobStatus::Drafted), halt_on_error, |job_id| {
            self.submit_job(job_id)
        })
    }

    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        let status = self
            .find_job_status(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        std::fs::remove_file(self.job_file_path(job_id, status))?;
        info!("Deleted job {}", job_id);
        Ok(())
    }

    /// Delete every job of every status
    pub fn delete_jobs(&self, halt_on_error: bool) -> Result<()> {
        let mut job_ids = Vec::new();
        for status in JobStatus::ALL {
            job_ids.extend(self.find_job_ids(status)?);
        }
        job_ids.sort();
        for_each_job(&job_ids, None, halt_on_error, |job_id| {
            self.delete_job(job_id)
        })
    }

    fn drafted_job(&self, job_id: &str) -> Result<Job> {
        self.require_status(job_id, &[JobStatus::Drafted])?;
        self.read_job_file(job_id)
    }

    fn resolve_index(job_id: &str, job: &Job, step_index: i64) -> Result<usize> {
        job.resolve_step_index(step_index)
            .ok_or_else(|| JobError::StepOutOfRange {
                job_id: job_id.to_string(),
                index: step_index,
            })
    }

    /// Append a step to a drafted job
    pub fn add_step(&self, job_id: &str, args: Args) -> Result<()> {
        let mut job = self.drafted_job(job_id)?;
        job.steps.push(Step::new(args));
        self.update_job_file(job_id, job)
    }

    /// Append a step that processes the output of step `step_index`
    pub fn remix_step(&self, job_id: &str, step_index: i64, args: Args) -> Result<()> {
        let mut job = self.drafted_job(job_id)?;
        let index = Self::resolve_index(job_id, &job, step_index)?;
        let step_output_path = job.steps[index]
            .arg_str("output_path")
            .and_then(|output_path| get_step_output_path(job_id, index, Path::new(output_path)))
            .ok_or_else(|| JobError::MissingOutputPath {
                job_id: job_id.to_string(),
                index,
            })?;

        let mut args = args;
        args.insert(
            "target_path".to_string(),
            serde_json::Value::String(step_output_path.to_string_lossy().into_owned()),
        );
        job.steps.push(Step::new(args));
        self.update_job_file(job_id, job)
    }

    /// Insert a step before the existing step `step_index`
    pub fn insert_step(&self, job_id: &str, step_index: i64, args: Args) -> Result<()> {
        let mut job = self.drafted_job(job_id)?;
        let index = Self::resolve_index(job_id, &job, step_index)?;
        job.steps.insert(index, Step::new(args));
        self.update_job_file(job_id, job)
    }

    pub fn remove_step(&self, job_id: &str, step_index: i64) -> Result<()> {
        let mut job = self.drafted_job(job_id)?;
        let index = Self::resolve_index(job_id, &job, step_index)?;
        job.steps.remove(index);
        self.update_job_file(job_id, job)
    }

    pub fn get_steps(&self, job_id: &str) -> Result<Vec<Step>> {
        Ok(self.read_job_file(job_id)?.steps)
    }

    pub fn count_step_total(&self, job_id: &str) -> Result<usize> {
        Ok(self.get_steps(job_id)?.len())
    }

    pub fn set_step_status(&self, job_id: &str, step_index: usize, status: StepStatus) -> Result<()> {
        let mut job = self.read_job_file(job_id)?;
        let step = job
            .steps
            .get_mut(step_index)
            .ok_or_else(|| JobError::StepOutOfRange {
                job_id: job_id.to_string(),
                index: step_index as i64,
            })?;
        step.status = status;
        self.update_job_file(job_id, job)
    }

    pub fn set_steps_status(&self, job_id: &str, status: StepStatus) -> Result<()> {
        let mut job = self.read_job_file(job_id)?;
        for step in &mut job.steps {
            step.status = status;
        }
        self.update_job_file(job_id, job)
    }

    /// Sorted ids of the jobs with `status`
    pub fn find_job_ids(&self, status: JobStatus) -> Result<Vec<String>> {
        let directory = self.jobs_path.join(status.as_str());
        if !directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut job_ids = Vec::new();
        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    job_ids.push(stem.to_string());
                }
            }
        }
        job_ids.sort();
        Ok(job_ids)
    }

    /// `(job_id, job)` pairs with `status`, sorted by id
    pub fn find_jobs(&self, status: JobStatus) -> Result<Vec<(String, Job)>> {
        self.find_job_ids(status)?
            .into_iter()
            .map(|job_id| {
                let job = self.read_job_file(&job_id)?;
                Ok((job_id, job))
            })
            .collect()
    }
}

/// Apply `operation` to every job; an empty set fails with
/// [`JobError::NoJobs`] for `status`, or [`JobError::Empty`] when the jobs
/// were gathered across every status.
///
/// With `halt_on_error` the first failure is returned; otherwise every job is
/// attempted and any failure yields [`JobError::BatchFailed`].
pub(crate) fn for_each_job<F>(
    job_ids: &[String],
    status: Option<JobStatus>,
    halt_on_error: bool,
    mut operation: F,
) -> Result<()>
where
    F: FnMut(&str) -> Result<()>,
{
    if job_ids.is_empty() {
        return Err(status.map_or(JobError::Empty, JobError::NoJobs));
    }

    let mut failed = 0;
    for job_id in job_ids {
        if let Err(e) = operation(job_id) {
            error!("Job {} failed: {}", job_id, e);
            if halt_on_error {
                return Err(e);
            }
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(JobError::BatchFailed {
            failed,
            total: job_ids.len(),
        });
    }
    Ok(())
}
