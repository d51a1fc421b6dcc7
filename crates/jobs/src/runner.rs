//! Sequential job execution, finalization and retry

use crate::helper::get_step_output_path;
use crate::model::{JobStatus, StepStatus};
use crate::store::{for_each_job, JobStore};
use crate::{JobError, Result};
use media_pipeline_common::fs::has_video_extension;
use media_pipeline_common::Args;
use media_pipeline_vision::ffmpeg::concat_videos;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Runs queued jobs step by step through a caller-supplied step processor.
///
/// The processor receives `(job_id, step_index, step_args)`, writes the step
/// result to the step's `output_path` and reports success.
#[derive(Debug, Clone)]
pub struct JobRunner {
    store: JobStore,
}

/// Final output path -> step outputs, in step order
type OutputSet = Vec<(PathBuf, Vec<PathBuf>)>;

fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(source, target).is_err() {
        // rename fails across filesystems
        std::fs::copy(source, target)?;
        std::fs::remove_file(source)?;
    }
    Ok(())
}

impl JobRunner {
    pub fn new(store: JobStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run a queued job; it ends up `completed` or `failed`.
    pub fn run_job<F>(&self, job_id: &str, process_step: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        self.store.require_status(job_id, &[JobStatus::Queued])?;
        info!("Running job {}", job_id);

        let outcome = self
            .run_steps(job_id, process_step)
            .and_then(|()| self.finalize_steps(job_id));
        self.clean_steps(job_id);

        match outcome {
            Ok(()) => {
                self.store.move_job_file(job_id, JobStatus::Completed)?;
                info!("Job {} completed", job_id);
                Ok(())
            }
            Err(e) => {
                self.store.move_job_file(job_id, JobStatus::Failed)?;
                error!("Job {} failed: {}", job_id, e);
                Err(e)
            }
        }
    }

    /// Requeue a failed or completed job and run it again from the first step
    pub fn retry_job<F>(&self, job_id: &str, process_step: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        self.store
            .require_status(job_id, &[JobStatus::Failed, JobStatus::Completed])?;
        self.store.set_steps_status(job_id, StepStatus::Queued)?;
        self.store.move_job_file(job_id, JobStatus::Queued)?;
        self.run_job(job_id, process_step)
    }

    /// Run every queued job in id order
    pub fn run_jobs<F>(&self, process_step: &mut F, halt_on_error: bool) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        let job_ids = self.store.find_job_ids(JobStatus::Queued)?;
        for_each_job(&job_ids, Some(JobStatus::Queued), halt_on_error, |job_id| {
            self.run_job(job_id, process_step)
        })
    }

    /// Retry every failed job in id order
    pub fn retry_jobs<F>(&self, process_step: &mut F, halt_on_error: bool) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        let job_ids = self.store.find_job_ids(JobStatus::Failed)?;
        for_each_job(&job_ids, Some(JobStatus::Failed), halt_on_error, |job_id| {
            self.retry_job(job_id, process_step)
        })
    }

    fn run_steps<F>(&self, job_id: &str, process_step: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        let steps = self.store.get_steps(job_id)?;
        if steps.is_empty() {
            return Err(JobError::NoSteps(job_id.to_string()));
        }
        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = self.run_step(job_id, index, &step.args, process_step) {
                self.store.set_step_status(job_id, index, StepStatus::Failed)?;
                return Err(e);
            }
        }
        Ok(())
    }

    fn run_step<F>(&self, job_id: &str, index: usize, args: &Args, process_step: &mut F) -> Result<()>
    where
        F: FnMut(&str, usize, &Args) -> bool,
    {
        self.store.set_step_status(job_id, index, StepStatus::Started)?;
        debug!(job_id, step_index = index, "Processing step");

        if !process_step(job_id, index, args) {
            return Err(JobError::StepFailed {
                job_id: job_id.to_string(),
                index,
            });
        }

        let output_path = args
            .get("output_path")
            .and_then(|v| v.as_str())
            .map(PathBuf::from);
        let step_output_path = output_path
            .as_deref()
            .and_then(|output_path| get_step_output_path(job_id, index, output_path));
        let (Some(output_path), Some(step_output_path)) = (output_path, step_output_path) else {
            return Err(JobError::MissingOutputPath {
                job_id: job_id.to_string(),
                index,
            });
        };

        move_file(&output_path, &step_output_path)?;
        self.store.set_step_status(job_id, index, StepStatus::Completed)?;
        Ok(())
    }

    fn collect_output_set(&self, job_id: &str) -> Result<OutputSet> {
        let mut output_set: OutputSet = Vec::new();
        for (index, step) in self.store.get_steps(job_id)?.iter().enumerate() {
            let Some(output_path) = step.arg_str("output_path").map(PathBuf::from) else {
                continue;
            };
            let Some(step_output_path) = get_step_output_path(job_id, index, &output_path) else {
                continue;
            };
            match output_set.iter_mut().find(|(path, _)| *path == output_path) {
                Some((_, step_outputs)) => step_outputs.push(step_output_path),
                None => output_set.push((output_path, vec![step_output_path])),
            }
        }
        Ok(output_set)
    }

    /// Combine step outputs into their final output paths: videos are
    /// concatenated, images are moved in step order.
    fn finalize_steps(&self, job_id: &str) -> Result<()> {
        for (output_path, step_outputs) in self.collect_output_set(job_id)? {
            if step_outputs.iter().all(|path| has_video_extension(path)) {
                match step_outputs.as_slice() {
                    [single] => move_file(single, &output_path)?,
                    many => {
                        let inputs: Vec<&Path> = many.iter().map(PathBuf::as_path).collect();
                        concat_videos(&inputs, &output_path)?;
                    }
                }
            } else {
                for step_output in &step_outputs {
                    move_file(step_output, &output_path)?;
                }
            }
            debug!("Finalized {}", output_path.display());
        }
        Ok(())
    }

    /// Remove leftover step outputs
    fn clean_steps(&self, job_id: &str) {
        let output_set = match self.collect_output_set(job_id) {
            Ok(output_set) => output_set,
            Err(e) => {
                warn!("Cannot clean job {}: {}", job_id, e);
                return;
            }
        };
        for step_output in output_set.iter().flat_map(|(_, outputs)| outputs) {
            if step_output.is_file() {
                if let Err(e) = std::fs::remove_file(step_output) {
                    warn!("Failed to remove {}: {}", step_output.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, JobRunner) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path().join("jobs"));
        store.init_jobs().unwrap();
        (dir, JobRunner::new(store))
    }

    fn image_step(dir: &Path, name: &str) -> Args {
        let mut args = Args::new();
        args.insert("target_path".to_string(), json!(dir.join("in.png").to_string_lossy()));
        args.insert("output_path".to_string(), json!(dir.join(name).to_string_lossy()));
        args
    }

    /// Writes `content` to the step output path
    fn writer(content: &'static str) -> impl FnMut(&str, usize, &Args) -> bool {
        move |_job_id, _index, args| {
            let output = args["output_path"].as_str().unwrap();
            std::fs::write(output, content).is_ok()
        }
    }

    #[test]
    fn test_run_job_moves_outputs_into_place() {
        let (dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", image_step(dir.path(), "out.png")).unwrap();
        store.submit_job("job-a").unwrap();

        runner.run_job("job-a", &mut writer("frame")).unwrap();

        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Completed));
        assert_eq!(std::fs::read_to_string(dir.path().join("out.png")).unwrap(), "frame");
        assert!(!dir.path().join("out-job-a-0.png").exists());
        assert_eq!(store.get_steps("job-a").unwrap()[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_steps_sharing_an_output_keep_the_last_image() {
        let (dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", image_step(dir.path(), "out.png")).unwrap();
        store.add_step("job-a", image_step(dir.path(), "out.png")).unwrap();
        store.submit_job("job-a").unwrap();

        let mut calls = Vec::new();
        let mut process = |_: &str, index: usize, args: &Args| {
            calls.push(index);
            std::fs::write(args["output_path"].as_str().unwrap(), format!("step-{index}")).is_ok()
        };
        runner.run_job("job-a", &mut process).unwrap();

        assert_eq!(calls, vec![0, 1]);
        assert_eq!(std::fs::read_to_string(dir.path().join("out.png")).unwrap(), "step-1");
    }

    #[test]
    fn test_failing_step_stops_job_and_cleans() {
        let (dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", image_step(dir.path(), "a.png")).unwrap();
        store.add_step("job-a", image_step(dir.path(), "b.png")).unwrap();
        store.add_step("job-a", image_step(dir.path(), "c.png")).unwrap();
        store.submit_job("job-a").unwrap();

        let mut calls = 0;
        let mut process = |_: &str, index: usize, args: &Args| {
            calls += 1;
            std::fs::write(args["output_path"].as_str().unwrap(), "x").unwrap();
            index != 1
        };
        let result = runner.run_job("job-a", &mut process);

        assert!(matches!(result, Err(JobError::StepFailed { index: 1, .. })));
        assert_eq!(calls, 2);
        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Failed));
        let statuses: Vec<StepStatus> = store.get_steps("job-a").unwrap().iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Queued]);
        // the completed step's temporary output is removed
        assert!(!dir.path().join("a-job-a-0.png").exists());
        assert!(!dir.path().join("a.png").exists());
    }

    #[test]
    fn test_retry_failed_then_completed_job() {
        let (dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", image_step(dir.path(), "out.png")).unwrap();
        store.submit_job("job-a").unwrap();

        assert!(runner.run_job("job-a", &mut |_: &str, _: usize, _: &Args| false).is_err());
        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Failed));

        runner.retry_job("job-a", &mut writer("ok")).unwrap();
        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Completed));

        runner.retry_job("job-a", &mut writer("ok")).unwrap();
        runner.retry_job("job-a", &mut writer("ok")).unwrap();
        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Completed));
        assert_eq!(std::fs::read_to_string(dir.path().join("out.png")).unwrap(), "ok");
    }

    #[test]
    fn test_run_requires_queued_job() {
        let (dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", image_step(dir.path(), "out.png")).unwrap();

        assert!(matches!(
            runner.run_job("job-a", &mut writer("x")),
            Err(JobError::InvalidStatus { .. })
        ));
        assert!(matches!(
            runner.retry_job("job-a", &mut writer("x")),
            Err(JobError::InvalidStatus { .. })
        ));
        assert!(matches!(runner.run_job("missing", &mut writer("x")), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_missing_output_path_fails_step() {
        let (_dir, runner) = setup();
        let store = runner.store();
        store.create_job("job-a").unwrap();
        store.add_step("job-a", Args::new()).unwrap();
        store.submit_job("job-a").unwrap();

        let result = runner.run_job("job-a", &mut |_: &str, _: usize, _: &Args| true);
        assert!(matches!(result, Err(JobError::MissingOutputPath { index: 0, .. })));
        assert_eq!(store.find_job_status("job-a"), Some(JobStatus::Failed));
    }

    #[test]
    fn test_run_jobs_and_retry_jobs() {
        let (dir, runner) = setup();
        let store = runner.store();
        assert!(matches!(
            runner.run_jobs(&mut writer("x"), false),
            Err(JobError::NoJobs(JobStatus::Queued))
        ));

        for (job_id, output) in [("job-a", "a.png"), ("job-b", "b.png")] {
            store.create_job(job_id).unwrap();
            store.add_step(job_id, image_step(dir.path(), output)).unwrap();
            store.submit_job(job_id).unwrap();
        }

        let mut fail_b = |job_id: &str, _: usize, args: &Args| {
            std::fs::write(args["output_path"].as_str().unwrap(), "x").unwrap();
            job_id != "job-b"
        };
        assert!(matches!(
            runner.run_jobs(&mut fail_b, false),
            Err(JobError::BatchFailed { failed: 1, total: 2 })
        ));
        assert_eq!(store.find_job_ids(JobStatus::Completed).unwrap(), vec!["job-a"]);
        assert_eq!(store.find_job_ids(JobStatus::Failed).unwrap(), vec!["job-b"]);

        runner.retry_jobs(&mut writer("y"), true).unwrap();
        assert_eq!(store.find_job_ids(JobStatus::Completed).unwrap(), vec!["job-a", "job-b"]);
        assert!(runner.retry_jobs(&mut writer("y"), true).is_err());
    }
}
