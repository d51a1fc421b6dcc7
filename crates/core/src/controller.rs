//! Command routing, job expansion and per-step processing

use crate::command::{BatchPatterns, Command};
use crate::config::{ProcessConfig, StepConfig};
use crate::error::Result;
use crate::processor::{ModelDownloads, Processor, ProcessorRegistry};
use crate::workflow::Workflow;
use media_pipeline_common::fs::{get_file_extension, get_file_name, media_kind, resolve_file_pattern, MediaKind};
use media_pipeline_common::{format_output_pattern, merge_args, Args, CurlDownloader, Downloader, ErrorCode};
use media_pipeline_content_analyser::{collect_model_downloads, ContentAnalyser};
use media_pipeline_inference::{InferencePool, OrtSessionFactory};
use media_pipeline_jobs::{compose_job_list, suggest_job_id, JobRunner, JobStore};
use media_pipeline_vision::{FfmpegMediaReader, MediaReader};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Log the outcome of a job operation and reduce it to an exit code
fn report(result: media_pipeline_jobs::Result<()>, success: String, failure: String) -> ErrorCode {
    match result {
        Ok(()) => {
            info!("{}", success);
            ErrorCode::Success
        }
        Err(e) => {
            error!("{}: {}", failure, e);
            ErrorCode::Failure
        }
    }
}

/// Expand batch patterns into one argument mapping per step.
///
/// With sources and targets every `(source, target)` pair becomes a step;
/// with targets only, every target does. Output paths come from the output
/// pattern, and an unknown placeholder fails the whole expansion.
pub fn expand_batch_steps(step_args: &Args, patterns: &BatchPatterns) -> Result<Vec<Args>> {
    let source_paths = match &patterns.source_pattern {
        Some(pattern) => resolve_file_pattern(pattern)?,
        None => Vec::new(),
    };
    let target_paths = resolve_file_pattern(&patterns.target_pattern)?;

    let pairs: Vec<(Option<&PathBuf>, &PathBuf)> = if source_paths.is_empty() {
        target_paths.iter().map(|target| (None, target)).collect()
    } else {
        source_paths
            .iter()
            .flat_map(|source| target_paths.iter().map(move |target| (Some(source), target)))
            .collect()
    };

    pairs
        .into_iter()
        .enumerate()
        .map(|(index, (source_path, target_path))| {
            let mut values = HashMap::from([
                ("index", index.to_string()),
                ("target_name", get_file_name(target_path)),
                ("target_extension", get_file_extension(target_path)),
            ]);
            let mut args = step_args.clone();
            if let Some(source_path) = source_path {
                values.insert("source_name", get_file_name(source_path));
                args.insert(
                    "source_paths".to_string(),
                    serde_json::json!([source_path.to_string_lossy()]),
                );
            }
            let output_path = format_output_pattern(&patterns.output_pattern, &values)?;
            args.insert("target_path".to_string(), serde_json::json!(target_path.to_string_lossy()));
            args.insert("output_path".to_string(), serde_json::json!(output_path));
            Ok(args)
        })
        .collect()
}

/// Routes commands to the job store, the job runner and the processing workflows
pub struct Controller {
    config: ProcessConfig,
    registry: ProcessorRegistry,
    analyser: Arc<ContentAnalyser>,
    reader: Arc<dyn MediaReader>,
    downloader: Arc<dyn Downloader>,
    store: JobStore,
}

impl Controller {
    pub fn new(
        config: ProcessConfig,
        registry: ProcessorRegistry,
        analyser: Arc<ContentAnalyser>,
        reader: Arc<dyn MediaReader>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let store = JobStore::new(config.jobs_path.clone());
        Self {
            config,
            registry,
            analyser,
            reader,
            downloader,
            store,
        }
    }

    /// Controller over the ONNX content analyser, ffmpeg and curl
    pub fn from_config(config: ProcessConfig, registry: ProcessorRegistry) -> Self {
        let reader: Arc<dyn MediaReader> = Arc::new(FfmpegMediaReader::new());
        let pool = Arc::new(InferencePool::new(Arc::new(OrtSessionFactory)));
        let analyser = ContentAnalyser::with_pool(config.analyser_options(), pool, Arc::clone(&reader));
        Self::new(
            config,
            registry,
            Arc::new(analyser),
            reader,
            Arc::new(CurlDownloader::new()),
        )
    }

    #[must_use]
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn route(&self, command: Command) -> ErrorCode {
        info!(command = command.name(), "Routing command");
        match command {
            Command::ForceDownload => self.force_download(),
            Command::Benchmark {
                step_args,
                target_paths,
            } => self.run_benchmark(&step_args, &target_paths),
            Command::Run => {
                error!("The interactive UI is not available in this build");
                ErrorCode::PreCheckFailed
            }
            command => {
                if let Err(e) = self.store.init_jobs() {
                    error!("Cannot initialize jobs at {}: {}", self.store.jobs_path().display(), e);
                    return ErrorCode::Failure;
                }
                match command {
                    Command::HeadlessRun { step_args } => self.process_headless(&step_args),
                    Command::BatchRun {
                        step_args,
                        patterns,
                    } => self.process_batch(&step_args, &patterns),
                    command if command.is_job_runner() => self.route_job_runner(command),
                    command if command.is_job_manager() => self.route_job_manager(command),
                    other => {
                        error!("{} cannot be routed", other.name());
                        ErrorCode::Failure
                    }
                }
            }
        }
    }

    /// Fetch and verify the models of the analyser and every registered processor
    pub fn force_download(&self) -> ErrorCode {
        let (hashes, sources) =
            collect_model_downloads(&self.config.models_path, &self.config.download_providers);
        let mut downloads = vec![ModelDownloads { hashes, sources }];
        for processor in self.registry.all() {
            downloads.extend(processor.model_downloads(self.config.download_scope));
        }

        for download in downloads
            .iter()
            .filter(|d| !d.hashes.is_empty() && !d.sources.is_empty())
        {
            if !self.downloader.conditional_download_hashes(&download.hashes)
                || !self.downloader.conditional_download_sources(&download.sources)
            {
                error!("Model download failed");
                return ErrorCode::Failure;
            }
        }
        info!("All models downloaded");
        ErrorCode::Success
    }

    /// Content analyser models present and valid
    pub fn common_pre_check(&self) -> bool {
        media_pipeline_content_analyser::pre_check(
            self.downloader.as_ref(),
            &self.config.models_path,
            &self.config.download_providers,
        )
    }

    pub fn processors_pre_check(&self, names: &[String]) -> bool {
        match self.registry.resolve(names) {
            Ok(processors) => processors.iter().all(|processor| {
                let passed = processor.pre_check();
                if !passed {
                    error!("Pre-check of processor {} failed", processor.name());
                }
                passed
            }),
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    fn route_job_manager(&self, command: Command) -> ErrorCode {
        let store = &self.store;
        match command {
            Command::JobList { status } => match compose_job_list(store, status) {
                Ok(listing) if !listing.is_empty() => {
                    println!("{}", listing.render());
                    ErrorCode::Success
                }
                Ok(_) => {
                    warn!("No {} jobs", status);
                    ErrorCode::Failure
                }
                Err(e) => {
                    error!("Cannot list {} jobs: {}", status, e);
                    ErrorCode::Failure
                }
            },
            Command::JobCreate { job_id } => report(
                store.create_job(&job_id),
                format!("Job {} created", job_id),
                format!("Job {} not created", job_id),
            ),
            Command::JobSubmit { job_id } => report(
                store.submit_job(&job_id),
                format!("Job {} submitted", job_id),
                format!("Job {} not submitted", job_id),
            ),
            Command::JobSubmitAll => report(
                store.submit_jobs(self.config.halt_on_error),
                "All jobs submitted".to_string(),
                "Not all jobs submitted".to_string(),
            ),
            Command::JobDelete { job_id } => report(
                store.delete_job(&job_id),
                format!("Job {} deleted", job_id),
                format!("Job {} not deleted", job_id),
            ),
            Command::JobDeleteAll => report(
                store.delete_jobs(self.config.halt_on_error),
                "All jobs deleted".to_string(),
                "Not all jobs deleted".to_string(),
            ),
            Command::JobAddStep { job_id, step_args } => report(
                store.add_step(&job_id, step_args),
                format!("Step added to job {}", job_id),
                format!("Step not added to job {}", job_id),
            ),
            Command::JobRemixStep {
                job_id,
                step_index,
                step_args,
            } => report(
                store.remix_step(&job_id, step_index, step_args),
                format!("Remix step added to job {} from step {}", job_id, step_index),
                format!("Remix step not added to job {} from step {}", job_id, step_index),
            ),
            Command::JobInsertStep {
                job_id,
                step_index,
                step_args,
            } => report(
                store.insert_step(&job_id, step_index, step_args),
                format!("Step inserted into job {} at {}", job_id, step_index),
                format!("Step not inserted into job {} at {}", job_id, step_index),
            ),
            Command::JobRemoveStep { job_id, step_index } => report(
                store.remove_step(&job_id, step_index),
                format!("Step {} removed from job {}", step_index, job_id),
                format!("Step {} not removed from job {}", step_index, job_id),
            ),
            other => {
                error!("{} is not a job manager command", other.name());
                ErrorCode::Failure
            }
        }
    }

    fn route_job_runner(&self, command: Command) -> ErrorCode {
        let runner = JobRunner::new(self.store.clone());
        let mut process_step =
            |job_id: &str, step_index: usize, step_args: &Args| self.process_step(job_id, step_index, step_args);
        let halt_on_error = self.config.halt_on_error;

        match command {
            Command::JobRun { job_id } => {
                info!("Running job {}", job_id);
                report(
                    runner.run_job(&job_id, &mut process_step),
                    format!("Processing job {} succeeded", job_id),
                    format!("Processing job {} failed", job_id),
                )
            }
            Command::JobRunAll => report(
                runner.run_jobs(&mut process_step, halt_on_error),
                "Processing jobs succeeded".to_string(),
                "Processing jobs failed".to_string(),
            ),
            Command::JobRetry { job_id } => {
                info!("Retrying job {}", job_id);
                report(
                    runner.retry_job(&job_id, &mut process_step),
                    format!("Processing job {} succeeded", job_id),
                    format!("Processing job {} failed", job_id),
                )
            }
            Command::JobRetryAll => report(
                runner.retry_jobs(&mut process_step, halt_on_error),
                "Processing jobs succeeded".to_string(),
                "Processing jobs failed".to_string(),
            ),
            other => {
                error!("{} is not a job runner command", other.name());
                ErrorCode::PreCheckFailed
            }
        }
    }

    /// One-step job with a suggested id, submitted and run immediately
    pub fn process_headless(&self, step_args: &Args) -> ErrorCode {
        let job_id = suggest_job_id("headless");
        let runner = JobRunner::new(self.store.clone());
        let mut process_step =
            |job_id: &str, step_index: usize, step_args: &Args| self.process_step(job_id, step_index, step_args);

        let result = self
            .store
            .create_job(&job_id)
            .and_then(|()| self.store.add_step(&job_id, step_args.clone()))
            .and_then(|()| self.store.submit_job(&job_id))
            .and_then(|()| runner.run_job(&job_id, &mut process_step));
        report(
            result,
            format!("Headless job {} succeeded", job_id),
            format!("Headless job {} failed", job_id),
        )
    }

    /// Expand patterns into one job, then submit and run it.
    ///
    /// Every step is built before the job is created, so a bad output pattern
    /// leaves no job behind.
    pub fn process_batch(&self, step_args: &Args, patterns: &BatchPatterns) -> ErrorCode {
        let steps = match expand_batch_steps(step_args, patterns) {
            Ok(steps) if !steps.is_empty() => steps,
            Ok(_) => {
                error!("No targets match {}", patterns.target_pattern);
                return ErrorCode::Failure;
            }
            Err(e) => {
                error!("Cannot expand batch: {}", e);
                return ErrorCode::Failure;
            }
        };

        let job_id = suggest_job_id("batch");
        let runner = JobRunner::new(self.store.clone());
        let mut process_step =
            |job_id: &str, step_index: usize, step_args: &Args| self.process_step(job_id, step_index, step_args);

        let result = self.store.create_job(&job_id).and_then(|()| {
            for args in steps {
                self.store.add_step(&job_id, args)?;
            }
            self.store.submit_job(&job_id)?;
            runner.run_job(&job_id, &mut process_step)
        });
        report(
            result,
            format!("Batch job {} succeeded", job_id),
            format!("Batch job {} failed", job_id),
        )
    }

    /// Merge the step's arguments over the process defaults, re-run the
    /// pre-checks and dispatch. Succeeds iff the dispatch reports success.
    pub fn process_step(&self, job_id: &str, step_index: usize, step_args: &Args) -> bool {
        let step_total = self.store.count_step_total(job_id).unwrap_or(0);
        let merged = merge_args(&self.config.step_defaults(), step_args);
        let step = match StepConfig::from_args(&merged) {
            Ok(step) => step,
            Err(e) => {
                error!(job_id, step_index, "Invalid step: {}", e);
                return false;
            }
        };

        info!(job_id, "Processing step {} of {}", step_index + 1, step_total);
        if !self.common_pre_check() || !self.processors_pre_check(&step.processors) {
            return false;
        }
        self.conditional_process(&step).is_success()
    }

    /// Pre-process every active processor, then dispatch on the target media type.
    ///
    /// Targets that are neither images nor videos fail the step.
    pub fn conditional_process(&self, step: &StepConfig) -> ErrorCode {
        let processors: Vec<Arc<dyn Processor>> = match self.registry.resolve(&step.processors) {
            Ok(processors) => processors,
            Err(e) => {
                error!("{}", e);
                return ErrorCode::PreCheckFailed;
            }
        };
        for processor in &processors {
            if !processor.pre_process(step) {
                error!("Pre-process of processor {} failed", processor.name());
                return ErrorCode::PreCheckFailed;
            }
        }

        let workflow = Workflow {
            analyser: self.analyser.as_ref(),
            reader: self.reader.as_ref(),
            processors: &processors,
            thread_count: self.config.execution_thread_count,
        };
        let kind = step
            .target_path
            .as_deref()
            .map_or(MediaKind::Unknown, media_kind);
        let outcome = match kind {
            MediaKind::Image => workflow.process_image(step),
            MediaKind::Video => workflow.process_video(step),
            MediaKind::Unknown => {
                warn!(
                    "Target {:?} is neither an image nor a video",
                    step.target_path.as_deref().map(|p| p.display().to_string())
                );
                Ok(ErrorCode::Failure)
            }
        };

        processors.iter().for_each(|processor| processor.post_process());

        match outcome {
            Ok(code) => code,
            Err(e) => {
                error!("Processing failed: {}", e);
                ErrorCode::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flagging_analyser, passing_analyser, solid_frame, RecordingProcessor, StubDownloader, StubReader};
    use media_pipeline_jobs::JobStatus;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    struct Fixture {
        dir: tempfile::TempDir,
        controller: Controller,
        recorder: Arc<RecordingProcessor>,
        downloader: Arc<StubDownloader>,
    }

    fn fixture_with(analyser: ContentAnalyser, recorder: RecordingProcessor, downloads_succeed: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ProcessConfig {
            jobs_path: dir.path().join("jobs"),
            models_path: dir.path().join("models"),
            execution_thread_count: 2,
            processors: vec!["recording".to_string()],
            ..ProcessConfig::default()
        };
        let recorder = Arc::new(recorder);
        let downloader = Arc::new(StubDownloader::new(downloads_succeed));
        let mut registry = ProcessorRegistry::new();
        registry.register(recorder.clone());
        let controller = Controller::new(
            config,
            registry,
            Arc::new(analyser),
            Arc::new(StubReader::default()),
            downloader.clone(),
        );
        Fixture {
            dir,
            controller,
            recorder,
            downloader,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(passing_analyser(), RecordingProcessor::default(), true)
    }

    fn write_target(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        solid_frame(10, 20, 30).save(&path).unwrap();
        path
    }

    fn step_args(target: &Path, output: &Path) -> Args {
        let mut args = Args::new();
        args.insert("target_path".to_string(), json!(target.to_string_lossy()));
        args.insert("output_path".to_string(), json!(output.to_string_lossy()));
        args.insert("processors".to_string(), json!(["recording"]));
        args
    }

    #[test]
    fn test_headless_run_processes_image() {
        let f = fixture();
        let target = write_target(f.dir.path(), "target.png");
        let output = f.dir.path().join("out").join("result.jpg");

        let code = f.controller.route(Command::HeadlessRun {
            step_args: step_args(&target, &output),
        });

        assert_eq!(code, ErrorCode::Success);
        assert!(output.is_file());
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 1);
        assert_eq!(f.recorder.post_processes.load(Ordering::SeqCst), 1);
        assert_eq!(f.controller.store().find_job_ids(JobStatus::Completed).unwrap().len(), 1);
    }

    #[test]
    fn test_step_args_override_process_defaults() {
        let f = fixture();
        let target = write_target(f.dir.path(), "target.png");
        let mut args = step_args(&target, &f.dir.path().join("result.png"));
        args.remove("processors");
        assert!(f.controller.process_step("job", 0, &args));
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 1);

        args.insert("processors".to_string(), json!([]));
        assert!(f.controller.process_step("job", 0, &args));
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_content_rejection_fails_step() {
        let f = fixture_with(flagging_analyser(), RecordingProcessor::default(), true);
        let target = write_target(f.dir.path(), "target.png");
        let step = StepConfig::from_args(&step_args(&target, &f.dir.path().join("result.png"))).unwrap();

        assert_eq!(f.controller.conditional_process(&step), ErrorCode::ContentRejected);
        assert!(!f.controller.process_step("job", 0, &step.to_args().unwrap()));
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pre_process_failure_aborts_with_pre_check_code() {
        let recorder = RecordingProcessor {
            fail_pre_process: true,
            ..RecordingProcessor::default()
        };
        let f = fixture_with(passing_analyser(), recorder, true);
        let target = write_target(f.dir.path(), "target.png");
        let step = StepConfig::from_args(&step_args(&target, &f.dir.path().join("result.png"))).unwrap();

        assert_eq!(f.controller.conditional_process(&step), ErrorCode::PreCheckFailed);
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_pre_checks_skip_processing() {
        let f = fixture_with(passing_analyser(), RecordingProcessor::default(), false);
        let target = write_target(f.dir.path(), "target.png");
        assert!(!f.controller.process_step("job", 0, &step_args(&target, &f.dir.path().join("r.png"))));
        assert!(f.downloader.calls.load(Ordering::SeqCst) > 0);
        assert_eq!(f.recorder.frames.load(Ordering::SeqCst), 0);

        let recorder = RecordingProcessor {
            fail_pre_check: true,
            ..RecordingProcessor::default()
        };
        let f = fixture_with(passing_analyser(), recorder, true);
        let target = write_target(f.dir.path(), "target.png");
        assert!(!f.controller.process_step("job", 0, &step_args(&target, &f.dir.path().join("r.png"))));
        assert_eq!(f.recorder.pre_checks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_target_type_fails() {
        let f = fixture();
        let target = f.dir.path().join("notes.txt");
        std::fs::write(&target, "text").unwrap();
        let step = StepConfig::from_args(&step_args(&target, &f.dir.path().join("r.png"))).unwrap();
        assert_eq!(f.controller.conditional_process(&step), ErrorCode::Failure);

        let missing = StepConfig::from_args(&step_args(&f.dir.path().join("gone.png"), &f.dir.path().join("r.png"))).unwrap();
        assert_eq!(f.controller.conditional_process(&missing), ErrorCode::Failure);
    }

    #[test]
    fn test_unknown_processor_is_pre_check_failure() {
        let f = fixture();
        let target = write_target(f.dir.path(), "target.png");
        let mut args = step_args(&target, &f.dir.path().join("r.png"));
        args.insert("processors".to_string(), json!(["face_swapper"]));
        let step = StepConfig::from_args(&args).unwrap();

        assert!(!f.controller.processors_pre_check(&step.processors));
        assert_eq!(f.controller.conditional_process(&step), ErrorCode::PreCheckFailed);
    }

    #[test]
    fn test_force_download() {
        let f = fixture();
        assert_eq!(f.controller.route(Command::ForceDownload), ErrorCode::Success);
        assert_eq!(f.downloader.calls.load(Ordering::SeqCst), 2);

        let f = fixture_with(passing_analyser(), RecordingProcessor::default(), false);
        assert_eq!(f.controller.route(Command::ForceDownload), ErrorCode::Failure);
    }

    #[test]
    fn test_job_manager_routing() {
        let f = fixture();
        let create = |job_id: &str| Command::JobCreate { job_id: job_id.to_string() };

        assert_eq!(f.controller.route(create("manual")), ErrorCode::Success);
        assert_eq!(f.controller.route(create("manual")), ErrorCode::Failure);
        assert_eq!(
            f.controller.route(Command::JobList { status: JobStatus::Queued }),
            ErrorCode::Failure
        );
        assert_eq!(
            f.controller.route(Command::JobSubmit { job_id: "manual".into() }),
            ErrorCode::Failure
        );
        assert_eq!(
            f.controller.route(Command::JobAddStep {
                job_id: "manual".into(),
                step_args: step_args(Path::new("a.png"), Path::new("b.png")),
            }),
            ErrorCode::Success
        );
        assert_eq!(
            f.controller.route(Command::JobRemoveStep {
                job_id: "manual".into(),
                step_index: 3,
            }),
            ErrorCode::Failure
        );
        assert_eq!(
            f.controller.route(Command::JobSubmitAll),
            ErrorCode::Success
        );
        assert_eq!(
            f.controller.route(Command::JobList { status: JobStatus::Queued }),
            ErrorCode::Success
        );
        assert_eq!(f.controller.route(Command::JobDeleteAll), ErrorCode::Success);
        assert_eq!(f.controller.route(Command::JobDeleteAll), ErrorCode::Failure);
    }

    #[test]
    fn test_job_runner_routing() {
        let f = fixture();
        let target = write_target(f.dir.path(), "target.png");
        let output = f.dir.path().join("result.png");
        let store = f.controller.store();
        store.init_jobs().unwrap();
        store.create_job("queued").unwrap();
        store.add_step("queued", step_args(&target, &output)).unwrap();
        store.submit_job("queued").unwrap();

        assert_eq!(
            f.controller.route(Command::JobRun { job_id: "queued".into() }),
            ErrorCode::Success
        );
        assert!(output.is_file());
        assert_eq!(f.controller.route(Command::JobRunAll), ErrorCode::Failure);
        assert_eq!(
            f.controller.route(Command::JobRetry { job_id: "queued".into() }),
            ErrorCode::Success
        );
        assert_eq!(f.controller.route(Command::JobRetryAll), ErrorCode::Failure);
    }

    #[test]
    fn test_run_has_no_interface() {
        let f = fixture();
        assert_eq!(f.controller.route(Command::Run), ErrorCode::PreCheckFailed);
    }
}
