//! Repeated conditional processing of benchmark targets

use crate::config::StepConfig;
use crate::controller::Controller;
use crate::error::{PipelineError, Result};
use media_pipeline_common::fs::get_file_extension;
use media_pipeline_common::{merge_args, Args, ErrorCode};
use media_pipeline_jobs::render_table;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Run times of one target over all cycles, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub target_path: PathBuf,
    pub cycle_count: usize,
    pub average_run: f64,
    pub fastest_run: f64,
    pub slowest_run: f64,
}

const BENCHMARK_HEADERS: [&str; 5] = ["target path", "cycle count", "average run", "fastest run", "slowest run"];

#[must_use]
pub fn render_benchmarks(results: &[BenchmarkResult]) -> String {
    let headers: Vec<String> = BENCHMARK_HEADERS.iter().map(ToString::to_string).collect();
    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|result| {
            vec![
                result.target_path.display().to_string(),
                result.cycle_count.to_string(),
                format!("{:.2} ms", result.average_run),
                format!("{:.2} ms", result.fastest_run),
                format!("{:.2} ms", result.slowest_run),
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

impl Controller {
    /// Benchmark command: pre-checks, then one table row per target
    pub(crate) fn run_benchmark(&self, step_args: &Args, target_paths: &[PathBuf]) -> ErrorCode {
        let step = match StepConfig::from_args(&merge_args(&self.config().step_defaults(), step_args)) {
            Ok(step) => step,
            Err(e) => {
                error!("Invalid benchmark arguments: {}", e);
                return ErrorCode::PreCheckFailed;
            }
        };
        if !self.common_pre_check() || !self.processors_pre_check(&step.processors) {
            return ErrorCode::PreCheckFailed;
        }
        if target_paths.is_empty() {
            error!("No benchmark targets given");
            return ErrorCode::Failure;
        }

        match self.benchmark(step_args, target_paths) {
            Ok(results) => {
                println!("{}", render_benchmarks(&results));
                ErrorCode::Success
            }
            Err(e) => {
                error!("{}", e);
                ErrorCode::Failure
            }
        }
    }

    /// Process every target `benchmark_cycle_count` times into a temporary output
    pub fn benchmark(&self, step_args: &Args, target_paths: &[PathBuf]) -> Result<Vec<BenchmarkResult>> {
        let output_dir = tempfile::Builder::new().prefix("media-pipeline-benchmark-").tempdir()?;
        target_paths
            .iter()
            .map(|target_path| self.benchmark_target(step_args, target_path, output_dir.path()))
            .collect()
    }

    fn benchmark_target(&self, step_args: &Args, target_path: &Path, output_dir: &Path) -> Result<BenchmarkResult> {
        let mut args = merge_args(&self.config().step_defaults(), step_args);
        args.insert("target_path".to_string(), serde_json::json!(target_path.to_string_lossy()));
        args.insert(
            "output_path".to_string(),
            serde_json::json!(output_dir
                .join(format!("benchmark{}", get_file_extension(target_path)))
                .to_string_lossy()),
        );
        let step = StepConfig::from_args(&args)?;

        let cycle_count = self.config().benchmark_cycle_count.max(1);
        let mut runs = Vec::with_capacity(cycle_count);
        for _ in 0..cycle_count {
            let start = Instant::now();
            if self.conditional_process(&step) != ErrorCode::Success {
                return Err(PipelineError::BenchmarkFailed(target_path.to_path_buf()));
            }
            runs.push(start.elapsed().as_secs_f64() * 1000.0);
        }

        let result = BenchmarkResult {
            target_path: target_path.to_path_buf(),
            cycle_count,
            average_run: runs.iter().sum::<f64>() / runs.len() as f64,
            fastest_run: runs.iter().copied().fold(f64::INFINITY, f64::min),
            slowest_run: runs.iter().copied().fold(0.0, f64::max),
        };
        info!(
            "Benchmarked {}: average {:.2} ms over {} runs",
            target_path.display(),
            result.average_run,
            cycle_count
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::config::ProcessConfig;
    use crate::processor::ProcessorRegistry;
    use crate::testing::{flagging_analyser, passing_analyser, solid_frame, StubDownloader, StubReader};
    use media_pipeline_content_analyser::ContentAnalyser;
    use std::sync::Arc;

    fn controller(analyser: ContentAnalyser, dir: &Path) -> Controller {
        let config = ProcessConfig {
            jobs_path: dir.join("jobs"),
            benchmark_cycle_count: 3,
            ..ProcessConfig::default()
        };
        Controller::new(
            config,
            ProcessorRegistry::new(),
            Arc::new(analyser),
            Arc::new(StubReader::default()),
            Arc::new(StubDownloader::new(true)),
        )
    }

    #[test]
    fn test_benchmark_reports_every_target() {
        let dir = tempfile::tempdir().unwrap();
        let targets: Vec<PathBuf> = ["a.png", "b.jpg"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                solid_frame(1, 2, 3).save(&path).unwrap();
                path
            })
            .collect();
        let controller = controller(passing_analyser(), dir.path());

        let results = controller.benchmark(&Args::new(), &targets).unwrap();
        assert_eq!(results.len(), 2);
        for (result, target) in results.iter().zip(&targets) {
            assert_eq!(&result.target_path, target);
            assert_eq!(result.cycle_count, 3);
            assert!(result.fastest_run <= result.average_run + 1e-9);
            assert!(result.average_run <= result.slowest_run + 1e-9);
        }

        let table = render_benchmarks(&results);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("average run"));
    }

    #[test]
    fn test_benchmark_failures() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.png");
        solid_frame(1, 2, 3).save(&target).unwrap();

        let rejecting = controller(flagging_analyser(), dir.path());
        assert!(matches!(
            rejecting.benchmark(&Args::new(), &[target.clone()]),
            Err(PipelineError::BenchmarkFailed(_))
        ));

        let passing = controller(passing_analyser(), dir.path());
        let command = Command::Benchmark {
            step_args: Args::new(),
            target_paths: Vec::new(),
        };
        assert_eq!(passing.route(command), ErrorCode::Failure);
    }
}
