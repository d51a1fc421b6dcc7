//! Image and video processing workflows behind the content-safety gate

use crate::config::StepConfig;
use crate::error::{PipelineError, Result};
use crate::processor::Processor;
use media_pipeline_common::fs::get_file_extension;
use media_pipeline_common::ErrorCode;
use media_pipeline_content_analyser::ContentAnalyser;
use media_pipeline_vision::ffmpeg::{extract_frames, merge_video, restore_audio};
use media_pipeline_vision::{read_image, write_image, MediaReader, VisionFrame};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a workflow needs for one step
pub struct Workflow<'a> {
    pub analyser: &'a ContentAnalyser,
    pub reader: &'a dyn MediaReader,
    pub processors: &'a [Arc<dyn Processor>],
    pub thread_count: usize,
}

fn required<'s>(value: &'s Option<PathBuf>, name: &'static str) -> Result<&'s Path> {
    value.as_deref().ok_or(PipelineError::MissingArgument(name))
}

impl Workflow<'_> {
    fn apply_processors(&self, step: &StepConfig, frame: VisionFrame) -> Result<VisionFrame> {
        self.processors
            .iter()
            .try_fold(frame, |frame, processor| processor.process_frame(step, frame))
    }

    /// Gate, decode, process and encode an image target
    pub fn process_image(&self, step: &StepConfig) -> Result<ErrorCode> {
        let start = Instant::now();
        let target_path = required(&step.target_path, "target_path")?;
        let output_path = required(&step.output_path, "output_path")?;

        if self.analyser.analyse_image(target_path)? {
            warn!("Content rejected: {}", target_path.display());
            return Ok(ErrorCode::ContentRejected);
        }

        let frame = self.reader.read_image(target_path)?;
        let frame = self.apply_processors(step, frame)?;
        write_image(output_path, &frame, step.output_image_quality)?;

        info!(
            "Processing to image succeeded in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(ErrorCode::Success)
    }

    /// Gate the trimmed range, then extract, process in parallel and re-encode
    pub fn process_video(&self, step: &StepConfig) -> Result<ErrorCode> {
        let start = Instant::now();
        let target_path = required(&step.target_path, "target_path")?;
        let output_path = required(&step.output_path, "output_path")?;

        let fps = self.reader.detect_video_fps(target_path)?;
        let trim_frame_start = step.trim_frame_start.unwrap_or(0);
        let trim_frame_end = match step.trim_frame_end {
            Some(end) => end,
            None => self.reader.count_video_frame_total(target_path)?,
        };
        if self
            .analyser
            .analyse_video(target_path, trim_frame_start, trim_frame_end)?
        {
            warn!("Content rejected: {}", target_path.display());
            return Ok(ErrorCode::ContentRejected);
        }

        let temp_dir = tempfile::Builder::new().prefix("media-pipeline-").tempdir()?;
        extract_frames(
            target_path,
            temp_dir.path(),
            step.trim_frame_start,
            step.trim_frame_end,
        )?;
        let frame_paths = list_frames(temp_dir.path())?;
        self.process_frames(step, &frame_paths)?;

        let output_fps = step.output_video_fps.unwrap_or(fps);
        let merged_path = temp_dir
            .path()
            .join(format!("merged{}", get_file_extension(output_path)));
        merge_video(
            temp_dir.path(),
            &merged_path,
            output_fps,
            &step.output_video_encoder,
            step.output_video_quality,
        )?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        if let Err(e) = restore_audio(target_path, &merged_path, output_path, fps, step.trim_frame_start) {
            warn!("Restoring audio skipped: {}", e);
            std::fs::copy(&merged_path, output_path)?;
        }

        info!(
            "Processing to video succeeded in {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(ErrorCode::Success)
    }

    /// Rewrite every extracted frame in place on a pool of `thread_count` workers
    fn process_frames(&self, step: &StepConfig, frame_paths: &[PathBuf]) -> Result<()> {
        if self.processors.is_empty() {
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count.max(1))
            .build()?;
        debug!("Processing {} frames on {} threads", frame_paths.len(), pool.current_num_threads());

        pool.install(|| {
            frame_paths.par_iter().try_for_each(|frame_path| -> Result<()> {
                let frame = read_image(frame_path)?;
                let frame = self.apply_processors(step, frame)?;
                write_image(frame_path, &frame, 100)?;
                Ok(())
            })
        })
    }
}

fn list_frames(temp_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(temp_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    frame_paths.sort();
    Ok(frame_paths)
}
