//! Stubs standing in for models, ffmpeg and the network in unit tests

use crate::config::StepConfig;
use crate::error::Result;
use crate::processor::Processor;
use image::Rgb;
use media_pipeline_common::{DownloadSet, Downloader};
use media_pipeline_content_analyser::{ContentAnalyser, Detector};
use media_pipeline_vision::{read_image, MediaReader, VisionFrame};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn solid_frame(r: u8, g: u8, b: u8) -> VisionFrame {
    VisionFrame::from_pixel(8, 6, Rgb([r, g, b]))
}

/// Decodes real images; videos are synthetic solid frames
#[derive(Debug, Default)]
pub struct StubReader {
    pub fps: f64,
    pub frame_total: u64,
}

impl MediaReader for StubReader {
    fn read_image(&self, path: &Path) -> media_pipeline_common::Result<VisionFrame> {
        read_image(path)
    }

    fn read_video_frame(&self, _path: &Path, _frame_number: u64) -> media_pipeline_common::Result<VisionFrame> {
        Ok(solid_frame(0, 0, 0))
    }

    fn detect_video_fps(&self, _path: &Path) -> media_pipeline_common::Result<f64> {
        Ok(self.fps)
    }

    fn count_video_frame_total(&self, _path: &Path) -> media_pipeline_common::Result<u64> {
        Ok(self.frame_total)
    }
}

struct ConstDetector(bool);

impl Detector for ConstDetector {
    fn name(&self) -> &str {
        "const"
    }

    fn detect(&self, _frame: &VisionFrame) -> media_pipeline_content_analyser::Result<bool> {
        Ok(self.0)
    }
}

fn const_analyser(flagged: bool) -> ContentAnalyser {
    let detectors: [Box<dyn Detector>; 3] = [
        Box::new(ConstDetector(flagged)),
        Box::new(ConstDetector(flagged)),
        Box::new(ConstDetector(flagged)),
    ];
    ContentAnalyser::new(detectors, Arc::new(StubReader { fps: 10.0, frame_total: 30 }))
}

pub fn passing_analyser() -> ContentAnalyser {
    const_analyser(false)
}

pub fn flagging_analyser() -> ContentAnalyser {
    const_analyser(true)
}

/// Inverts every channel
pub struct InvertProcessor;

impl Processor for InvertProcessor {
    fn name(&self) -> &str {
        "invert"
    }

    fn pre_check(&self) -> bool {
        true
    }

    fn pre_process(&self, _step: &StepConfig) -> bool {
        true
    }

    fn process_frame(&self, _step: &StepConfig, mut frame: VisionFrame) -> Result<VisionFrame> {
        for pixel in frame.pixels_mut() {
            pixel.0 = pixel.0.map(|value| 255 - value);
        }
        Ok(frame)
    }
}

/// Processor with switchable hooks that counts calls
#[derive(Default)]
pub struct RecordingProcessor {
    pub fail_pre_check: bool,
    pub fail_pre_process: bool,
    pub pre_checks: AtomicUsize,
    pub frames: AtomicUsize,
    pub post_processes: AtomicUsize,
}

impl Processor for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    fn pre_check(&self) -> bool {
        self.pre_checks.fetch_add(1, Ordering::SeqCst);
        !self.fail_pre_check
    }

    fn pre_process(&self, _step: &StepConfig) -> bool {
        !self.fail_pre_process
    }

    fn process_frame(&self, _step: &StepConfig, frame: VisionFrame) -> Result<VisionFrame> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn post_process(&self) {
        self.post_processes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Reports every download as present and valid, or every one as failed
pub struct StubDownloader {
    pub succeed: bool,
    pub calls: AtomicUsize,
}

impl StubDownloader {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Downloader for StubDownloader {
    fn conditional_download_hashes(&self, _hashes: &DownloadSet) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }

    fn conditional_download_sources(&self, _sources: &DownloadSet) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}
