//! Frame source abstraction used by the content analyser

use crate::ffmpeg;
use crate::frame::{self, VisionFrame};
use media_pipeline_common::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Reads frames and video properties from media files.
pub trait MediaReader: Send + Sync {
    fn read_image(&self, path: &Path) -> Result<VisionFrame>;

    fn read_video_frame(&self, path: &Path, frame_number: u64) -> Result<VisionFrame>;

    fn detect_video_fps(&self, path: &Path) -> Result<f64>;

    fn count_video_frame_total(&self, path: &Path) -> Result<u64>;
}

/// [`MediaReader`] backed by the `image` crate and the ffmpeg executables.
///
/// Frame rates are probed once per path.
#[derive(Debug, Default)]
pub struct FfmpegMediaReader {
    fps_cache: Mutex<HashMap<PathBuf, f64>>,
}

impl FfmpegMediaReader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaReader for FfmpegMediaReader {
    fn read_image(&self, path: &Path) -> Result<VisionFrame> {
        frame::read_image(path)
    }

    fn read_video_frame(&self, path: &Path, frame_number: u64) -> Result<VisionFrame> {
        let fps = self.detect_video_fps(path)?;
        ffmpeg::read_video_frame(path, frame_number, fps)
    }

    fn detect_video_fps(&self, path: &Path) -> Result<f64> {
        if let Ok(cache) = self.fps_cache.lock() {
            if let Some(fps) = cache.get(path) {
                return Ok(*fps);
            }
        }
        let fps = ffmpeg::detect_video_fps(path)?;
        if let Ok(mut cache) = self.fps_cache.lock() {
            cache.insert(path.to_path_buf(), fps);
        }
        Ok(fps)
    }

    fn count_video_frame_total(&self, path: &Path) -> Result<u64> {
        ffmpeg::count_video_frame_total(path)
    }
}
