//! Frame, stream, image and video analysis with per-instance memoization

use crate::detector::{ensemble_vote, Detector, InferenceBackend, ModelDetector};
use crate::model::{resolve_execution_providers, NsfwModel};
use crate::Result;
use indicatif::{ProgressBar, ProgressStyle};
use media_pipeline_common::DownloadProvider;
use media_pipeline_inference::{InferencePool, OrtSessionFactory, SessionOptions};
use media_pipeline_vision::{FfmpegMediaReader, MediaReader, VisionFrame};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A video is rejected when the flagged share of sampled frames exceeds this
pub const VIDEO_RATE_THRESHOLD: f64 = 10.0;

/// Construction options for [`ContentAnalyser::from_options`]
#[derive(Debug, Clone)]
pub struct AnalyserOptions {
    pub models_path: PathBuf,
    pub download_providers: Vec<DownloadProvider>,
    pub session_options: SessionOptions,
    /// Render the video analysis progress bar
    pub show_progress: bool,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            models_path: PathBuf::from(".assets/models"),
            download_providers: vec![DownloadProvider::Github, DownloadProvider::Huggingface],
            session_options: SessionOptions::default(),
            show_progress: true,
        }
    }
}

/// Outcome of a video analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoAnalysis {
    /// Frames decoded and analysed
    pub sampled: u64,
    /// Sampled frames the ensemble rejected
    pub flagged: u64,
    /// `flagged / sampled * 100`, 0 when nothing was sampled
    pub rate: f64,
}

impl VideoAnalysis {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rate > VIDEO_RATE_THRESHOLD
    }
}

type VideoKey = (PathBuf, u64, u64);

/// Three-model ensemble with stream throttling and memoized file decisions.
///
/// All state (stream counter, caches) belongs to the instance.
pub struct ContentAnalyser {
    detectors: [Box<dyn Detector>; 3],
    reader: Arc<dyn MediaReader>,
    backend: Option<Arc<InferenceBackend>>,
    stream_counter: AtomicU64,
    image_cache: Mutex<HashMap<PathBuf, bool>>,
    video_cache: Mutex<HashMap<VideoKey, VideoAnalysis>>,
    show_progress: bool,
}

/// Samples per second of footage: every `floor(fps)`th frame, at least every frame
fn sample_interval(fps: f64) -> u64 {
    if fps.is_finite() && fps >= 1.0 {
        fps as u64
    } else {
        1
    }
}

impl ContentAnalyser {
    /// Analyser over arbitrary detectors and frame source
    pub fn new(detectors: [Box<dyn Detector>; 3], reader: Arc<dyn MediaReader>) -> Self {
        Self {
            detectors,
            reader,
            backend: None,
            stream_counter: AtomicU64::new(0),
            image_cache: Mutex::new(HashMap::new()),
            video_cache: Mutex::new(HashMap::new()),
            show_progress: false,
        }
    }

    /// Analyser over the ONNX models, with its own session pool and ffmpeg reader
    pub fn from_options(options: AnalyserOptions) -> Self {
        let pool = Arc::new(InferencePool::new(Arc::new(OrtSessionFactory)));
        Self::with_pool(options, pool, Arc::new(FfmpegMediaReader::new()))
    }

    /// Analyser over the ONNX models sharing an existing pool
    pub fn with_pool(
        options: AnalyserOptions,
        pool: Arc<InferencePool>,
        reader: Arc<dyn MediaReader>,
    ) -> Self {
        let mut session_options = options.session_options;
        session_options.execution_providers =
            resolve_execution_providers(&session_options.execution_providers);

        let backend = Arc::new(InferenceBackend::new(
            pool,
            &options.models_path,
            &options.download_providers,
            session_options,
        ));
        let detectors: [Box<dyn Detector>; 3] = NsfwModel::ALL
            .map(|model| Box::new(ModelDetector::new(model, backend.clone())) as Box<dyn Detector>);

        let mut analyser = Self::new(detectors, reader);
        analyser.backend = Some(backend);
        analyser.show_progress = options.show_progress;
        analyser
    }

    /// Run all three detectors and combine their votes
    pub fn analyse_frame(&self, frame: &VisionFrame) -> Result<bool> {
        let [d1, d2, d3] = &self.detectors;
        let votes = (d1.detect(frame)?, d2.detect(frame)?, d3.detect(frame)?);
        let rejected = ensemble_vote(votes.0, votes.1, votes.2);
        debug!(
            "Ensemble {}={} {}={} {}={} -> {}",
            d1.name(),
            votes.0,
            d2.name(),
            votes.1,
            d3.name(),
            votes.2,
            rejected
        );
        Ok(rejected)
    }

    /// Analyse roughly one frame per second of a live stream.
    ///
    /// Every call advances the counter; only calls whose count is a multiple
    /// of `floor(fps)` run the ensemble, all others return `false`.
    pub fn analyse_stream(&self, frame: &VisionFrame, fps: f64) -> Result<bool> {
        let counter = self.stream_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if counter % sample_interval(fps) == 0 {
            return self.analyse_frame(frame);
        }
        Ok(false)
    }

    /// Analyse an image once; later calls with the same path hit the cache.
    pub fn analyse_image(&self, path: &Path) -> Result<bool> {
        if let Some(cached) = self.image_cache.lock().ok().and_then(|c| c.get(path).copied()) {
            return Ok(cached);
        }

        let frame = self.reader.read_image(path)?;
        let rejected = self.analyse_frame(&frame)?;
        if let Ok(mut cache) = self.image_cache.lock() {
            cache.insert(path.to_path_buf(), rejected);
        }
        Ok(rejected)
    }

    /// True iff more than 10% of the sampled frames in `[start, end)` are rejected
    pub fn analyse_video(&self, path: &Path, trim_frame_start: u64, trim_frame_end: u64) -> Result<bool> {
        Ok(self
            .analyse_video_report(path, trim_frame_start, trim_frame_end)?
            .is_rejected())
    }

    /// Sampling statistics behind [`ContentAnalyser::analyse_video`], memoized per range
    pub fn analyse_video_report(
        &self,
        path: &Path,
        trim_frame_start: u64,
        trim_frame_end: u64,
    ) -> Result<VideoAnalysis> {
        let key = (path.to_path_buf(), trim_frame_start, trim_frame_end);
        if let Some(cached) = self.video_cache.lock().ok().and_then(|c| c.get(&key).copied()) {
            return Ok(cached);
        }

        let interval = sample_interval(self.reader.detect_video_fps(path)?);
        let progress = self.progress_bar(trim_frame_end.saturating_sub(trim_frame_start));

        let mut analysis = VideoAnalysis {
            sampled: 0,
            flagged: 0,
            rate: 0.0,
        };
        for frame_number in trim_frame_start..trim_frame_end {
            if frame_number % interval == 0 {
                let frame = self.reader.read_video_frame(path, frame_number)?;
                analysis.sampled += 1;
                if self.analyse_frame(&frame)? {
                    analysis.flagged += 1;
                }
            }
            if analysis.flagged > 0 && analysis.sampled > 0 {
                analysis.rate = analysis.flagged as f64 / analysis.sampled as f64 * 100.0;
            }
            progress.set_message(format!("rate={:.2}", analysis.rate));
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            "Analysed {}: {}/{} sampled frames flagged ({:.2}%)",
            path.display(),
            analysis.flagged,
            analysis.sampled,
            analysis.rate
        );
        if let Ok(mut cache) = self.video_cache.lock() {
            cache.insert(key, analysis);
        }
        Ok(analysis)
    }

    /// Drop the model sessions; decision caches are kept
    pub fn clear_inference_pool(&self) {
        if let Some(backend) = &self.backend {
            backend.clear();
        }
    }

    fn progress_bar(&self, length: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(length);
        if let Ok(style) = ProgressStyle::with_template(
            "analysing [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames {msg}",
        ) {
            progress.set_style(style.progress_chars("=> "));
        }
        progress
    }
}
