//! Per-model NSFW detectors and the ensemble vote

use crate::model::{collect_model_sources, NsfwModel, MODEL_CONTEXT};
use crate::preprocess::prepare_detect_frame;
use crate::{AnalyserError, Result};
use media_pipeline_common::DownloadProvider;
use media_pipeline_inference::{ConcurrencyGuard, InferencePool, ModelSources, SessionOptions};
use media_pipeline_vision::VisionFrame;
use ndarray::{ArrayD, Axis, Slice};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Name of the single input tensor of every analyser model
pub const MODEL_INPUT_NAME: &str = "input";

/// Calibrated against the pinned `models-3.3.0` weights
pub const NSFW_1_THRESHOLD: f32 = 0.2;
pub const NSFW_2_THRESHOLD: f32 = 0.25;
pub const NSFW_3_THRESHOLD: f32 = 10.5;

/// A single binary vote on a frame
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, frame: &VisionFrame) -> Result<bool>;
}

/// True iff at least two of the three votes are positive
#[must_use]
pub fn ensemble_vote(d1: bool, d2: bool, d3: bool) -> bool {
    (d1 && d2) || (d1 && d3) || (d2 && d3)
}

fn invalid(model: NsfwModel, reason: String) -> AnalyserError {
    AnalyserError::InvalidOutput {
        model: model.name(),
        reason,
    }
}

impl NsfwModel {
    /// Flag threshold; a score equal to it is not flagged
    #[must_use]
    pub fn threshold(self) -> f32 {
        match self {
            Self::Nsfw1 => NSFW_1_THRESHOLD,
            Self::Nsfw2 => NSFW_2_THRESHOLD,
            Self::Nsfw3 => NSFW_3_THRESHOLD,
        }
    }

    #[must_use]
    pub fn is_flagged(self, score: f32) -> bool {
        score > self.threshold()
    }

    /// Reduce the first model output to a scalar score.
    ///
    /// `Nsfw1` takes the maximum class confidence over every detection
    /// (rows 4.. of axis 1 after the box coordinates). The classifiers read
    /// only the first batch row: `p0 - p1` for `Nsfw2`, and
    /// `(p2 + p3) - (p0 + p1)` for `Nsfw3`.
    pub fn score(self, output: &ArrayD<f32>) -> Result<f32> {
        match self {
            Self::Nsfw1 => {
                if output.ndim() < 2 || output.shape()[1] <= 4 {
                    return Err(invalid(self, format!("shape {:?}", output.shape())));
                }
                let classes = output.slice_axis(Axis(1), Slice::from(4..));
                classes
                    .iter()
                    .copied()
                    .reduce(f32::max)
                    .ok_or_else(|| invalid(self, "no detections".to_string()))
            }
            Self::Nsfw2 | Self::Nsfw3 => {
                let row = if output.ndim() > 1 {
                    output.index_axis(Axis(0), 0)
                } else {
                    output.view()
                };
                let values: Vec<f32> = row.iter().copied().collect();
                let needed = if self == Self::Nsfw2 { 2 } else { 4 };
                if values.len() < needed {
                    return Err(invalid(self, format!("{} classes", values.len())));
                }
                Ok(if self == Self::Nsfw2 {
                    values[0] - values[1]
                } else {
                    (values[2] + values[3]) - (values[0] + values[1])
                })
            }
        }
    }
}

/// Shared access to the analyser sessions: pool, model files, backend and guard
pub struct InferenceBackend {
    pool: Arc<InferencePool>,
    sources: ModelSources,
    options: SessionOptions,
    guard: ConcurrencyGuard,
}

impl InferenceBackend {
    pub fn new(
        pool: Arc<InferencePool>,
        models_path: &Path,
        download_providers: &[DownloadProvider],
        options: SessionOptions,
    ) -> Self {
        let guard = ConcurrencyGuard::for_providers(&options.execution_providers);
        Self {
            pool,
            sources: collect_model_sources(models_path, download_providers),
            options,
            guard,
        }
    }

    /// Run `model` on a prepared tensor and return its first output
    pub fn forward(&self, model: NsfwModel, input: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let sessions = self.pool.get(MODEL_CONTEXT, &self.sources, &self.options)?;
        let session = sessions
            .get(model.name())
            .ok_or_else(|| invalid(model, "session missing from pool".to_string()))?;

        let outputs = {
            let _permit = self.guard.acquire();
            session.run(MODEL_INPUT_NAME, input)?
        };
        outputs
            .into_iter()
            .next()
            .ok_or_else(|| invalid(model, "no outputs".to_string()))
    }

    /// Release the analyser sessions
    pub fn clear(&self) {
        let names: Vec<String> = self.sources.keys().cloned().collect();
        self.pool.clear(MODEL_CONTEXT, &names);
    }
}

/// [`Detector`] backed by one of the ONNX models
pub struct ModelDetector {
    model: NsfwModel,
    backend: Arc<InferenceBackend>,
}

impl ModelDetector {
    pub fn new(model: NsfwModel, backend: Arc<InferenceBackend>) -> Self {
        Self { model, backend }
    }
}

impl Detector for ModelDetector {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn detect(&self, frame: &VisionFrame) -> Result<bool> {
        let input = prepare_detect_frame(frame, self.model.descriptor());
        let output = self.backend.forward(self.model, input.into_dyn())?;
        let score = self.model.score(&output)?;
        let flagged = self.model.is_flagged(score);
        debug!(model = self.model.name(), score, flagged, "NSFW detection");
        Ok(flagged)
    }
}
