//! Processor trait and the explicit processor registry

use crate::config::StepConfig;
use crate::error::{PipelineError, Result};
use media_pipeline_common::{DownloadScope, DownloadSet};
use media_pipeline_vision::VisionFrame;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Hash and source files of one model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDownloads {
    pub hashes: DownloadSet,
    pub sources: DownloadSet,
}

/// A frame transformation stage applied to every step target
pub trait Processor: Send + Sync {
    /// Unique processor identifier
    fn name(&self) -> &str;

    /// Models fetched by `force-download`
    fn model_downloads(&self, _scope: DownloadScope) -> Vec<ModelDownloads> {
        Vec::new()
    }

    /// Models present and usable
    fn pre_check(&self) -> bool;

    /// Ready to process this step (sources valid, models loaded)
    fn pre_process(&self, step: &StepConfig) -> bool;

    fn process_frame(&self, step: &StepConfig, frame: VisionFrame) -> Result<VisionFrame>;

    /// Release per-step resources
    fn post_process(&self) {}
}

/// Processors by name, resolved explicitly
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor, replacing one with the same name
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        let name = processor.name().to_string();
        info!("Registering processor: {}", name);
        self.processors.insert(name, processor);
    }

    /// Processors in the requested order; an unknown name is an error
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Processor>>> {
        names
            .iter()
            .map(|name| {
                self.processors
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PipelineError::UnknownProcessor(name.clone()))
            })
            .collect()
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.processors.keys().cloned().collect()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Processor>> {
        self.processors.values()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}
