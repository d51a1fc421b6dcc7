//! Model catalogue of the three NSFW detectors

use media_pipeline_common::download::resolve_download_url;
use media_pipeline_common::{DownloadProvider, DownloadSet, Downloader, ModelFile};
use media_pipeline_inference::{ExecutionProvider, ModelSources};
use media_pipeline_vision::ChannelOrder;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::path::Path;

/// Pool context and download role of the analyser models
pub const MODEL_CONTEXT: &str = "content_analyser";

/// Release that hosts the model files
pub const MODEL_RELEASE: &str = "models-3.3.0";

/// The three ensemble members, in voting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NsfwModel {
    /// Object detector: `[1, 4 + classes, anchors]`
    Nsfw1,
    /// Classifier: `[1, classes]`
    Nsfw2,
    /// Classifier: `[1, classes]`
    Nsfw3,
}

/// Informational model provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    pub vendor: &'static str,
    pub license: &'static str,
    pub year: u16,
}

/// Static description of one model: provenance, input size and normalization
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub model: NsfwModel,
    pub metadata: ModelMetadata,
    /// Input (width, height)
    pub size: (u32, u32),
    pub mean: [f32; 3],
    pub standard_deviation: [f32; 3],
    pub channel_order: ChannelOrder,
}

static MODEL_SET: Lazy<[ModelDescriptor; 3]> = Lazy::new(|| {
    [
        ModelDescriptor {
            model: NsfwModel::Nsfw1,
            metadata: ModelMetadata {
                vendor: "EraX",
                license: "Apache-2.0",
                year: 2024,
            },
            size: (640, 640),
            mean: [0.0, 0.0, 0.0],
            standard_deviation: [1.0, 1.0, 1.0],
            channel_order: ChannelOrder::Rgb,
        },
        ModelDescriptor {
            model: NsfwModel::Nsfw2,
            metadata: ModelMetadata {
                vendor: "Marqo",
                license: "Apache-2.0",
                year: 2024,
            },
            size: (384, 384),
            mean: [0.5, 0.5, 0.5],
            standard_deviation: [0.5, 0.5, 0.5],
            channel_order: ChannelOrder::Rgb,
        },
        ModelDescriptor {
            model: NsfwModel::Nsfw3,
            metadata: ModelMetadata {
                vendor: "Freepik",
                license: "MIT",
                year: 2025,
            },
            size: (448, 448),
            mean: [0.481_454_66, 0.457_827_5, 0.408_210_73],
            standard_deviation: [0.268_629_54, 0.261_302_58, 0.275_777_11],
            channel_order: ChannelOrder::Rgb,
        },
    ]
});

impl NsfwModel {
    pub const ALL: [NsfwModel; 3] = [Self::Nsfw1, Self::Nsfw2, Self::Nsfw3];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Nsfw1 => "nsfw_1",
            Self::Nsfw2 => "nsfw_2",
            Self::Nsfw3 => "nsfw_3",
        }
    }

    /// Static descriptor, built once per process
    #[must_use]
    pub fn descriptor(self) -> &'static ModelDescriptor {
        let index = match self {
            Self::Nsfw1 => 0,
            Self::Nsfw2 => 1,
            Self::Nsfw3 => 2,
        };
        &MODEL_SET[index]
    }

    /// `(hash, source)` files of this model under `models_path`
    #[must_use]
    pub fn files(self, models_path: &Path, providers: &[DownloadProvider]) -> (ModelFile, ModelFile) {
        let hash_name = format!("{}.hash", self.name());
        let source_name = format!("{}.onnx", self.name());
        (
            ModelFile {
                url: resolve_download_url(providers, MODEL_RELEASE, &hash_name),
                path: models_path.join(hash_name),
            },
            ModelFile {
                url: resolve_download_url(providers, MODEL_RELEASE, &source_name),
                path: models_path.join(source_name),
            },
        )
    }
}

/// Hash and source download sets of all three models, keyed by model name
#[must_use]
pub fn collect_model_downloads(
    models_path: &Path,
    providers: &[DownloadProvider],
) -> (DownloadSet, DownloadSet) {
    let mut hashes = DownloadSet::new();
    let mut sources = DownloadSet::new();
    for model in NsfwModel::ALL {
        let (hash, source) = model.files(models_path, providers);
        hashes.insert(model.name().to_string(), hash);
        sources.insert(model.name().to_string(), source);
    }
    (hashes, sources)
}

/// Local model files for the inference pool
#[must_use]
pub fn collect_model_sources(models_path: &Path, providers: &[DownloadProvider]) -> ModelSources {
    let (_, sources) = collect_model_downloads(models_path, providers);
    sources
        .into_iter()
        .map(|(name, file)| (name, file.path))
        .collect()
}

/// Ensure all hash and model files are present and valid
pub fn pre_check(
    downloader: &dyn Downloader,
    models_path: &Path,
    providers: &[DownloadProvider],
) -> bool {
    let (hashes, sources) = collect_model_downloads(models_path, providers);
    downloader.conditional_download_hashes(&hashes) && downloader.conditional_download_sources(&sources)
}

/// CoreML is not used for these models on macOS; they run on CPU there.
#[must_use]
pub fn resolve_execution_providers(requested: &[ExecutionProvider]) -> Vec<ExecutionProvider> {
    if cfg!(target_os = "macos") && requested.contains(&ExecutionProvider::CoreMl) {
        return vec![ExecutionProvider::Cpu];
    }
    requested.to_vec()
}
