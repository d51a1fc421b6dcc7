//! Execution providers (hardware backends) for ONNX Runtime

use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    DirectMLExecutionProvider, ExecutionProviderDispatch, ROCmExecutionProvider,
    TensorRTExecutionProvider,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    #[serde(rename = "tensorrt")]
    TensorRt,
    #[serde(rename = "coreml")]
    CoreMl,
    #[serde(rename = "directml")]
    DirectMl,
    Rocm,
}

impl ExecutionProvider {
    pub const ALL: [ExecutionProvider; 6] = [
        Self::Cpu,
        Self::Cuda,
        Self::TensorRt,
        Self::CoreMl,
        Self::DirectMl,
        Self::Rocm,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::TensorRt => "tensorrt",
            Self::CoreMl => "coreml",
            Self::DirectMl => "directml",
            Self::Rocm => "rocm",
        }
    }

    /// Backends that cannot run concurrent inference calls safely
    #[must_use]
    pub fn requires_serial_inference(self) -> bool {
        matches!(self, Self::DirectMl | Self::Rocm)
    }

    fn dispatch(self, device_id: i32) -> ExecutionProviderDispatch {
        match self {
            Self::Cpu => CPUExecutionProvider::default().build(),
            Self::Cuda => CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            Self::TensorRt => TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            Self::CoreMl => CoreMLExecutionProvider::default()
                .with_subgraphs(true)
                .build(),
            Self::DirectMl => DirectMLExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            Self::Rocm => ROCmExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown execution provider '{}'", s))
    }
}

/// Build the ordered provider list for a session; CPU is always the final fallback.
#[must_use]
pub fn build_execution_providers(
    providers: &[ExecutionProvider],
    device_id: i32,
) -> Vec<ExecutionProviderDispatch> {
    let mut ordered: Vec<ExecutionProvider> = Vec::with_capacity(providers.len() + 1);
    for provider in providers {
        if !ordered.contains(provider) {
            ordered.push(*provider);
        }
    }
    ordered.retain(|p| *p != ExecutionProvider::Cpu);
    ordered.push(ExecutionProvider::Cpu);

    ordered.into_iter().map(|p| p.dispatch(device_id)).collect()
}

/// Stable key fragment for a provider selection (`cuda+cpu`)
#[must_use]
pub fn providers_key(providers: &[ExecutionProvider]) -> String {
    providers
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join("+")
}
