//! ONNX Runtime session construction and the black-box session contract

use crate::provider::{build_execution_providers, ExecutionProvider};
use crate::{InferenceError, Result};
use ndarray::{ArrayD, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// How sessions are built: backends, device and intra-op threads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionOptions {
    pub execution_providers: Vec<ExecutionProvider>,
    pub execution_device_id: i32,
    pub execution_thread_count: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            execution_providers: vec![ExecutionProvider::Cpu],
            execution_device_id: 0,
            execution_thread_count: num_cpus::get_physical(),
        }
    }
}

/// Create an optimized ONNX Runtime session
///
/// Graph optimization level 3, memory pattern optimization, the configured
/// intra-op thread count and the selected execution providers with CPU as
/// the final fallback.
pub fn create_session(model_path: &Path, options: &SessionOptions) -> Result<Session> {
    if !model_path.exists() {
        return Err(InferenceError::ModelNotFound(model_path.display().to_string()));
    }

    let start = Instant::now();
    let session = Session::builder()
        .map_err(|e| InferenceError::SessionBuilderError(e.to_string()))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| InferenceError::SessionBuilderError(e.to_string()))?
        .with_intra_threads(options.execution_thread_count.max(1))
        .map_err(|e| InferenceError::SessionBuilderError(e.to_string()))?
        .with_memory_pattern(true)
        .map_err(|e| InferenceError::SessionBuilderError(e.to_string()))?
        .with_execution_providers(build_execution_providers(
            &options.execution_providers,
            options.execution_device_id,
        ))
        .map_err(|e| InferenceError::SessionBuilderError(e.to_string()))?
        .commit_from_file(model_path)
        .map_err(|e| InferenceError::ModelLoadError {
            path: model_path.display().to_string(),
            error: e.to_string(),
        })?;

    debug!(
        "Session created for {} in {:.3}s",
        model_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(session)
}

/// A loaded model: accepts one input tensor and returns every output tensor.
pub trait InferenceSession: Send + Sync {
    /// Run inference; outputs are returned in model declaration order.
    fn run(&self, input_name: &str, input: ArrayD<f32>) -> Result<Vec<ArrayD<f32>>>;
}

/// [`InferenceSession`] over an ONNX Runtime [`Session`]
///
/// `Session::run` needs `&mut self`, so the session sits behind a mutex.
pub struct OrtSession {
    session: Mutex<Session>,
    input_name: String,
    output_names: Vec<String>,
}

impl OrtSession {
    pub fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_default();
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        Self {
            session: Mutex::new(session),
            input_name,
            output_names,
        }
    }
}

impl InferenceSession for OrtSession {
    fn run(&self, input_name: &str, input: ArrayD<f32>) -> Result<Vec<ArrayD<f32>>> {
        if input_name != self.input_name {
            warn!(
                "Model input is named '{}', feeding '{}' positionally",
                self.input_name, input_name
            );
        }

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::PoisonedLock)?;

        let input_tensor = TensorRef::from_array_view(input.view())?;
        let outputs = session.run(ort::inputs![input_tensor])?;

        let mut results = Vec::with_capacity(self.output_names.len());
        for name in &self.output_names {
            let (shape, data) = outputs[name.as_str()].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            let array = ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
                .map_err(|e| InferenceError::InvalidOutput(format!("{}: {}", name, e)))?;
            results.push(array);
        }
        Ok(results)
    }
}

/// Builds sessions for the pool; swapped out in tests.
pub trait SessionFactory: Send + Sync {
    fn create(&self, model_path: &Path, options: &SessionOptions)
        -> Result<Arc<dyn InferenceSession>>;
}

/// Factory producing [`OrtSession`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtSessionFactory;

impl SessionFactory for OrtSessionFactory {
    fn create(
        &self,
        model_path: &Path,
        options: &SessionOptions,
    ) -> Result<Arc<dyn InferenceSession>> {
        info!(
            "Loading model {} on {:?}",
            model_path.display(),
            options.execution_providers
        );
        let session = create_session(model_path, options)?;
        Ok(Arc::new(OrtSession::new(session)))
    }
}
