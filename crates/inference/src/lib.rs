//! Inference pool over ONNX Runtime
//!
//! Sessions are built lazily, cached per context and model, and shared by
//! every caller in the process. The engine itself is treated as a black box:
//! one input tensor in, a list of output tensors back.

pub mod guard;
pub mod pool;
pub mod provider;
pub mod session;

pub use guard::{ConcurrencyGuard, GuardPermit};
pub use pool::{InferencePool, ModelSources, SessionMap};
pub use provider::ExecutionProvider;
pub use session::{
    create_session, InferenceSession, OrtSession, OrtSessionFactory, SessionFactory,
    SessionOptions,
};

use thiserror::Error;

/// Errors raised while building or running inference sessions
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("ONNX Runtime error: {0}")]
    OrtError(#[from] ort::Error),

    #[error("Failed to create session builder: {0}")]
    SessionBuilderError(String),

    #[error("Failed to load ONNX model from {path}: {error}")]
    ModelLoadError { path: String, error: String },

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Session lock poisoned")]
    PoisonedLock,
}

pub type Result<T> = std::result::Result<T, InferenceError>;
