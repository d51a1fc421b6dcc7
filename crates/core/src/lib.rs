//! Job pipeline controller
//!
//! Turns a [`Command`] into job store mutations, job runs and per-step
//! processing. Every step is gated by the content-safety analyser before the
//! registered processors transform its target.

pub mod benchmark;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod processor;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use benchmark::{render_benchmarks, BenchmarkResult};
pub use command::{BatchPatterns, Command};
pub use config::{LogLevel, ProcessConfig, StepConfig};
pub use controller::{expand_batch_steps, Controller};
pub use error::{ConfigError, PipelineError, Result};
pub use processor::{ModelDownloads, Processor, ProcessorRegistry};
pub use workflow::Workflow;
