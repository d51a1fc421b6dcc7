//! Job id suggestion and per-step output naming

use chrono::Local;
use media_pipeline_common::fs::{get_file_extension, get_file_name};
use std::path::{Path, PathBuf};

/// `{prefix}-YYYY-MM-DD-HH-MM-SS` in local time
#[must_use]
pub fn suggest_job_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Local::now().format("%Y-%m-%d-%H-%M-%S"))
}

/// Temporary output of one step: `{dir}/{name}-{job_id}-{step_index}{ext}`.
///
/// `None` when the output path lacks a file name or an extension.
#[must_use]
pub fn get_step_output_path(job_id: &str, step_index: usize, output_path: &Path) -> Option<PathBuf> {
    let name = get_file_name(output_path);
    let extension = get_file_extension(output_path);
    if name.is_empty() || extension.is_empty() {
        return None;
    }
    let file_name = format!("{}-{}-{}{}", name, job_id, step_index, extension);
    Some(match output_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    })
}

/// Job ids become file names: non-empty, no separators, no leading dot
#[must_use]
pub fn is_valid_job_id(job_id: &str) -> bool {
    !job_id.is_empty()
        && !job_id.starts_with('.')
        && !job_id.contains(['/', '\\'])
        && job_id.trim() == job_id
}
