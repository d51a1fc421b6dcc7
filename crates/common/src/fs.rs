//! Filesystem helpers: media type detection, file naming and pattern resolution

use crate::Result;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["avi", "m4v", "mkv", "mov", "mp4", "mpeg", "webm", "wmv"];

/// Media type of a processing target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Unknown,
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// Classify an existing file by extension. Missing files are `Unknown`.
#[must_use]
pub fn media_kind(path: &Path) -> MediaKind {
    if !path.is_file() {
        return MediaKind::Unknown;
    }
    match lowercase_extension(path) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
        _ => MediaKind::Unknown,
    }
}

#[must_use]
pub fn is_image(path: &Path) -> bool {
    media_kind(path) == MediaKind::Image
}

#[must_use]
pub fn is_video(path: &Path) -> bool {
    media_kind(path) == MediaKind::Video
}

/// Extension-only check, for paths that do not exist yet (step outputs).
#[must_use]
pub fn has_video_extension(path: &Path) -> bool {
    lowercase_extension(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// File name without directory and extension (`/a/b/clip.mp4` -> `clip`)
#[must_use]
pub fn get_file_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extension including the leading dot (`/a/b/clip.mp4` -> `.mp4`), empty when absent
#[must_use]
pub fn get_file_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Resolve a glob pattern to the sorted list of matching files.
///
/// Unreadable entries are skipped; directories never match.
pub fn resolve_file_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = glob::glob(pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// List the files of a directory, sorted by path
pub fn resolve_file_paths(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
