//! Conditional model downloads with CRC32 hash verification
//!
//! Every model source (`nsfw_1.onnx`) is paired with a hash file (`nsfw_1.hash`)
//! holding the lowercase, zero-padded CRC32 of the source. Hash files are
//! fetched first; a source is valid only when its content matches its hash.

use flate2::CrcReader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

/// Which models a download pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadScope {
    Lite,
    Full,
}

/// Hosting provider used to resolve download URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadProvider {
    Github,
    Huggingface,
}

impl DownloadProvider {
    /// Render the URL of `file_name` within the release `base_name`
    #[must_use]
    pub fn resolve_url(self, base_name: &str, file_name: &str) -> String {
        match self {
            Self::Github => format!(
                "https://github.com/facefusion/facefusion-assets/releases/download/{base_name}/{file_name}"
            ),
            Self::Huggingface => format!(
                "https://huggingface.co/facefusion/{base_name}/resolve/main/{file_name}"
            ),
        }
    }
}

/// Resolve a download URL against the first configured provider
#[must_use]
pub fn resolve_download_url(
    providers: &[DownloadProvider],
    base_name: &str,
    file_name: &str,
) -> String {
    providers
        .first()
        .copied()
        .unwrap_or(DownloadProvider::Github)
        .resolve_url(base_name, file_name)
}

/// A downloadable file and where it lives locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub url: String,
    pub path: PathBuf,
}

/// Files keyed by role or model name
pub type DownloadSet = BTreeMap<String, ModelFile>;

/// Fetches missing or invalid model files.
pub trait Downloader: Send + Sync {
    /// Ensure every hash file exists; returns false if any is still missing afterwards
    fn conditional_download_hashes(&self, hashes: &DownloadSet) -> bool;

    /// Ensure every source file exists and matches its hash; invalid sources are removed
    fn conditional_download_sources(&self, sources: &DownloadSet) -> bool;
}

/// Sibling `.hash` path of a source file
#[must_use]
pub fn get_hash_path(source_path: &Path) -> PathBuf {
    source_path.with_extension("hash")
}

/// Compare a file's CRC32 against its sibling hash file
#[must_use]
pub fn validate_hash(source_path: &Path) -> bool {
    let hash_path = get_hash_path(source_path);
    let Ok(expected) = std::fs::read_to_string(&hash_path) else {
        return false;
    };
    let Ok(actual) = hash_file(source_path) else {
        return false;
    };
    expected.trim() == actual
}

/// CRC32 of a file's content as 8 lowercase hex digits, streamed rather than loaded whole
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut reader = CrcReader::new(BufReader::new(File::open(path)?));
    std::io::copy(&mut reader, &mut std::io::sink())?;
    Ok(format!("{:08x}", reader.crc().sum()))
}

fn is_valid_hash_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

/// Downloads through the `curl` executable
#[derive(Debug, Clone, Default)]
pub struct CurlDownloader;

impl CurlDownloader {
    pub fn new() -> Self {
        Self
    }

    fn download(&self, file: &ModelFile) -> bool {
        if let Some(parent) = file.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                error!("Failed to create {}: {}", parent.display(), e);
                return false;
            }
        }
        info!("Downloading {} to {}", file.url, file.path.display());

        let status = Command::new("curl")
            .args([
                "--fail",
                "--create-dirs",
                "--silent",
                "--insecure",
                "--location",
                "--continue-at",
                "-",
                "--output",
            ])
            .arg(&file.path)
            .arg(&file.url)
            .status();

        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                error!("curl exited with {} for {}", status, file.url);
                false
            }
            Err(e) => {
                error!("Failed to execute curl: {}", e);
                false
            }
        }
    }
}

impl Downloader for CurlDownloader {
    fn conditional_download_hashes(&self, hashes: &DownloadSet) -> bool {
        for file in hashes.values() {
            if !is_valid_hash_file(&file.path) {
                self.download(file);
            }
        }

        let mut valid = true;
        for (name, file) in hashes {
            if is_valid_hash_file(&file.path) {
                debug!("Validating hash for {} succeeded", name);
            } else {
                error!("Validating hash for {} failed: {}", name, file.path.display());
                valid = false;
            }
        }
        valid
    }

    fn conditional_download_sources(&self, sources: &DownloadSet) -> bool {
        for file in sources.values() {
            if !validate_hash(&file.path) {
                self.download(file);
            }
        }

        let mut valid = true;
        for (name, file) in sources {
            if validate_hash(&file.path) {
                debug!("Validating source for {} succeeded", name);
            } else {
                error!("Validating source for {} failed: {}", name, file.path.display());
                let _ = std::fs::remove_file(&file.path);
                valid = false;
            }
        }
        valid
    }
}
