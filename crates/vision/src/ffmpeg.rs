//! ffmpeg / ffprobe process wrappers
//!
//! Video probing, single-frame decode, frame extraction, re-encoding with
//! audio restore, and concatenation of step outputs.

use crate::frame::VisionFrame;
use media_pipeline_common::{ProcessingError, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, info};

/// File name pattern of extracted frames inside a temporary directory
pub const FRAME_PATTERN: &str = "%08d.png";

fn run_ffmpeg(cmd: &mut Command) -> Result<Output> {
    debug!("Running {:?}", cmd);
    let output = cmd
        .output()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProcessingError::FFmpegError(format!(
            "FFmpeg failed: {}",
            stderr.trim()
        )));
    }
    Ok(output)
}

fn ffprobe_stream_entry(video_path: &Path, entries: &str, format: &str) -> Result<String> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            entries,
            "-of",
            format,
        ])
        .arg(video_path)
        .output()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(ProcessingError::CorruptedFile(format!(
            "ffprobe failed for {}: {}",
            video_path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        return Err(ProcessingError::NoVideoStream);
    }
    Ok(value)
}

/// Parse an ffprobe rational (`30000/1001`, `25/1`, `24`)
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Frame rate of the first video stream
pub fn detect_video_fps(video_path: &Path) -> Result<f64> {
    let value = ffprobe_stream_entry(
        video_path,
        "stream=r_frame_rate",
        "default=noprint_wrappers=1:nokey=1",
    )?;
    parse_frame_rate(&value).ok_or_else(|| {
        ProcessingError::CorruptedFile(format!("Invalid frame rate '{}'", value))
    })
}

/// Number of frames in the first video stream (packet count)
pub fn count_video_frame_total(video_path: &Path) -> Result<u64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-count_packets",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=nb_read_packets",
            "-of",
            "csv=p=0",
        ])
        .arg(video_path)
        .output()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to execute ffprobe: {}", e)))?;

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || value.is_empty() {
        return Err(ProcessingError::NoVideoStream);
    }
    value
        .trim_end_matches(',')
        .parse()
        .map_err(|_| ProcessingError::CorruptedFile(format!("Invalid frame count '{}'", value)))
}

/// Decode frame `frame_number` of a video, seeking by timestamp.
pub fn read_video_frame(video_path: &Path, frame_number: u64, fps: f64) -> Result<VisionFrame> {
    let timestamp = if fps > 0.0 {
        frame_number as f64 / fps
    } else {
        0.0
    };

    let output = run_ffmpeg(
        Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{:.6}", timestamp))
            .arg("-i")
            .arg(video_path)
            .args([
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-",
            ]),
    )?;

    if output.stdout.is_empty() {
        return Err(ProcessingError::CorruptedFile(format!(
            "No frame {} in {}",
            frame_number,
            video_path.display()
        )));
    }
    let image = image::load_from_memory(&output.stdout)?;
    Ok(image.to_rgb8())
}

/// Extract frames `[trim_start, trim_end)` into `temp_dir` as numbered PNGs.
///
/// Returns the number of extracted frames.
pub fn extract_frames(
    video_path: &Path,
    temp_dir: &Path,
    trim_start: Option<u64>,
    trim_end: Option<u64>,
) -> Result<usize> {
    std::fs::create_dir_all(temp_dir)?;

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(video_path);

    let trim = match (trim_start, trim_end) {
        (Some(start), Some(end)) => Some(format!("trim=start_frame={}:end_frame={}", start, end)),
        (Some(start), None) => Some(format!("trim=start_frame={}", start)),
        (None, Some(end)) => Some(format!("trim=end_frame={}", end)),
        (None, None) => None,
    };
    if let Some(trim) = trim {
        cmd.args(["-vf", &trim]);
    }
    cmd.args(["-vsync", "0"]).arg(temp_dir.join(FRAME_PATTERN));
    run_ffmpeg(&mut cmd)?;

    let count = std::fs::read_dir(temp_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("png"))
        .count();
    if count == 0 {
        return Err(ProcessingError::CorruptedFile(format!(
            "No frames extracted from {}",
            video_path.display()
        )));
    }
    info!("Extracted {} frames from {}", count, video_path.display());
    Ok(count)
}

/// Map output quality (0-100) onto the x264/x265 CRF scale (51-0)
#[must_use]
pub fn quality_to_crf(quality: u8) -> u8 {
    let quality = f64::from(quality.min(100));
    (51.0 - quality * 0.51).round() as u8
}

/// Encode the numbered PNG frames of `temp_dir` into `output_path`.
pub fn merge_video(
    temp_dir: &Path,
    output_path: &Path,
    fps: f64,
    encoder: &str,
    quality: u8,
) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-r"])
        .arg(format!("{}", fps))
        .arg("-i")
        .arg(temp_dir.join(FRAME_PATTERN))
        .args(["-c:v", encoder]);

    if matches!(encoder, "libx264" | "libx265") {
        cmd.args(["-crf", &quality_to_crf(quality).to_string()]);
    }
    cmd.args(["-pix_fmt", "yuv420p"]).arg(output_path);
    run_ffmpeg(&mut cmd)?;
    Ok(())
}

/// Copy the video of `video_path` and the audio (if any) of `target_path`,
/// trimmed to the same frame window, into `output_path`.
pub fn restore_audio(
    target_path: &Path,
    video_path: &Path,
    output_path: &Path,
    fps: f64,
    trim_start: Option<u64>,
) -> Result<()> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(video_path);
    if let Some(start) = trim_start.filter(|_| fps > 0.0) {
        cmd.arg("-ss").arg(format!("{:.6}", start as f64 / fps));
    }
    cmd.arg("-i")
        .arg(target_path)
        .args([
            "-c:v", "copy", "-map", "0:v:0", "-map", "1:a:0?", "-shortest",
        ])
        .arg(output_path);
    run_ffmpeg(&mut cmd)?;
    Ok(())
}

/// Concatenate videos with identical codecs into `output_path` (stream copy)
pub fn concat_videos(input_paths: &[&Path], output_path: &Path) -> Result<()> {
    let parent = output_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut list = tempfile::Builder::new()
        .prefix(".concat-")
        .suffix(".txt")
        .tempfile_in(parent)?;
    for path in input_paths {
        let absolute = std::fs::canonicalize(path)?;
        let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
        writeln!(list, "file '{}'", escaped)?;
    }
    list.flush()?;

    run_ffmpeg(
        Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "concat",
                "-safe",
                "0",
                "-i",
            ])
            .arg(list.path())
            .args(["-c", "copy"])
            .arg(output_path),
    )?;
    Ok(())
}
