//! Raster frame decode, encode and contain fit

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use media_pipeline_common::{ProcessingError, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Decoded frame: height x width x 3 bytes, channels in [`ChannelOrder::Rgb`]
pub type VisionFrame = RgbImage;

/// Byte order of the three colour channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Order in which decoded [`VisionFrame`]s store their channels
    pub const NATIVE: ChannelOrder = ChannelOrder::Rgb;

    /// Source channel index feeding output channel `channel` when converting
    /// from `self` to `target`
    #[must_use]
    pub fn source_channel(self, target: ChannelOrder, channel: usize) -> usize {
        if self == target {
            channel
        } else {
            2 - channel
        }
    }
}

/// Decode an image file into an RGB frame
pub fn read_image(path: &Path) -> Result<VisionFrame> {
    let image = image::open(path)
        .map_err(|e| ProcessingError::ImageError(format!("{}: {e}", path.display())))?;
    Ok(image.to_rgb8())
}

/// Encode a frame, using `quality` (0-100) for JPEG outputs
pub fn write_image(path: &Path, frame: &VisionFrame, quality: u8) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match ImageFormat::from_path(path) {
        Ok(ImageFormat::Jpeg) => {
            let writer = BufWriter::new(File::create(path)?);
            let mut encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
            encoder.encode_image(frame)?;
        }
        Ok(_) => frame.save(path)?,
        Err(e) => return Err(ProcessingError::UnsupportedFormat(e.to_string())),
    }
    Ok(())
}

/// Resize `frame` to fit inside `(width, height)` preserving aspect ratio,
/// centred on a black canvas of exactly that size.
#[must_use]
pub fn fit_contain_frame(frame: &VisionFrame, size: (u32, u32)) -> VisionFrame {
    let (contain_width, contain_height) = size;
    let (width, height) = frame.dimensions();

    let scale = f64::min(
        f64::from(contain_height) / f64::from(height.max(1)),
        f64::from(contain_width) / f64::from(width.max(1)),
    );
    let adjust_width = ((f64::from(width) * scale) as u32).clamp(1, contain_width);
    let adjust_height = ((f64::from(height) * scale) as u32).clamp(1, contain_height);
    let offset_width = (contain_width - adjust_width) / 2;
    let offset_height = (contain_height - adjust_height) / 2;

    let resized = if (adjust_width, adjust_height) == (width, height) {
        frame.clone()
    } else {
        imageops::resize(frame, adjust_width, adjust_height, FilterType::Triangle)
    };

    let mut canvas = RgbImage::new(contain_width, contain_height);
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(offset_width),
        i64::from(offset_height),
    );
    canvas
}
