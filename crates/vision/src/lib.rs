//! Vision frame adapter
//!
//! Decodes single frames from images and videos, fits them into model input
//! sizes, and drives the ffmpeg/ffprobe executables for video probing, frame
//! extraction and re-encoding.

pub mod ffmpeg;
pub mod frame;
pub mod reader;

pub use frame::{fit_contain_frame, read_image, write_image, ChannelOrder, VisionFrame};
pub use reader::{FfmpegMediaReader, MediaReader};
