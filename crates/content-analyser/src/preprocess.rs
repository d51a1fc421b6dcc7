//! Frame to model-input tensor conversion

use crate::model::ModelDescriptor;
use media_pipeline_vision::{fit_contain_frame, ChannelOrder, VisionFrame};
use ndarray::Array4;

/// Contain-fit `frame` into the model size, reorder channels, scale to
/// `[0, 1]`, normalize per channel and lay out as `[1, 3, height, width]`.
#[must_use]
pub fn prepare_detect_frame(frame: &VisionFrame, descriptor: &ModelDescriptor) -> Array4<f32> {
    let (width, height) = descriptor.size;
    let fitted = fit_contain_frame(frame, descriptor.size);

    let source_channels: [usize; 3] = std::array::from_fn(|channel| {
        ChannelOrder::NATIVE.source_channel(descriptor.channel_order, channel)
    });
    let mean = descriptor.mean;
    let std = descriptor.standard_deviation;

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in fitted.enumerate_pixels() {
        for (channel, &source) in source_channels.iter().enumerate() {
            let value = f32::from(pixel[source]) / 255.0;
            tensor[[0, channel, y as usize, x as usize]] = (value - mean[channel]) / std[channel];
        }
    }
    tensor
}
