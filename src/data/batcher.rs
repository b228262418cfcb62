// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<ImageSample>
// into tensors.
//
//   Input:  N samples, each C·H·W floats in CHW order
//   Output: images [N, C, H, W], targets [N]
//
// All samples come from the same Preprocessor, so they already
// share one size and no padding is needed.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ImageSample;

/// A batch of images ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// shape: [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,

    /// Class labels, shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device:   B::Device,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, channels: usize, height: usize, width: usize) -> Self {
        Self { device, channels, height, width }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let batch_size = items.len();

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|s| s.pixels.iter().copied())
            .collect();

        let labels: Vec<i32> = items
            .iter()
            .map(|s| s.label as i32)
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, self.channels, self.height, self.width]),
            &self.device,
        );

        let targets = Tensor::<B, 1, Int>::from_ints(
            labels.as_slice(), &self.device
        );

        ImageBatch { images, targets }
    }
}
