// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns an image file into the float layout the model expects.
//
// Steps (applied in order):
//   1. Decode the file (png, jpeg, ...) with the image crate
//   2. Convert to RGB or grayscale to match in_channels
//   3. Resize to height × width (triangle filter)
//   4. Scale bytes to [0, 1]
//   5. Normalise each channel: (v - mean[c]) / std[c]
//   6. Lay out as CHW: all of channel 0, then channel 1, ...
//
// The same preprocessor is used at training and inference time
// so both see identically normalised inputs.
//
// Reference: image crate documentation

use anyhow::{ensure, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;

use crate::data::dataset::ImageSample;
use crate::domain::image::ImageRecord;

/// ImageNet channel statistics
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone)]
pub struct Preprocessor {
    height:   usize,
    width:    usize,
    channels: usize,
    mean:     Vec<f32>,
    std:      Vec<f32>,
}

impl Preprocessor {
    /// RGB inputs use ImageNet statistics, grayscale inputs map [0, 1] to [-1, 1].
    pub fn new(height: usize, width: usize, channels: usize) -> Result<Self> {
        ensure!(height > 0 && width > 0, "image size must be positive");
        ensure!(
            channels == 1 || channels == 3,
            "only 1 (grayscale) or 3 (RGB) channels are supported, got {channels}"
        );
        let (mean, std) = if channels == 3 {
            (IMAGENET_MEAN.to_vec(), IMAGENET_STD.to_vec())
        } else {
            (vec![0.5], vec![0.5])
        };
        Ok(Self { height, width, channels, mean, std })
    }

    /// Number of floats per processed image.
    pub fn sample_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// CHW floats for an in-memory image.
    pub fn process(&self, img: &DynamicImage) -> Vec<f32> {
        let resized = img.resize_exact(self.width as u32, self.height as u32, FilterType::Triangle);
        let raw: Vec<u8> = match self.channels {
            1 => resized.to_luma8().into_raw(),
            _ => resized.to_rgb8().into_raw(),
        };

        // raw is HWC; rewrite as CHW
        let plane = self.height * self.width;
        let mut out = vec![0.0f32; self.sample_len()];
        for (i, byte) in raw.iter().enumerate() {
            let c     = i % self.channels;
            let pixel = i / self.channels;
            out[c * plane + pixel] = (*byte as f32 / 255.0 - self.mean[c]) / self.std[c];
        }
        out
    }

    /// Decode and process an image file.
    pub fn load(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Cannot decode image '{}'", path.display()))?;
        Ok(self.process(&img))
    }

    pub fn sample(&self, record: &ImageRecord) -> Result<ImageSample> {
        let pixels = self.load(Path::new(&record.source))?;
        Ok(ImageSample { pixels, label: record.label })
    }

    /// Process every record, skipping files that fail to decode.
    pub fn process_all(&self, records: &[ImageRecord]) -> Vec<ImageSample> {
        let samples: Vec<ImageSample> = records
            .iter()
            .filter_map(|record| match self.sample(record) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    tracing::warn!("Skipping '{}': {:#}", record.source, e);
                    None
                }
            })
            .collect();

        tracing::info!("Preprocessed {}/{} images", samples.len(), records.len());
        samples
    }
}
